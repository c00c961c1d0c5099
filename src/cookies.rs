//! Session cookie attributes and a small cookie jar for axum handlers.
//!
//! [`CookiePolicy`] owns the default attribute set. Handlers hand it a
//! [`CookieResponse`] (normally a [`CookieJar`] extracted from the request)
//! and return the jar so the `Set-Cookie` headers reach the client.

use std::{convert::Infallible, fmt, sync::Arc, time::Duration};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponseParts, ResponseParts},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use time::{macros::format_description, OffsetDateTime};
use tracing::warn;

use crate::config::RuntimeEnv;

pub const SESSION_MAX_AGE: Duration = Duration::from_millis(1000 * 60 * 15);
const DEFAULT_PATH: &str = "/";
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Everything `encodeURIComponent` escapes, so values can carry `;`, `,`,
/// spaces and quotes without breaking the header.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Option<Duration>,
    pub path: Option<String>,
    pub domain: Option<String>,
}

impl CookieOptions {
    /// Applies every field that is set in `overrides`.
    pub fn merged(mut self, overrides: &CookieOverrides) -> Self {
        if let Some(v) = overrides.http_only {
            self.http_only = v;
        }
        if let Some(v) = overrides.secure {
            self.secure = v;
        }
        if let Some(v) = overrides.same_site {
            self.same_site = v;
        }
        if let Some(v) = overrides.max_age {
            self.max_age = Some(v);
        }
        if let Some(v) = &overrides.path {
            self.path = Some(v.clone());
        }
        if let Some(v) = &overrides.domain {
            self.domain = Some(v.clone());
        }
        self
    }

    fn effective_path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }
}

/// Per-call overrides. `None` keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOverrides {
    pub http_only: Option<bool>,
    pub secure: Option<bool>,
    pub same_site: Option<SameSite>,
    pub max_age: Option<Duration>,
    pub path: Option<String>,
    pub domain: Option<String>,
}

/// Something that can carry cookies back to the client.
pub trait CookieResponse {
    fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions);
    fn clear_cookie(&mut self, name: &str, options: &CookieOptions);
    fn cookie(&self, name: &str) -> Option<&str>;
}

#[derive(Clone)]
pub struct CookiePolicy {
    env: Arc<dyn RuntimeEnv>,
    domain: Option<String>,
}

impl CookiePolicy {
    pub fn new(env: Arc<dyn RuntimeEnv>) -> Self {
        Self { env, domain: None }
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    /// Built on every call so a change of environment is seen right away.
    pub fn get_options(&self) -> CookieOptions {
        CookieOptions {
            http_only: true,
            secure: self.env.is_production(),
            same_site: SameSite::Strict,
            max_age: Some(SESSION_MAX_AGE),
            path: None,
            domain: self.domain.clone(),
        }
    }

    pub fn set<R: CookieResponse>(
        &self,
        res: &mut R,
        name: &str,
        value: &str,
        overrides: &CookieOverrides,
    ) {
        res.set_cookie(name, value, &self.get_options().merged(overrides));
    }

    pub fn get<'r, R: CookieResponse>(&self, res: &'r R, name: &str) -> Option<&'r str> {
        res.cookie(name)
    }

    pub fn clear<R: CookieResponse>(&self, res: &mut R, name: &str, overrides: &CookieOverrides) {
        res.clear_cookie(name, &self.get_options().merged(overrides));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    path: String,
    domain: Option<String>,
    // request cookies arrive without attributes and match a clear on any domain
    from_request: bool,
}

/// Cookies seen on the request plus the `Set-Cookie` headers queued for the
/// response. Entries are keyed by name, path and domain the way a browser
/// keys them, so a clear with different attributes leaves the cookie alone.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
    pending: Vec<String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for pair in raw.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                let value = percent_decode_str(value)
                    .decode_utf8()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                jar.remove(name, DEFAULT_PATH, None);
                jar.cookies.push(StoredCookie {
                    name: name.to_string(),
                    value,
                    path: DEFAULT_PATH.to_string(),
                    domain: None,
                    from_request: true,
                });
            }
        }
        jar
    }

    /// Raw `Set-Cookie` values queued so far.
    pub fn set_cookie_headers(&self) -> &[String] {
        &self.pending
    }

    fn store(&mut self, name: &str, value: &str, path: &str, domain: Option<&str>) {
        self.remove(name, path, domain);
        self.cookies.push(StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            path: path.to_string(),
            domain: domain.map(str::to_string),
            from_request: false,
        });
    }

    fn remove(&mut self, name: &str, path: &str, domain: Option<&str>) {
        self.cookies.retain(|c| {
            let same_domain = c.from_request || c.domain.as_deref() == domain;
            !(c.name == name && c.path == path && same_domain)
        });
    }
}

impl CookieResponse for CookieJar {
    fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions) {
        self.store(name, value, options.effective_path(), options.domain.as_deref());
        self.pending.push(render_set_cookie(name, value, options));
    }

    fn clear_cookie(&mut self, name: &str, options: &CookieOptions) {
        self.remove(name, options.effective_path(), options.domain.as_deref());
        self.pending.push(render_clear_cookie(name, options));
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CookieJar
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl IntoResponseParts for CookieJar {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for raw in self.pending {
            match HeaderValue::from_str(&raw) {
                Ok(v) => {
                    res.headers_mut().append(header::SET_COOKIE, v);
                }
                Err(e) => warn!(error = %e, "dropping unencodable Set-Cookie header"),
            }
        }
        Ok(res)
    }
}

fn push_attributes(out: &mut String, options: &CookieOptions) {
    if let Some(domain) = &options.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    out.push_str("; Path=");
    out.push_str(options.effective_path());
    if options.http_only {
        out.push_str("; HttpOnly");
    }
    if options.secure {
        out.push_str("; Secure");
    }
    out.push_str("; SameSite=");
    out.push_str(&options.same_site.to_string());
}

fn http_date(at: OffsetDateTime) -> Option<String> {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.format(&fmt).ok()
}

/// `None` when the expiry is past what a date can represent; `Max-Age` alone
/// still carries the lifetime then.
fn expires_after(max_age: Duration) -> Option<String> {
    let max_age = time::Duration::try_from(max_age).ok()?;
    let at = OffsetDateTime::now_utc().checked_add(max_age)?;
    http_date(at)
}

fn render_set_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut out = format!("{name}={}", utf8_percent_encode(value, COOKIE_VALUE));
    if let Some(max_age) = options.max_age {
        out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        if let Some(expires) = expires_after(max_age) {
            out.push_str(&format!("; Expires={expires}"));
        }
    }
    push_attributes(&mut out, options);
    out
}

fn render_clear_cookie(name: &str, options: &CookieOptions) -> String {
    let mut out = format!("{name}=; Max-Age=0; Expires={EXPIRED}");
    push_attributes(&mut out, options);
    out
}
