use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{MessageResponse, SignInRequest, SignUpRequest, UserResponse},
        error::AuthError,
        password::MAX_PASSWORD_BYTES,
        services::{Credentials, NewUser},
    },
    cookies::{CookieJar, CookieOverrides},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(mut payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.name = payload.name.trim().to_string();

    if payload.name.is_empty() {
        warn!("empty name");
        return Err(AuthError::Validation("Name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AuthError::Validation("Password too short".into()));
    }
    if payload.password.len() > MAX_PASSWORD_BYTES {
        warn!("password too long");
        return Err(AuthError::Validation("Password too long".into()));
    }

    let user = state
        .credentials
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            role: payload.role,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User registered",
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(mut payload): Json<SignInRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    let user = state
        .credentials
        .authenticate_user(&Credentials {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok(Json(UserResponse {
        message: "User signed in",
        user,
    }))
}

#[instrument(skip(state, jar))]
pub async fn sign_out(
    State(state): State<AppState>,
    mut jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    state.cookies.clear(
        &mut jar,
        &state.config.cookie.session_name,
        &CookieOverrides::default(),
    );
    info!("user signed out");
    (
        jar,
        Json(MessageResponse {
            message: "User signed out",
        }),
    )
}
