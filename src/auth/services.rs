use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::auth::error::AuthError;
use crate::auth::password::{self, PasswordScheme};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUserRecord, PublicUser, DEFAULT_ROLE};

/// Email/password pair presented at sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Input for [`CredentialService::create_user`]. `role` falls back to `"user"`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Password hashing, sign-in and user provisioning over an injected store.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    scheme: PasswordScheme,
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, scheme: PasswordScheme) -> Self {
        Self { store, scheme }
    }

    /// Hashes on the blocking pool. Primitive errors are logged and replaced
    /// by [`AuthError::Hashing`].
    pub async fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        let scheme = self.scheme;
        let plain = plain.to_owned();
        let res = tokio::task::spawn_blocking(move || password::hash_password(&plain, scheme))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);

        res.map_err(|e| {
            error!(error = ?e, "error while hashing the password");
            AuthError::Hashing { source: e }
        })
    }

    pub async fn compare_password(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        let res = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);

        res.map_err(|e| {
            error!(error = ?e, "error while comparing password");
            AuthError::Comparison { source: e }
        })
    }

    /// Looks the user up by exact email and checks the password.
    /// The returned record never carries the hash.
    pub async fn authenticate_user(&self, creds: &Credentials) -> Result<PublicUser, AuthError> {
        self.try_authenticate(creds).await.map_err(|e| {
            error!(error = ?e, "error while authenticating user");
            e
        })
    }

    async fn try_authenticate(&self, creds: &Credentials) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_email(&creds.email)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !self.compare_password(&creds.password, &user.password).await? {
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user authenticated successfully");
        Ok(user.into())
    }

    /// Check-then-insert. A store that reports a uniqueness conflict on
    /// insert surfaces as [`AuthError::DuplicateUser`] as well.
    pub async fn create_user(&self, new_user: NewUser) -> Result<PublicUser, AuthError> {
        self.try_create(new_user).await.map_err(|e| {
            error!(error = ?e, "error while creating user");
            e
        })
    }

    async fn try_create(&self, new_user: NewUser) -> Result<PublicUser, AuthError> {
        let NewUser {
            name,
            email,
            password,
            role,
        } = new_user;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = self.hash_password(&password).await?;

        let created = self
            .store
            .insert(NewUserRecord {
                name,
                email,
                password_hash,
                role: role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            })
            .await?;

        info!(user_id = %created.id, "successfully created user");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::{AuthErrorKind, StoreError};
    use crate::auth::repo::MemoryUserStore;
    use crate::auth::repo_types::User;
    use async_trait::async_trait;

    const FAST: PasswordScheme = PasswordScheme::Bcrypt { cost: 4 };

    fn service() -> (CredentialService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (CredentialService::new(store.clone(), FAST), store)
    }

    fn ann() -> NewUser {
        NewUser {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password: "pw123456".into(),
            role: None,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl UserStore for FailingStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(anyhow::anyhow!("connection refused").into())
        }
        async fn insert(&self, _record: NewUserRecord) -> Result<PublicUser, StoreError> {
            Err(anyhow::anyhow!("connection refused").into())
        }
    }

    #[tokio::test]
    async fn hash_then_compare() {
        let (svc, _) = service();
        let hash = svc.hash_password("pw123456").await.unwrap();
        assert!(svc.compare_password("pw123456", &hash).await.unwrap());
        assert!(!svc.compare_password("pw1234567", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn hashing_failure_is_masked() {
        let svc = CredentialService::new(
            Arc::new(MemoryUserStore::new()),
            PasswordScheme::Bcrypt { cost: 99 },
        );
        let err = svc.hash_password("pw123456").await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Hashing);
        assert_eq!(err.to_string(), "Error Hashing Password");
    }

    #[tokio::test]
    async fn comparison_failure_is_masked() {
        let (svc, _) = service();
        let err = svc.compare_password("pw", "not-a-valid-hash").await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Comparison);
        assert_eq!(err.to_string(), "Error comparing password");
    }

    #[tokio::test]
    async fn create_user_returns_projection_with_default_role() {
        let (svc, store) = service();
        let user = svc.create_user(ann()).await.unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.role, "user");

        let json = serde_json::to_value(&user).unwrap();
        for key in ["id", "name", "email", "role", "created_at"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("password").is_none());

        let stored = store.find_by_email("ann@x.com").await.unwrap().unwrap();
        assert_ne!(stored.password, "pw123456");
        assert!(svc.compare_password("pw123456", &stored.password).await.unwrap());
    }

    #[tokio::test]
    async fn create_user_keeps_explicit_role() {
        let (svc, _) = service();
        let mut admin = ann();
        admin.role = Some("admin".into());
        let user = svc.create_user(admin).await.unwrap();
        assert_eq!(user.role, "admin");
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_email() {
        let (svc, store) = service();
        svc.create_user(ann()).await.unwrap();
        let err = svc.create_user(ann()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::DuplicateUser);
        assert_eq!(err.to_string(), "User already exists");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_create_user_yields_one_record() {
        let (svc, store) = service();
        let (a, b) = tokio::join!(svc.create_user(ann()), svc.create_user(ann()));
        let failures: Vec<_> = [a, b].into_iter().filter_map(Result::err).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), AuthErrorKind::DuplicateUser);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn authenticate_unknown_email() {
        let (svc, _) = service();
        let err = svc
            .authenticate_user(&Credentials {
                email: "nobody@x.com".into(),
                password: "pw123456".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NotFound);
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn authenticate_wrong_password() {
        let (svc, _) = service();
        svc.create_user(ann()).await.unwrap();
        let err = svc
            .authenticate_user(&Credentials {
                email: "ann@x.com".into(),
                password: "nope".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidCredentials);
        assert_eq!(err.to_string(), "Invalid password");
    }

    #[tokio::test]
    async fn authenticate_success_strips_password() {
        let (svc, _) = service();
        let created = svc.create_user(ann()).await.unwrap();
        let user = svc
            .authenticate_user(&Credentials {
                email: "ann@x.com".into(),
                password: "pw123456".into(),
            })
            .await
            .unwrap();
        assert_eq!(user, created);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn authenticate_with_argon2_hash_stored() {
        let store = Arc::new(MemoryUserStore::new());
        CredentialService::new(store.clone(), PasswordScheme::Argon2)
            .create_user(ann())
            .await
            .unwrap();
        // a bcrypt-configured service still verifies the argon2 hash
        let svc = CredentialService::new(store, FAST);
        let user = svc
            .authenticate_user(&Credentials {
                email: "ann@x.com".into(),
                password: "pw123456".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.email, "ann@x.com");
    }

    #[tokio::test]
    async fn store_errors_pass_through_unchanged() {
        let svc = CredentialService::new(Arc::new(FailingStore), FAST);
        let err = svc.create_user(ann()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Store);
        assert_eq!(err.to_string(), "connection refused");

        let err = svc
            .authenticate_user(&Credentials {
                email: "ann@x.com".into(),
                password: "pw123456".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Store);
        assert_eq!(err.to_string(), "connection refused");
    }
}
