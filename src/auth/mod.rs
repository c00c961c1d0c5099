use crate::state::AppState;
use axum::Router;

mod dto;
pub mod error;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use error::{AuthError, AuthErrorKind, StoreError};
pub use repo_types::PublicUser;
pub use services::{CredentialService, Credentials, NewUser};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
