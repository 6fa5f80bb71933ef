use crate::state::AppState;
use axum::Router;

pub mod accounts;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;

pub use extractors::{AdminUser, AuthUser, Session};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
