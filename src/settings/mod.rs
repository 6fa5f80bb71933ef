//! Hall-wide settings: meal prices, the selection deadline, the weekly menu
//! and the notice board. All writes are plain overwrites by admins.

pub mod handlers;
pub mod model;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
