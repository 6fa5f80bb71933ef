//! Admin credits and the member's deposit log. The balance update itself
//! lives in the ledger.

pub mod handlers;
pub mod history;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
