use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::history::{deposits_in_month, DepositHistory};
use crate::auth::{AdminUser, AuthUser};
use crate::calendar::YearMonth;
use crate::error::{bad_request, not_found, ApiError};
use crate::ledger::{record_deposit, DepositReceipt};
use crate::state::AppState;
use crate::users::repo as users;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users/:uid/deposits", post(create_deposit))
        .route("/me/deposits", get(my_deposits))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[instrument(skip(state))]
pub async fn create_deposit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(uid): Path<Uuid>,
    Json(req): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositReceipt>), ApiError> {
    let receipt = record_deposit(state.store.as_ref(), uid, req.amount, state.clock.now_utc()).await?;
    info!(admin = %admin.user_id, user_id = %uid, amount = receipt.entry.amount, "deposit credited");
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[instrument(skip(state))]
pub async fn my_deposits(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Query(q): Query<MonthQuery>,
) -> Result<Json<DepositHistory>, ApiError> {
    let offset = state.local_offset();
    let month = match q.month.as_deref() {
        Some(raw) => YearMonth::parse(raw).ok_or_else(|| bad_request("month must be YYYY-MM"))?,
        None => YearMonth::current(state.clock.now_utc(), offset),
    };
    let record = users::load_user(state.store.as_ref(), &session.user_id)
        .await?
        .ok_or_else(|| not_found("User not found"))?;
    Ok(Json(deposits_in_month(&record, month, offset)))
}
