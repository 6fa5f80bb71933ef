use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::model::{Role, Status, UserRecord};
use super::repo::{self, AdminEdit};
use crate::auth::{accounts, AdminUser, AuthUser};
use crate::error::{bad_request, not_found, ApiError};
use crate::ledger::round_money;
use crate::state::AppState;
use crate::validation::{is_valid_phone, validate_profile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/profile", patch(patch_profile))
        .route("/admin/users", get(list_users))
        .route(
            "/admin/users/:uid",
            get(get_user).put(put_user).delete(delete_user),
        )
        .route("/admin/users/:uid/status", put(put_status))
        .route("/admin/users/:uid/role", put(put_role))
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub room: String,
    pub phone: String,
    pub email: String,
    pub role: Role,
    pub status: Status,
    pub balance: f64,
    /// Present on `/me` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Role>,
}

impl UserView {
    fn new(id: Uuid, rec: UserRecord) -> Self {
        Self {
            id,
            name: rec.name,
            room: rec.room,
            phone: rec.phone,
            email: rec.email,
            role: rec.role,
            status: rec.status,
            balance: rec.balance,
            mode: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfilePatch {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminEditRequest {
    pub name: String,
    pub room: String,
    pub phone: String,
    pub email: String,
    pub balance: f64,
    pub role: Role,
    pub status: Status,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Status,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

async fn existing(state: &AppState, uid: &Uuid) -> Result<UserRecord, ApiError> {
    repo::load_user(state.store.as_ref(), uid)
        .await?
        .ok_or_else(|| not_found("User not found"))
}

#[instrument(skip(state))]
pub async fn get_me(State(state): State<AppState>, AuthUser(session): AuthUser) -> Result<Json<UserView>, ApiError> {
    let rec = existing(&state, &session.user_id).await?;
    let mut view = UserView::new(session.user_id, rec);
    view.mode = Some(session.mode);
    Ok(Json(view))
}

#[instrument(skip(state, payload))]
pub async fn patch_profile(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(payload): Json<ProfilePatch>,
) -> Result<Json<UserView>, ApiError> {
    let name = payload.name.trim();
    let phone = payload.phone.trim();
    if name.is_empty() {
        return Err(bad_request("Name is required."));
    }
    if !is_valid_phone(phone) {
        return Err(bad_request("Phone number must be 11 digits."));
    }
    existing(&state, &session.user_id).await?;
    repo::update_contact(state.store.as_ref(), &session.user_id, name, phone).await?;
    info!(user_id = %session.user_id, "profile updated");
    get_me(State(state), AuthUser(session)).await
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = repo::list_users(state.store.as_ref()).await?;
    Ok(Json(users.into_iter().map(|(id, rec)| UserView::new(id, rec)).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(uid): Path<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    let rec = existing(&state, &uid).await?;
    Ok(Json(UserView::new(uid, rec)))
}

/// Plain overwrite of the editable fields; last writer wins.
#[instrument(skip(state, payload))]
pub async fn put_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(uid): Path<Uuid>,
    Json(payload): Json<AdminEditRequest>,
) -> Result<Json<UserView>, ApiError> {
    let edit = AdminEdit {
        name: payload.name.trim().to_string(),
        room: payload.room.trim().to_string(),
        phone: payload.phone.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        balance: payload.balance,
        role: payload.role,
        status: payload.status,
    };
    validate_profile(&edit.name, &edit.room, &edit.phone, &edit.email).map_err(bad_request)?;
    if !edit.balance.is_finite() {
        return Err(bad_request("Balance must be a number"));
    }
    let edit = AdminEdit {
        balance: round_money(edit.balance),
        ..edit
    };

    existing(&state, &uid).await?;
    repo::apply_admin_edit(state.store.as_ref(), &uid, &edit).await?;
    info!(admin = %admin.user_id, user_id = %uid, balance = edit.balance, "user edited by admin");
    Ok(Json(UserView::new(uid, existing(&state, &uid).await?)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(uid): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if uid == admin.user_id {
        warn!(admin = %admin.user_id, "admin tried to delete own account");
        return Err(bad_request("You cannot delete your own account"));
    }
    existing(&state, &uid).await?;
    let store = state.store.as_ref();
    repo::delete_user(store, &uid).await?;
    accounts::delete_account(store, &uid).await?;
    info!(admin = %admin.user_id, user_id = %uid, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn put_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(uid): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<UserView>, ApiError> {
    existing(&state, &uid).await?;
    repo::set_status(state.store.as_ref(), &uid, payload.status).await?;
    info!(admin = %admin.user_id, user_id = %uid, status = ?payload.status, "user status changed");
    Ok(Json(UserView::new(uid, existing(&state, &uid).await?)))
}

#[instrument(skip(state))]
pub async fn put_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(uid): Path<Uuid>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<UserView>, ApiError> {
    existing(&state, &uid).await?;
    repo::set_role(state.store.as_ref(), &uid, payload.role).await?;
    info!(admin = %admin.user_id, user_id = %uid, role = ?payload.role, "user role changed");
    Ok(Json(UserView::new(uid, existing(&state, &uid).await?)))
}
