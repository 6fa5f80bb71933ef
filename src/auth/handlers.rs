use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::accounts::{self, Account};
use super::dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest};
use super::extractors::AuthUser;
use super::jwt::JwtKeys;
use crate::error::{bad_request, internal, ApiError};
use crate::state::AppState;
use crate::store::get_as;
use crate::users::model::{user_path, Role, UserRecord};
use crate::validation::{validate_new_password, validate_profile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

fn unauthorized(msg: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, msg.to_string())
}

fn issue(
    state: &AppState,
    user_id: Uuid,
    record: &UserRecord,
    mode: Role,
    epoch: u64,
) -> Result<AuthResponse, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let (access_token, refresh_token) = keys.sign_pair(user_id, mode, epoch).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user_id,
            name: record.name.clone(),
            email: record.email.clone(),
            role: record.role,
            mode,
            status: record.status,
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let name = payload.name.trim().to_string();
    let room = payload.room.trim().to_string();
    let phone = payload.phone.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if let Err(msg) = validate_profile(&name, &room, &phone, &email) {
        warn!(email = %email, msg, "registration rejected");
        return Err(bad_request(msg));
    }
    validate_new_password(&payload.password, &payload.confirm_password).map_err(bad_request)?;

    let store = state.store.as_ref();
    let uid = Uuid::new_v4();
    if !accounts::claim_email(store, &email, &uid).await? {
        warn!(email = %email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let role = match state.config.meals.bootstrap_admin_email.as_deref() {
        Some(admin) if admin == email => Role::Admin,
        _ => Role::User,
    };
    let record = UserRecord::new_member(name, room, phone, email.clone(), role);

    if let Err(e) = create_member(&state, &uid, &payload.password, &record).await {
        if let Err(cleanup) = accounts::release_email(store, &email).await {
            error!(error = %cleanup, email = %email, "failed to release email claim");
        }
        return Err(e);
    }

    info!(user_id = %uid, email = %email, ?role, "user registered");
    Ok(Json(issue(&state, uid, &record, role, 0)?))
}

async fn create_member(state: &AppState, uid: &Uuid, password: &str, record: &UserRecord) -> Result<(), ApiError> {
    let password_hash = accounts::hash_password(password).map_err(internal)?;
    let account = Account {
        email: record.email.clone(),
        password_hash,
        token_epoch: 0,
        last_mode: None,
    };
    let store = state.store.as_ref();
    accounts::create_account(store, uid, &account).await?;
    let body = serde_json::to_value(record).map_err(internal)?;
    store.set(&user_path(uid)?, body).await?;
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let store = state.store.as_ref();

    let Some(uid) = accounts::find_uid_by_email(store, &email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(unauthorized("Invalid credentials"));
    };
    let Some(account) = accounts::get_account(store, &uid).await? else {
        warn!(email = %email, user_id = %uid, "email claim without account");
        return Err(unauthorized("Invalid credentials"));
    };

    let ok = accounts::verify_password(&payload.password, &account.password_hash).map_err(internal)?;
    if !ok {
        warn!(email = %email, user_id = %uid, "login invalid password");
        return Err(unauthorized("Invalid credentials"));
    }

    let Some(record) = get_as::<UserRecord>(store, &user_path(&uid)?).await? else {
        warn!(user_id = %uid, "account without user record");
        return Err(unauthorized("User data not found"));
    };

    let mode = match (record.role, payload.mode) {
        (Role::User, Some(Role::Admin)) => {
            warn!(user_id = %uid, "admin mode requested by non-admin");
            return Err((StatusCode::FORBIDDEN, "You are not an admin".into()));
        }
        (Role::User, _) => Role::User,
        (Role::Admin, Some(mode)) => {
            accounts::remember_mode(store, &uid, mode).await?;
            mode
        }
        (Role::Admin, None) => account.last_mode.unwrap_or(Role::Admin),
    };

    info!(user_id = %uid, ?mode, "user logged in");
    Ok(Json(issue(&state, uid, &record, mode, account.token_epoch)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;
    let uid = claims.sub;
    let store = state.store.as_ref();

    let Some(account) = accounts::get_account(store, &uid).await? else {
        return Err(unauthorized("User not found"));
    };
    if claims.epoch != account.token_epoch {
        warn!(user_id = %uid, token_epoch = claims.epoch, current = account.token_epoch, "stale refresh token");
        return Err(unauthorized("Session expired"));
    }
    let Some(record) = get_as::<UserRecord>(store, &user_path(&uid)?).await? else {
        return Err(unauthorized("User data not found"));
    };

    // demoted admins fall back to user mode
    let mode = if record.role == Role::Admin { claims.mode } else { Role::User };
    Ok(Json(issue(&state, uid, &record, mode, account.token_epoch)?))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>, AuthUser(session): AuthUser) -> Result<StatusCode, ApiError> {
    let epoch = accounts::bump_token_epoch(state.store.as_ref(), &session.user_id).await?;
    info!(user_id = %session.user_id, ?epoch, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}
