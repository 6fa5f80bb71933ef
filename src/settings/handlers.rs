use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::model::{menu_day_id, MealDeadline, MealPrices, MenuDay};
use super::repo;
use crate::auth::{AdminUser, AuthUser, Session};
use crate::calendar::selection_date;
use crate::error::{bad_request, ApiError};
use crate::state::AppState;
use crate::users::{model::Role, repo as users};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settings/prices", get(get_prices).put(put_prices))
        .route("/settings/deadline", get(get_deadline).put(put_deadline))
        .route("/menu/weekly", get(get_weekly_menu).put(put_weekly_menu))
        .route("/menu/tomorrow", get(get_tomorrow_menu))
        .route("/notice", get(get_notice).put(put_notice))
        .route("/notice/visited", post(mark_visited))
}

#[instrument(skip(state))]
pub async fn get_prices(State(state): State<AppState>, _user: AuthUser) -> Result<Json<MealPrices>, ApiError> {
    Ok(Json(repo::load_prices(state.store.as_ref()).await?))
}

#[instrument(skip(state))]
pub async fn put_prices(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(prices): Json<MealPrices>,
) -> Result<Json<MealPrices>, ApiError> {
    prices.validate().map_err(bad_request)?;
    repo::save_prices(state.store.as_ref(), &prices).await?;
    info!(admin = %admin.user_id, ?prices, "meal prices updated");
    Ok(Json(prices))
}

#[instrument(skip(state))]
pub async fn get_deadline(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Option<MealDeadline>>, ApiError> {
    Ok(Json(repo::load_deadline(state.store.as_ref()).await?))
}

#[instrument(skip(state))]
pub async fn put_deadline(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(deadline): Json<MealDeadline>,
) -> Result<Json<MealDeadline>, ApiError> {
    deadline.validate().map_err(bad_request)?;
    repo::save_deadline(state.store.as_ref(), &deadline).await?;
    info!(admin = %admin.user_id, hour = deadline.hour, minute = deadline.minute, "meal deadline updated");
    Ok(Json(deadline))
}

#[instrument(skip(state))]
pub async fn get_weekly_menu(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Vec<MenuDay>>, ApiError> {
    Ok(Json(repo::load_weekly_menu(state.store.as_ref()).await?))
}

#[instrument(skip(state, entries))]
pub async fn put_weekly_menu(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(entries): Json<Vec<MenuDay>>,
) -> Result<Json<Vec<MenuDay>>, ApiError> {
    let week = repo::prepare_menu(entries).map_err(bad_request)?;
    repo::save_weekly_menu(state.store.as_ref(), &week).await?;
    info!(admin = %admin.user_id, "weekly menu saved");
    Ok(Json(week))
}

/// Menu for the day meals are currently being chosen for.
#[instrument(skip(state))]
pub async fn get_tomorrow_menu(State(state): State<AppState>, _user: AuthUser) -> Result<Json<MenuDay>, ApiError> {
    let tomorrow = selection_date(state.clock.now_utc(), state.local_offset());
    let id = menu_day_id(tomorrow.weekday());
    let week = repo::load_weekly_menu(state.store.as_ref()).await?;
    let entry = week
        .into_iter()
        .find(|m| m.day == id)
        .unwrap_or_else(|| MenuDay::empty(id));
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct NoticeRequest {
    pub text: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct NoticeView {
    pub text: String,
    pub published: bool,
    /// Whether the caller has seen this notice.
    pub visited: bool,
}

/// Admin mode on the token is not enough; the stored role must still be admin.
async fn can_read_drafts(state: &AppState, session: &Session) -> Result<bool, ApiError> {
    if session.mode != Role::Admin {
        return Ok(false);
    }
    let record = users::load_user(state.store.as_ref(), &session.user_id).await?;
    Ok(record.map_or(false, |r| r.role == Role::Admin))
}

/// Members only see published text; admins in admin mode see drafts too.
#[instrument(skip(state))]
pub async fn get_notice(State(state): State<AppState>, AuthUser(session): AuthUser) -> Result<Json<NoticeView>, ApiError> {
    let notice = repo::load_notice(state.store.as_ref()).await?;
    let visited = notice.visited.get(&session.user_id.to_string()).copied().unwrap_or(false);
    let text = if notice.published || can_read_drafts(&state, &session).await? {
        notice.text
    } else {
        String::new()
    };
    Ok(Json(NoticeView {
        text,
        published: notice.published,
        visited,
    }))
}

#[instrument(skip(state, payload))]
pub async fn put_notice(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<NoticeRequest>,
) -> Result<Json<NoticeView>, ApiError> {
    let notice = repo::save_notice(state.store.as_ref(), payload.text, payload.published).await?;
    info!(admin = %admin.user_id, published = notice.published, "notice saved");
    Ok(Json(NoticeView {
        text: notice.text,
        published: notice.published,
        visited: false,
    }))
}

#[instrument(skip(state))]
pub async fn mark_visited(State(state): State<AppState>, AuthUser(session): AuthUser) -> Result<StatusCode, ApiError> {
    repo::mark_notice_visited(state.store.as_ref(), &session.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
