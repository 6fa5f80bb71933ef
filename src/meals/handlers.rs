use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use time::Date;
use tracing::{info, instrument, warn};

use super::dto::{DateQuery, MonthQuery, SelectionView, ToggleRequest};
use super::summary::{count_meals, month_summary, MealCounts, MonthSummary};
use crate::auth::{AdminUser, AuthUser, Session};
use crate::calendar::{date_key, is_before_deadline, parse_date_key, selection_date, service_date, YearMonth};
use crate::error::{bad_request, forbidden, not_found, ApiError};
use crate::ledger::{select_meals, toggle_meal, MealFlags, SelectionOutcome};
use crate::settings::{model::MealPrices, repo as settings};
use crate::state::AppState;
use crate::users::{model::UserRecord, repo as users};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/meals/selection", get(get_selection).put(put_selection))
        .route("/meals/selection/toggle", post(toggle_selection))
        .route("/me/meals", get(my_meals))
        .route("/admin/meal-counts", get(meal_counts))
}

async fn load_self(state: &AppState, session: &Session) -> Result<UserRecord, ApiError> {
    users::load_user(state.store.as_ref(), &session.user_id)
        .await?
        .ok_or_else(|| not_found("User not found"))
}

/// Checks run before any ledger update: the user must not be blocked and
/// the deadline must not have passed. Returns the target date and the
/// price table captured for this attempt.
async fn open_gate(state: &AppState, session: &Session) -> Result<(Date, MealPrices), ApiError> {
    let record = load_self(state, session).await?;
    if record.is_blocked() {
        warn!(user_id = %session.user_id, "blocked user tried to select meals");
        return Err(forbidden("You are blocked"));
    }

    let store = state.store.as_ref();
    let now = state.clock.now_utc();
    let offset = state.local_offset();
    let deadline = settings::load_deadline(store).await?;
    if !is_before_deadline(now, offset, deadline) {
        warn!(user_id = %session.user_id, ?deadline, "meal selection after deadline");
        return Err(forbidden("Meal selection time has expired"));
    }

    let prices = settings::load_prices(store).await?;
    Ok((selection_date(now, offset), prices))
}

#[instrument(skip(state))]
pub async fn get_selection(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Json<SelectionView>, ApiError> {
    let record = load_self(&state, &session).await?;
    let store = state.store.as_ref();
    let now = state.clock.now_utc();
    let offset = state.local_offset();
    let date = date_key(selection_date(now, offset));
    let deadline = settings::load_deadline(store).await?;
    let prices = settings::load_prices(store).await?;

    let day = record.meals.get(&date).cloned().unwrap_or_default();
    let blocked = record.is_blocked();
    Ok(Json(SelectionView {
        meals: MealFlags::from(&day),
        total_expense: day.total_expense,
        balance: record.balance,
        open: !blocked && is_before_deadline(now, offset, deadline),
        blocked,
        prices,
        deadline,
        date,
    }))
}

#[instrument(skip(state))]
pub async fn put_selection(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(desired): Json<MealFlags>,
) -> Result<Json<SelectionOutcome>, ApiError> {
    let (date, prices) = open_gate(&state, &session).await?;
    let outcome = select_meals(state.store.as_ref(), &session, date, desired, &prices).await?;
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn toggle_selection(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<SelectionOutcome>, ApiError> {
    let (date, prices) = open_gate(&state, &session).await?;
    let outcome = toggle_meal(state.store.as_ref(), &session, date, req.meal, &prices).await?;
    info!(user_id = %session.user_id, meal = ?req.meal, committed = outcome.committed, "meal toggled");
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn my_meals(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Query(q): Query<MonthQuery>,
) -> Result<Json<MonthSummary>, ApiError> {
    let month = match q.month.as_deref() {
        Some(raw) => YearMonth::parse(raw).ok_or_else(|| bad_request("month must be YYYY-MM"))?,
        None => YearMonth::current(state.clock.now_utc(), state.local_offset()),
    };
    let record = load_self(&state, &session).await?;
    Ok(Json(month_summary(&record, month)))
}

/// Head counts for `date`, or for the day currently being served. Reads
/// every user independently; concurrent selections may or may not be
/// reflected.
#[instrument(skip(state))]
pub async fn meal_counts(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<MealCounts>, ApiError> {
    let date = match q.date.as_deref() {
        Some(raw) => parse_date_key(raw).ok_or_else(|| bad_request("date must be YYYY-MM-DD"))?,
        None => service_date(state.clock.now_utc(), state.local_offset()),
    };
    let store = state.store.as_ref();
    let all = users::list_users(store).await?;
    let prices = settings::load_prices(store).await?;
    Ok(Json(count_meals(all.iter().map(|(_, rec)| rec), &date_key(date), &prices)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MealKind, Refusal};
    use crate::settings::model::MealDeadline;
    use crate::users::model::{user_path, Role};
    use axum::http::StatusCode;
    use serde_json::json;
    use time::macros::datetime;
    use uuid::Uuid;

    // AppState::fake() is pinned to 2025-06-14 12:00 local, so meals are
    // chosen for 2025-06-15.
    const TODAY: &str = "2025-06-14";
    const TARGET: &str = "2025-06-15";

    async fn setup(balance: f64) -> (AppState, Session) {
        let state = AppState::fake();
        let session = Session {
            user_id: Uuid::new_v4(),
            mode: Role::User,
        };
        state
            .store
            .set(&user_path(&session.user_id).unwrap(), json!({"name": "Nadia", "balance": balance}))
            .await
            .unwrap();
        settings::save_prices(
            state.store.as_ref(),
            &MealPrices {
                breakfast: 30.0,
                lunch: 60.0,
                dinner: 60.0,
            },
        )
        .await
        .unwrap();
        (state, session)
    }

    fn toggle(meal: MealKind) -> Json<ToggleRequest> {
        Json(ToggleRequest { meal })
    }

    async fn set_deadline(state: &AppState, hour: u8, minute: u8) {
        settings::save_deadline(state.store.as_ref(), &MealDeadline { hour, minute })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn toggle_settles_balance_for_tomorrow() {
        let (state, s) = setup(100.0).await;
        let Json(out) = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Breakfast))
            .await
            .unwrap();
        assert!(out.committed);
        assert_eq!(out.date, TARGET);
        assert_eq!(out.balance, 70.0);

        let Json(view) = get_selection(State(state), AuthUser(s)).await.unwrap();
        assert_eq!(view.date, TARGET);
        assert!(view.meals.breakfast);
        assert_eq!(view.total_expense, 30.0);
        assert!(view.open);
    }

    #[tokio::test]
    async fn refusal_is_not_an_error() {
        let (state, s) = setup(50.0).await;
        let desired = MealFlags {
            breakfast: true,
            lunch: true,
            dinner: false,
        };
        let Json(out) = put_selection(State(state), AuthUser(s), Json(desired)).await.unwrap();
        assert!(!out.committed);
        assert!(matches!(out.refusal, Some(Refusal::InsufficientBalance { .. })));
        assert_eq!(out.balance, 50.0);
    }

    #[tokio::test]
    async fn deadline_is_inclusive() {
        let (state, s) = setup(100.0).await;
        set_deadline(&state, 12, 0).await;
        let _ = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Lunch))
            .await
            .unwrap();

        set_deadline(&state, 11, 59).await;
        let err = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Lunch))
            .await
            .unwrap_err();
        assert_eq!(err, (StatusCode::FORBIDDEN, "Meal selection time has expired".to_string()));

        let Json(view) = get_selection(State(state), AuthUser(s)).await.unwrap();
        assert!(!view.open);
        assert!(view.meals.lunch);
    }

    #[tokio::test]
    async fn blocked_users_are_turned_away() {
        let (state, s) = setup(100.0).await;
        users::set_status(state.store.as_ref(), &s.user_id, crate::users::model::Status::Blocked)
            .await
            .unwrap();
        let err = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Dinner))
            .await
            .unwrap_err();
        assert_eq!(err.1, "You are blocked");
        let Json(view) = get_selection(State(state), AuthUser(s)).await.unwrap();
        assert!(view.blocked && !view.open);
    }

    #[tokio::test]
    async fn monthly_history_defaults_to_current_month() {
        let (state, s) = setup(500.0).await;
        let _ = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Dinner))
            .await
            .unwrap();

        let Json(june) = my_meals(State(state.clone()), AuthUser(s), Query(MonthQuery::default()))
            .await
            .unwrap();
        assert_eq!(june.month, "2025-06");
        assert_eq!(june.total_meals, 1);
        assert_eq!(june.total_cost, 60.0);

        let Json(july) = my_meals(
            State(state.clone()),
            AuthUser(s),
            Query(MonthQuery {
                month: Some("2025-07".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(july.days.len(), 31);
        assert_eq!(july.total_meals, 0);

        let err = my_meals(
            State(state),
            AuthUser(s),
            Query(MonthQuery {
                month: Some("June".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn counts_default_to_the_day_being_served() {
        let (state, s) = setup(500.0).await;
        // booked earlier for today
        state
            .store
            .set(
                &user_path(&s.user_id).unwrap().child("meals").unwrap().child(TODAY).unwrap(),
                json!({"breakfast": true, "lunch": true, "dinner": false, "totalExpense": 90}),
            )
            .await
            .unwrap();
        let _ = toggle_selection(State(state.clone()), AuthUser(s), toggle(MealKind::Dinner))
            .await
            .unwrap();
        let admin = || {
            AdminUser(Session {
                user_id: Uuid::new_v4(),
                mode: Role::Admin,
            })
        };

        let Json(today) = meal_counts(State(state.clone()), admin(), Query(DateQuery::default()))
            .await
            .unwrap();
        assert_eq!(today.date, TODAY);
        assert_eq!(today.breakfast.count, 1);
        assert_eq!(today.lunch.count, 1);
        assert_eq!(today.dinner.count, 0);
        assert_eq!(today.grand_total, 90.0);

        let Json(tomorrow) = meal_counts(
            State(state),
            admin(),
            Query(DateQuery {
                date: Some(TARGET.into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(tomorrow.dinner.count, 1);
        assert_eq!(tomorrow.lunch.count, 0);
    }

    #[tokio::test]
    async fn counts_before_two_am_belong_to_the_previous_day() {
        // 01:30 local on 2025-06-15
        let state = AppState::fake_at(datetime!(2025-06-14 19:30 UTC));
        let admin = AdminUser(Session {
            user_id: Uuid::new_v4(),
            mode: Role::Admin,
        });
        let Json(counts) = meal_counts(State(state), admin, Query(DateQuery::default())).await.unwrap();
        assert_eq!(counts.date, TODAY);
    }
}
