use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use tracing::{debug, info, instrument};

use super::{round_money, LedgerError};
use crate::auth::Session;
use crate::calendar::date_key;
use crate::settings::model::MealPrices;
use crate::store::{get_as, tree, TreeStore, TxOutcome};
use crate::users::model::{user_path, DayMeals, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealFlags {
    #[serde(default)]
    pub breakfast: bool,
    #[serde(default)]
    pub lunch: bool,
    #[serde(default)]
    pub dinner: bool,
}

impl MealFlags {
    pub fn toggled(mut self, kind: MealKind) -> Self {
        match kind {
            MealKind::Breakfast => self.breakfast = !self.breakfast,
            MealKind::Lunch => self.lunch = !self.lunch,
            MealKind::Dinner => self.dinner = !self.dinner,
        }
        self
    }

    /// Sum of the prices of the meals that are switched on.
    pub fn expense(&self, prices: &MealPrices) -> f64 {
        let mut total = 0.0;
        if self.breakfast {
            total += prices.breakfast;
        }
        if self.lunch {
            total += prices.lunch;
        }
        if self.dinner {
            total += prices.dinner;
        }
        round_money(total)
    }
}

impl From<&DayMeals> for MealFlags {
    fn from(d: &DayMeals) -> Self {
        Self {
            breakfast: d.breakfast,
            lunch: d.lunch,
            dinner: d.dinner,
        }
    }
}

/// Why a selection was not committed. None of these is an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Refusal {
    InsufficientBalance { balance: f64, needed: f64 },
    Blocked,
    UserMissing,
    MalformedRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPlan {
    pub previous_expense: f64,
    pub requested_expense: f64,
    pub new_balance: f64,
}

/// The ledger rule for one day's selection:
/// `new = balance + previous − requested`, refused when it would go negative.
pub fn plan_meal_selection(
    record: &UserRecord,
    date: &str,
    desired: MealFlags,
    prices: &MealPrices,
) -> Result<SelectionPlan, Refusal> {
    if record.is_blocked() {
        return Err(Refusal::Blocked);
    }
    let previous_expense = record
        .meals
        .get(date)
        .map(|d| MealFlags::from(d).expense(prices))
        .unwrap_or(0.0);
    let requested_expense = desired.expense(prices);
    let new_balance = round_money(record.balance + previous_expense - requested_expense);
    if new_balance < 0.0 {
        return Err(Refusal::InsufficientBalance {
            balance: record.balance,
            needed: round_money(requested_expense - previous_expense),
        });
    }
    Ok(SelectionPlan {
        previous_expense,
        requested_expense,
        new_balance,
    })
}

/// Evaluates one attempt against the raw `/users/{uid}` node. Only `balance`
/// and `meals/{date}` are rewritten; any other field is carried over as is.
fn apply_selection(
    current: Option<&Value>,
    date: &str,
    desired: MealFlags,
    prices: &MealPrices,
) -> Result<Value, Refusal> {
    let raw = current.ok_or(Refusal::UserMissing)?;
    let record: UserRecord = serde_json::from_value(raw.clone()).map_err(|_| Refusal::MalformedRecord)?;
    let plan = plan_meal_selection(&record, date, desired, prices)?;
    debug!(
        date,
        refunded = plan.previous_expense,
        charged = plan.requested_expense,
        "selection attempt settles"
    );

    let day = DayMeals {
        breakfast: desired.breakfast,
        lunch: desired.lunch,
        dinner: desired.dinner,
        total_expense: plan.requested_expense,
    };
    let day = serde_json::to_value(day).map_err(|_| Refusal::MalformedRecord)?;

    let mut next = raw.clone();
    tree::set_at(&mut next, &["balance".to_string()], Value::from(plan.new_balance));
    tree::set_at(&mut next, &["meals".to_string(), date.to_string()], day);
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionOutcome {
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<Refusal>,
    pub date: String,
    /// Balance as stored after the attempt.
    pub balance: f64,
    /// Flags as stored after the attempt.
    pub meals: MealFlags,
    pub total_expense: f64,
}

impl SelectionOutcome {
    fn from_snapshot(committed: bool, refusal: Option<Refusal>, date: &str, snapshot: Option<&Value>) -> Self {
        let record = snapshot
            .and_then(|v| serde_json::from_value::<UserRecord>(v.clone()).ok())
            .unwrap_or_default();
        let day = record.meals.get(date).cloned().unwrap_or_default();
        Self {
            committed,
            refusal,
            date: date.to_string(),
            balance: record.balance,
            meals: MealFlags::from(&day),
            total_expense: day.total_expense,
        }
    }
}

/// Atomically replaces the session user's meal flags for `date` and settles
/// the balance. `prices` is captured by the caller before the update.
#[instrument(skip(store, prices), fields(user_id = %session.user_id))]
pub async fn select_meals(
    store: &dyn TreeStore,
    session: &Session,
    date: Date,
    desired: MealFlags,
    prices: &MealPrices,
) -> Result<SelectionOutcome, LedgerError> {
    let key = date_key(date);
    let path = user_path(&session.user_id)?;

    let result = store
        .transaction(&path, &|current| {
            match apply_selection(current.as_ref(), &key, desired, prices) {
                Ok(next) => TxOutcome::Commit(next),
                Err(_) => TxOutcome::Abort,
            }
        })
        .await?;

    if result.committed {
        let outcome = SelectionOutcome::from_snapshot(true, None, &key, result.snapshot.as_ref());
        info!(date = %key, balance = outcome.balance, ?desired, "meal selection committed");
        return Ok(outcome);
    }

    // The callback is deterministic, so the abort snapshot reproduces its refusal.
    let refusal = apply_selection(result.snapshot.as_ref(), &key, desired, prices)
        .err()
        .unwrap_or(Refusal::MalformedRecord);
    if refusal == Refusal::UserMissing {
        return Err(LedgerError::UserNotFound);
    }
    debug!(date = %key, ?refusal, "meal selection refused");
    Ok(SelectionOutcome::from_snapshot(
        false,
        Some(refusal),
        &key,
        result.snapshot.as_ref(),
    ))
}

/// Flips one meal relative to the flags currently stored for `date`.
pub async fn toggle_meal(
    store: &dyn TreeStore,
    session: &Session,
    date: Date,
    kind: MealKind,
    prices: &MealPrices,
) -> Result<SelectionOutcome, LedgerError> {
    let path = user_path(&session.user_id)?
        .child("meals")?
        .child(date_key(date))?;
    let stored = get_as::<DayMeals>(store, &path).await?.unwrap_or_default();
    let desired = MealFlags::from(&stored).toggled(kind);
    select_meals(store, session, date, desired, prices).await
}
