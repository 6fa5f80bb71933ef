use serde::{Deserialize, Serialize};

use crate::ledger::{MealFlags, MealKind};
use crate::settings::model::{MealDeadline, MealPrices};

/// What the selection screen needs in one call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    /// Day being chosen for (local tomorrow).
    pub date: String,
    pub meals: MealFlags,
    pub total_expense: f64,
    pub balance: f64,
    pub prices: MealPrices,
    pub deadline: Option<MealDeadline>,
    /// False once the deadline has passed or the user is blocked.
    pub open: bool,
    pub blocked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub meal: MealKind,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}
