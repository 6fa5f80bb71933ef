use serde::Serialize;

use crate::calendar::{date_key, YearMonth};
use crate::ledger::round_money;
use crate::settings::model::MealPrices;
use crate::users::model::UserRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub date: String,
    pub breakfast: bool,
    pub lunch: bool,
    pub dinner: bool,
    pub total_expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    pub days: Vec<DayRecord>,
    pub total_meals: u32,
    pub total_cost: f64,
}

/// One line per date of `month`, oldest first; days without a record show
/// no meals. The cost is the sum of the stored `totalExpense` values, not a
/// re-pricing.
pub fn month_summary(record: &UserRecord, month: YearMonth) -> MonthSummary {
    let days: Vec<DayRecord> = month
        .dates()
        .into_iter()
        .map(|date| {
            let key = date_key(date);
            let day = record.meals.get(&key).cloned().unwrap_or_default();
            DayRecord {
                date: key,
                breakfast: day.breakfast,
                lunch: day.lunch,
                dinner: day.dinner,
                total_expense: day.total_expense,
            }
        })
        .collect();

    let total_meals = days
        .iter()
        .map(|d| d.breakfast as u32 + d.lunch as u32 + d.dinner as u32)
        .sum();
    let total_cost = round_money(days.iter().map(|d| d.total_expense).sum::<f64>());

    MonthSummary {
        month: month.label(),
        days,
        total_meals,
        total_cost,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MealTally {
    pub count: u32,
    pub price: f64,
    pub cost: f64,
}

impl MealTally {
    fn priced(count: u32, price: f64) -> Self {
        Self {
            count,
            price,
            cost: round_money(count as f64 * price),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealCounts {
    pub date: String,
    pub breakfast: MealTally,
    pub lunch: MealTally,
    pub dinner: MealTally,
    pub grand_total: f64,
}

/// Head count per meal for `date`, priced at the current table.
pub fn count_meals<'a>(
    records: impl IntoIterator<Item = &'a UserRecord>,
    date: &str,
    prices: &MealPrices,
) -> MealCounts {
    let (mut b, mut l, mut d) = (0u32, 0u32, 0u32);
    for rec in records {
        if let Some(day) = rec.meals.get(date) {
            b += day.breakfast as u32;
            l += day.lunch as u32;
            d += day.dinner as u32;
        }
    }
    let breakfast = MealTally::priced(b, prices.breakfast);
    let lunch = MealTally::priced(l, prices.lunch);
    let dinner = MealTally::priced(d, prices.dinner);
    MealCounts {
        date: date.to_string(),
        grand_total: round_money(breakfast.cost + lunch.cost + dinner.cost),
        breakfast,
        lunch,
        dinner,
    }
}
