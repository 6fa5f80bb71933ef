use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Weekday;

use crate::store::NodePath;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MealPrices {
    #[serde(default)]
    pub breakfast: f64,
    #[serde(default)]
    pub lunch: f64,
    #[serde(default)]
    pub dinner: f64,
}

impl MealPrices {
    pub fn validate(&self) -> Result<(), &'static str> {
        for p in [self.breakfast, self.lunch, self.dinner] {
            if !p.is_finite() || p < 0.0 {
                return Err("Prices must be non-negative numbers");
            }
        }
        Ok(())
    }
}

/// Local time of day after which tomorrow's selection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealDeadline {
    pub hour: u8,
    pub minute: u8,
}

impl MealDeadline {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.hour > 23 || self.minute > 59 {
            return Err("Deadline must be a valid time of day");
        }
        Ok(())
    }
}

/// Day ids in the order the weekly menu is kept.
pub const MENU_DAYS: [&str; 7] = ["sat", "sun", "mon", "tue", "wed", "thu", "fri"];

pub fn menu_day_id(day: Weekday) -> &'static str {
    match day {
        Weekday::Saturday => "sat",
        Weekday::Sunday => "sun",
        Weekday::Monday => "mon",
        Weekday::Tuesday => "tue",
        Weekday::Wednesday => "wed",
        Weekday::Thursday => "thu",
        Weekday::Friday => "fri",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuDay {
    pub day: String,
    #[serde(default)]
    pub breakfast: String,
    #[serde(default)]
    pub lunch: String,
    #[serde(default)]
    pub dinner: String,
}

impl MenuDay {
    pub fn empty(day: &str) -> Self {
        Self {
            day: day.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub visited: BTreeMap<String, bool>,
}

fn path(raw: &str) -> NodePath {
    NodePath::parse(raw).expect("static path")
}

pub fn prices_path() -> NodePath {
    path("/mealPrices")
}

pub fn deadline_path() -> NodePath {
    path("/settings/mealDeadline")
}

pub fn weekly_menu_path() -> NodePath {
    path("/menu/weekly")
}

pub fn notice_path() -> NodePath {
    path("/notice")
}
