use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::model::{
    deadline_path, notice_path, prices_path, weekly_menu_path, MealDeadline, MealPrices, MenuDay, Notice, MENU_DAYS,
};
use crate::store::{get_as, StoreError, TreeStore};

/// Missing prices read as zero.
pub async fn load_prices(store: &dyn TreeStore) -> Result<MealPrices, StoreError> {
    Ok(get_as(store, &prices_path()).await?.unwrap_or_default())
}

pub async fn save_prices(store: &dyn TreeStore, prices: &MealPrices) -> Result<(), StoreError> {
    store.set(&prices_path(), serde_json::to_value(prices)?).await
}

pub async fn load_deadline(store: &dyn TreeStore) -> Result<Option<MealDeadline>, StoreError> {
    get_as(store, &deadline_path()).await
}

pub async fn save_deadline(store: &dyn TreeStore, deadline: &MealDeadline) -> Result<(), StoreError> {
    store.set(&deadline_path(), serde_json::to_value(deadline)?).await
}

fn menu_entry(day: &str, raw: &Value) -> Option<MenuDay> {
    let text = |field: &str| raw.get(field).and_then(Value::as_str).unwrap_or_default().to_string();
    let day = day.to_lowercase();
    MENU_DAYS.contains(&day.as_str()).then(|| MenuDay {
        breakfast: text("breakfast"),
        lunch: text("lunch"),
        dinner: text("dinner"),
        day,
    })
}

/// Seven entries in menu order. Accepts the stored array form as well as an
/// object keyed by day id; unknown days are ignored.
pub fn normalize_menu(raw: Option<&Value>) -> Vec<MenuDay> {
    let mut found: Vec<MenuDay> = Vec::new();
    match raw {
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(day) = item.get("day").and_then(Value::as_str) {
                    found.extend(menu_entry(day, item));
                }
            }
        }
        Some(Value::Object(map)) => {
            for (day, item) in map {
                found.extend(menu_entry(day, item));
            }
        }
        Some(other) if !other.is_null() => warn!("weekly menu has unexpected shape"),
        _ => {}
    }

    MENU_DAYS
        .iter()
        .map(|id| {
            found
                .iter()
                .rev()
                .find(|m| m.day == *id)
                .cloned()
                .unwrap_or_else(|| MenuDay::empty(id))
        })
        .collect()
}

pub async fn load_weekly_menu(store: &dyn TreeStore) -> Result<Vec<MenuDay>, StoreError> {
    let raw = store.get(&weekly_menu_path()).await?;
    Ok(normalize_menu(raw.as_ref()))
}

/// Checks day ids and fills the week. Days not sent are saved empty.
pub fn prepare_menu(entries: Vec<MenuDay>) -> Result<Vec<MenuDay>, String> {
    let mut seen: Vec<String> = Vec::with_capacity(entries.len());
    for entry in &entries {
        let day = entry.day.trim().to_lowercase();
        if !MENU_DAYS.contains(&day.as_str()) {
            return Err(format!("Unknown day: {}", entry.day));
        }
        if seen.contains(&day) {
            return Err(format!("Duplicate day: {}", day));
        }
        seen.push(day);
    }
    let normalized = entries
        .into_iter()
        .map(|e| MenuDay {
            day: e.day.trim().to_lowercase(),
            ..e
        })
        .collect::<Vec<_>>();
    let value = serde_json::to_value(&normalized).map_err(|e| e.to_string())?;
    Ok(normalize_menu(Some(&value)))
}

pub async fn save_weekly_menu(store: &dyn TreeStore, menu: &[MenuDay]) -> Result<(), StoreError> {
    store.set(&weekly_menu_path(), serde_json::to_value(menu)?).await
}

pub async fn load_notice(store: &dyn TreeStore) -> Result<Notice, StoreError> {
    Ok(get_as(store, &notice_path()).await?.unwrap_or_default())
}

/// Overwrites the notice. Everyone has to see the new text again.
pub async fn save_notice(store: &dyn TreeStore, text: String, published: bool) -> Result<Notice, StoreError> {
    let notice = Notice {
        text,
        published,
        visited: Default::default(),
    };
    store.set(&notice_path(), serde_json::to_value(&notice)?).await?;
    Ok(notice)
}

pub async fn mark_notice_visited(store: &dyn TreeStore, uid: &Uuid) -> Result<(), StoreError> {
    let path = notice_path().child("visited")?.child(uid.to_string())?;
    store.set(&path, Value::Bool(true)).await
}
