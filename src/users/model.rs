use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{NodePath, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Blocked,
}

/// One day's meal record, keyed by `YYYY-MM-DD` under `meals`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMeals {
    #[serde(default)]
    pub breakfast: bool,
    #[serde(default)]
    pub lunch: bool,
    #[serde(default)]
    pub dinner: bool,
    #[serde(default)]
    pub total_expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositEntry {
    pub amount: f64,
    /// RFC 3339 instant of the deposit.
    pub date: String,
}

/// Everything stored at `/users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub balance: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meals: BTreeMap<String, DayMeals>,
    /// Keyed by the deposit's unix-millisecond timestamp.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deposits: BTreeMap<String, DepositEntry>,
}

impl UserRecord {
    pub fn new_member(name: String, room: String, phone: String, email: String, role: Role) -> Self {
        Self {
            name,
            room,
            phone,
            email,
            role,
            status: Status::Active,
            balance: 0.0,
            ..Default::default()
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == Status::Blocked
    }
}

pub fn users_root() -> NodePath {
    NodePath::root().child("users").expect("static path")
}

pub fn user_path(uid: &Uuid) -> Result<NodePath, StoreError> {
    users_root().child(uid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_sparse_records_with_defaults() {
        let rec: UserRecord = serde_json::from_value(json!({
            "name": "Karim",
            "balance": 120,
            "meals": {"2025-05-02": {"lunch": true, "totalExpense": 60}},
            "totmeals": 0
        }))
        .unwrap();
        assert_eq!(rec.role, Role::User);
        assert_eq!(rec.status, Status::Active);
        assert_eq!(rec.balance, 120.0);
        let day = &rec.meals["2025-05-02"];
        assert!(day.lunch && !day.breakfast && !day.dinner);
        assert_eq!(day.total_expense, 60.0);
    }

    #[test]
    fn writes_camel_case_fields() {
        let mut rec = UserRecord::new_member("A".into(), "12".into(), "01700000000".into(), "a@b.co".into(), Role::User);
        rec.meals.insert("2025-05-02".into(), DayMeals { breakfast: true, total_expense: 30.0, ..Default::default() });
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["status"], json!("active"));
        assert_eq!(v["meals"]["2025-05-02"]["totalExpense"], json!(30.0));
        assert!(v.get("deposits").is_none());
    }
}
