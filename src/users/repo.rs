use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::model::{user_path, users_root, Role, Status, UserRecord};
use crate::store::{get_as, StoreError, TreeStore};

pub async fn load_user(store: &dyn TreeStore, uid: &Uuid) -> Result<Option<UserRecord>, StoreError> {
    get_as(store, &user_path(uid)?).await
}

/// Every user record, in uid order. Records that fail to parse are skipped.
/// Each record is read as it is now; there is no snapshot across users.
pub async fn list_users(store: &dyn TreeStore) -> Result<Vec<(Uuid, UserRecord)>, StoreError> {
    let Some(Value::Object(all)) = store.get(&users_root()).await? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(all.len());
    for (key, raw) in all {
        let Ok(uid) = Uuid::parse_str(&key) else {
            warn!(key, "non-uuid key under /users");
            continue;
        };
        match serde_json::from_value::<UserRecord>(raw) {
            Ok(rec) => out.push((uid, rec)),
            Err(e) => warn!(error = %e, %uid, "skipping malformed user record"),
        }
    }
    out.sort_by_key(|(uid, _)| *uid);
    Ok(out)
}

/// Fields an admin may overwrite directly. Meals and deposits are untouched.
#[derive(Debug, Clone)]
pub struct AdminEdit {
    pub name: String,
    pub room: String,
    pub phone: String,
    pub email: String,
    pub balance: f64,
    pub role: Role,
    pub status: Status,
}

pub async fn apply_admin_edit(store: &dyn TreeStore, uid: &Uuid, edit: &AdminEdit) -> Result<(), StoreError> {
    let mut fields = Map::new();
    fields.insert("name".into(), Value::from(edit.name.clone()));
    fields.insert("room".into(), Value::from(edit.room.clone()));
    fields.insert("phone".into(), Value::from(edit.phone.clone()));
    fields.insert("email".into(), Value::from(edit.email.clone()));
    fields.insert("balance".into(), Value::from(edit.balance));
    fields.insert("role".into(), serde_json::to_value(edit.role)?);
    fields.insert("status".into(), serde_json::to_value(edit.status)?);
    store.update(&user_path(uid)?, fields).await
}

pub async fn update_contact(store: &dyn TreeStore, uid: &Uuid, name: &str, phone: &str) -> Result<(), StoreError> {
    let mut fields = Map::new();
    fields.insert("name".into(), Value::from(name));
    fields.insert("phone".into(), Value::from(phone));
    store.update(&user_path(uid)?, fields).await
}

pub async fn set_status(store: &dyn TreeStore, uid: &Uuid, status: Status) -> Result<(), StoreError> {
    store
        .set(&user_path(uid)?.child("status")?, serde_json::to_value(status)?)
        .await
}

pub async fn set_role(store: &dyn TreeStore, uid: &Uuid, role: Role) -> Result<(), StoreError> {
    store
        .set(&user_path(uid)?.child("role")?, serde_json::to_value(role)?)
        .await
}

pub async fn delete_user(store: &dyn TreeStore, uid: &Uuid) -> Result<(), StoreError> {
    store.remove(&user_path(uid)?).await
}
