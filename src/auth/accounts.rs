//! Credentials, kept apart from the public `/users` tree.
//!
//! `/accounts/{uid}` holds the password hash and session bookkeeping;
//! `/accountEmails/{key}` maps an e-mail to its uid and is claimed with a
//! transaction so two sign-ups can never share an address.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::store::{get_as, NodePath, StoreError, TreeStore, TxOutcome};
use crate::users::model::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    pub password_hash: String,
    /// Bumped on logout; refresh tokens from older epochs are rejected.
    #[serde(default)]
    pub token_epoch: u64,
    /// Mode an admin chose last time they logged in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mode: Option<Role>,
}

pub fn account_path(uid: &Uuid) -> Result<NodePath, StoreError> {
    NodePath::root().child("accounts")?.child(uid.to_string())
}

/// Path-safe form of an e-mail address.
pub fn email_key(email: &str) -> String {
    let mut out = String::with_capacity(email.len());
    for c in email.chars() {
        match c {
            '.' | '#' | '$' | '[' | ']' | '/' | '%' => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn email_path(email: &str) -> Result<NodePath, StoreError> {
    NodePath::root().child("accountEmails")?.child(email_key(email))
}

/// Reserves `email` for `uid`. Returns false if someone already holds it.
pub async fn claim_email(store: &dyn TreeStore, email: &str, uid: &Uuid) -> Result<bool, StoreError> {
    let owner = Value::String(uid.to_string());
    let res = store
        .transaction(&email_path(email)?, &|current| match current {
            Some(_) => TxOutcome::Abort,
            None => TxOutcome::Commit(owner.clone()),
        })
        .await?;
    debug!(email, committed = res.committed, "email claim");
    Ok(res.committed)
}

pub async fn release_email(store: &dyn TreeStore, email: &str) -> Result<(), StoreError> {
    store.remove(&email_path(email)?).await
}

pub async fn find_uid_by_email(store: &dyn TreeStore, email: &str) -> Result<Option<Uuid>, StoreError> {
    let raw: Option<String> = get_as(store, &email_path(email)?).await?;
    Ok(raw.and_then(|s| Uuid::parse_str(&s).ok()))
}

pub async fn create_account(store: &dyn TreeStore, uid: &Uuid, account: &Account) -> Result<(), StoreError> {
    store.set(&account_path(uid)?, serde_json::to_value(account)?).await
}

pub async fn get_account(store: &dyn TreeStore, uid: &Uuid) -> Result<Option<Account>, StoreError> {
    get_as(store, &account_path(uid)?).await
}

pub async fn delete_account(store: &dyn TreeStore, uid: &Uuid) -> Result<(), StoreError> {
    if let Some(account) = get_account(store, uid).await? {
        release_email(store, &account.email).await?;
    }
    store.remove(&account_path(uid)?).await
}

pub async fn remember_mode(store: &dyn TreeStore, uid: &Uuid, mode: Role) -> Result<(), StoreError> {
    store
        .set(&account_path(uid)?.child("lastMode")?, serde_json::to_value(mode)?)
        .await
}

/// Invalidates every refresh token issued so far.
pub async fn bump_token_epoch(store: &dyn TreeStore, uid: &Uuid) -> Result<Option<u64>, StoreError> {
    let path = account_path(uid)?.child("tokenEpoch")?;
    let account_exists = get_account(store, uid).await?.is_some();
    if !account_exists {
        return Ok(None);
    }
    let res = store
        .transaction(&path, &|current| {
            let epoch = current.and_then(|v| v.as_u64()).unwrap_or(0);
            TxOutcome::Commit(json!(epoch + 1))
        })
        .await?;
    Ok(res.snapshot.and_then(|v| v.as_u64()))
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn email_keys_are_path_safe() {
        assert_eq!(email_key("a.b@mail.com"), "a%2Eb@mail%2Ecom");
        assert!(NodePath::root().child(email_key("x#y$z[0]/%@q.io")).is_ok());
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("mess-hall-42").expect("hashing should succeed");
        assert!(verify_password("mess-hall-42", &hash).expect("verify should succeed"));
        assert!(!verify_password("mess-hall-43", &hash).expect("verify should not error"));
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[tokio::test]
    async fn an_email_can_be_claimed_once() {
        let store = MemoryStore::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(claim_email(&store, "r@hall.org", &a).await.unwrap());
        assert!(!claim_email(&store, "r@hall.org", &b).await.unwrap());
        assert_eq!(find_uid_by_email(&store, "r@hall.org").await.unwrap(), Some(a));

        release_email(&store, "r@hall.org").await.unwrap();
        assert!(claim_email(&store, "r@hall.org", &b).await.unwrap());
    }

    #[tokio::test]
    async fn epoch_bumps_and_mode_is_remembered() {
        let store = MemoryStore::default();
        let uid = Uuid::new_v4();
        assert_eq!(bump_token_epoch(&store, &uid).await.unwrap(), None);

        let account = Account {
            email: "m@hall.org".into(),
            password_hash: "h".into(),
            token_epoch: 0,
            last_mode: None,
        };
        create_account(&store, &uid, &account).await.unwrap();
        assert_eq!(bump_token_epoch(&store, &uid).await.unwrap(), Some(1));
        assert_eq!(bump_token_epoch(&store, &uid).await.unwrap(), Some(2));

        remember_mode(&store, &uid, Role::User).await.unwrap();
        let stored = get_account(&store, &uid).await.unwrap().unwrap();
        assert_eq!(stored.token_epoch, 2);
        assert_eq!(stored.last_mode, Some(Role::User));

        delete_account(&store, &uid).await.unwrap();
        assert_eq!(get_account(&store, &uid).await.unwrap(), None);
    }
}
