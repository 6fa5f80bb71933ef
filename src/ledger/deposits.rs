use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{round_money, LedgerError};
use crate::store::{tree, TreeStore, TxOutcome};
use crate::users::model::{user_path, DepositEntry, UserRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositReceipt {
    /// Unix-millisecond key under `/users/{uid}/deposits`.
    pub key: String,
    pub entry: DepositEntry,
    pub balance: f64,
}

/// First free millisecond key at or after `millis`.
fn free_key(record: &UserRecord, millis: i64) -> String {
    let mut ts = millis;
    while record.deposits.contains_key(&ts.to_string()) {
        ts += 1;
    }
    ts.to_string()
}

fn apply_deposit(current: Option<&Value>, amount: f64, millis: i64, date: &str) -> Option<(Value, DepositReceipt)> {
    let raw = current?;
    let record: UserRecord = serde_json::from_value(raw.clone()).ok()?;
    let key = free_key(&record, millis);
    let entry = DepositEntry {
        amount,
        date: date.to_string(),
    };
    let balance = round_money(record.balance + amount);

    let mut next = raw.clone();
    tree::set_at(&mut next, &["balance".to_string()], Value::from(balance));
    tree::set_at(
        &mut next,
        &["deposits".to_string(), key.clone()],
        serde_json::to_value(&entry).ok()?,
    );
    Some((next, DepositReceipt { key, entry, balance }))
}

/// Credits `amount` to a user and logs the deposit, both in one update.
#[instrument(skip(store))]
pub async fn record_deposit(
    store: &dyn TreeStore,
    user_id: Uuid,
    amount: f64,
    now: OffsetDateTime,
) -> Result<DepositReceipt, LedgerError> {
    if !amount.is_finite() {
        return Err(LedgerError::InvalidAmount);
    }
    // sub-cent credits round to nothing
    let amount = round_money(amount);
    if amount <= 0.0 {
        return Err(LedgerError::InvalidAmount);
    }
    let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
    let date = now.format(&Rfc3339)?;
    let path = user_path(&user_id)?;

    // Written by every attempt; the committed attempt is always the last one.
    let written: Mutex<Option<DepositReceipt>> = Mutex::new(None);
    let result = store
        .transaction(&path, &|current| match apply_deposit(current.as_ref(), amount, millis, &date) {
            Some((next, receipt)) => {
                if let Ok(mut slot) = written.lock() {
                    *slot = Some(receipt);
                }
                TxOutcome::Commit(next)
            }
            None => TxOutcome::Abort,
        })
        .await?;

    if !result.committed {
        return Err(LedgerError::UserNotFound);
    }
    let receipt = written
        .into_inner()
        .ok()
        .flatten()
        .ok_or(LedgerError::UserNotFound)?;

    info!(%user_id, amount, balance = receipt.balance, key = %receipt.key, "deposit recorded");
    Ok(receipt)
}
