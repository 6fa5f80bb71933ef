use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use crate::calendar::YearMonth;
use crate::ledger::round_money;
use crate::users::model::UserRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositLine {
    pub key: String,
    pub amount: f64,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositHistory {
    pub month: String,
    pub deposits: Vec<DepositLine>,
    pub total: f64,
}

fn key_millis(key: &str) -> Option<i64> {
    key.parse::<i64>().ok()
}

/// When the deposit happened, from its stored date or else its key.
fn instant(key: &str, date: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(date, &Rfc3339).ok().or_else(|| {
        let ms = key_millis(key)?;
        OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
    })
}

/// Deposits made during `month` in local time, latest first.
pub fn deposits_in_month(record: &UserRecord, month: YearMonth, offset: UtcOffset) -> DepositHistory {
    let mut picked: Vec<(OffsetDateTime, DepositLine)> = record
        .deposits
        .iter()
        .filter_map(|(key, entry)| {
            let at = instant(key, &entry.date)?;
            month.contains(at.to_offset(offset).date()).then(|| {
                (
                    at,
                    DepositLine {
                        key: key.clone(),
                        amount: entry.amount,
                        date: entry.date.clone(),
                    },
                )
            })
        })
        .collect();

    picked.sort_by(|(a_at, a), (b_at, b)| {
        let a_ms = key_millis(&a.key).unwrap_or_else(|| (a_at.unix_timestamp_nanos() / 1_000_000) as i64);
        let b_ms = key_millis(&b.key).unwrap_or_else(|| (b_at.unix_timestamp_nanos() / 1_000_000) as i64);
        b_ms.cmp(&a_ms)
    });

    let deposits: Vec<DepositLine> = picked.into_iter().map(|(_, line)| line).collect();
    let total = round_money(deposits.iter().map(|d| d.amount).sum::<f64>());
    DepositHistory {
        month: month.label(),
        deposits,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::DepositEntry;
    use time::{macros::offset, Month};

    fn entry(amount: f64, date: &str) -> DepositEntry {
        DepositEntry {
            amount,
            date: date.into(),
        }
    }

    #[test]
    fn filters_by_local_month_and_sorts_latest_first() {
        let mut rec = UserRecord::default();
        rec.deposits.insert("1748736000000".into(), entry(100.0, "2025-06-01T00:00:00Z"));
        rec.deposits.insert("1750000000000".into(), entry(250.5, "2025-06-15T15:06:40Z"));
        // 2025-05-31 20:00 UTC is already June 1st at +06:00
        rec.deposits.insert("1748721600000".into(), entry(40.0, "2025-05-31T20:00:00Z"));
        rec.deposits.insert("1746057600000".into(), entry(999.0, "2025-05-01T00:00:00Z"));

        let june = YearMonth {
            year: 2025,
            month: Month::June,
        };
        let h = deposits_in_month(&rec, june, offset!(+6));
        let keys: Vec<&str> = h.deposits.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, ["1750000000000", "1748736000000", "1748721600000"]);
        assert_eq!(h.total, 390.5);
        assert_eq!(h.month, "2025-06");

        let utc = deposits_in_month(&rec, june, offset!(UTC));
        assert_eq!(utc.deposits.len(), 2);
    }

    #[test]
    fn falls_back_to_the_key_when_the_date_is_unreadable() {
        let mut rec = UserRecord::default();
        rec.deposits.insert("1750000000000".into(), entry(10.0, "yesterday"));
        rec.deposits.insert("not-a-key".into(), entry(10.0, "sometime"));
        let h = deposits_in_month(
            &rec,
            YearMonth {
                year: 2025,
                month: Month::June,
            },
            offset!(UTC),
        );
        assert_eq!(h.deposits.len(), 1);
        assert_eq!(h.total, 10.0);
    }
}
