//! Local-time rules for meal dates, the selection deadline and monthly views.

use time::{macros::format_description, Date, Month, OffsetDateTime, Time, UtcOffset};

use crate::settings::model::MealDeadline;

/// `YYYY-MM-DD`, the key of a day under `/users/{uid}/meals`.
pub fn date_key(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

pub fn parse_date_key(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

/// Meals are always chosen for the next local day.
pub fn selection_date(now: OffsetDateTime, offset: UtcOffset) -> Date {
    let today = now.to_offset(offset).date();
    today.next_day().unwrap_or(today)
}

/// Local hour at which the kitchen's day turns over; late-night hours still
/// belong to the previous day's service.
const SERVICE_ROLLOVER_HOUR: u8 = 2;

/// The day whose meals are being served right now.
pub fn service_date(now: OffsetDateTime, offset: UtcOffset) -> Date {
    let local = now.to_offset(offset);
    let today = local.date();
    if local.hour() < SERVICE_ROLLOVER_HOUR {
        today.previous_day().unwrap_or(today)
    } else {
        today
    }
}

/// Inclusive: a request at exactly `hour:minute:00` is still on time.
/// Without a configured deadline selection stays open.
pub fn is_before_deadline(now: OffsetDateTime, offset: UtcOffset, deadline: Option<MealDeadline>) -> bool {
    let Some(d) = deadline else {
        return true;
    };
    match Time::from_hms(d.hour, d.minute, 0) {
        Ok(cutoff) => now.to_offset(offset).time() <= cutoff,
        Err(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: Month,
}

impl YearMonth {
    pub fn current(now: OffsetDateTime, offset: UtcOffset) -> Self {
        let local = now.to_offset(offset);
        Self {
            year: local.year(),
            month: local.month(),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (y, m) = raw.split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        let year = y.parse::<i32>().ok()?;
        let month = Month::try_from(m.parse::<u8>().ok()?).ok()?;
        Some(Self { year, month })
    }

    pub fn contains(&self, date: Date) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Every date of the month, first to last.
    pub fn dates(&self) -> Vec<Date> {
        let last = time::util::days_in_year_month(self.year, self.month);
        (1..=last)
            .filter_map(|day| Date::from_calendar_date(self.year, self.month, day).ok())
            .collect()
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, u8::from(self.month))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, offset};

    #[test]
    fn selection_date_uses_local_day() {
        // 19:30 UTC is already 01:30 the next day at +06:00
        let now = datetime!(2025-03-10 19:30 UTC);
        assert_eq!(selection_date(now, offset!(+6)), date!(2025 - 03 - 12));
        assert_eq!(selection_date(now, UtcOffset::UTC), date!(2025 - 03 - 11));
    }

    #[test]
    fn service_date_rolls_over_at_two() {
        let off = offset!(+6);
        // 01:59 local on the 11th still serves the 10th
        assert_eq!(service_date(datetime!(2025-03-10 19:59 UTC), off), date!(2025 - 03 - 10));
        assert_eq!(service_date(datetime!(2025-03-10 20:00 UTC), off), date!(2025 - 03 - 11));
        assert_eq!(service_date(datetime!(2025-03-11 06:00 UTC), off), date!(2025 - 03 - 11));
    }

    #[test]
    fn date_keys_round_trip() {
        let d = date!(2025 - 01 - 05);
        assert_eq!(date_key(d), "2025-01-05");
        assert_eq!(parse_date_key("2025-01-05"), Some(d));
        assert_eq!(parse_date_key("2025-13-01"), None);
        assert_eq!(parse_date_key("tomorrow"), None);
    }

    #[test]
    fn deadline_is_inclusive_and_local() {
        let deadline = Some(MealDeadline { hour: 22, minute: 0 });
        let off = offset!(+6);
        assert!(is_before_deadline(datetime!(2025-03-10 16:00 UTC), off, deadline));
        assert!(!is_before_deadline(datetime!(2025-03-10 16:00:01 UTC), off, deadline));
        assert!(is_before_deadline(datetime!(2025-03-10 23:59 UTC), off, None));
    }

    #[test]
    fn month_parsing() {
        let feb = YearMonth::parse("2024-02").unwrap();
        assert_eq!(feb.label(), "2024-02");
        assert!(feb.contains(date!(2024 - 02 - 29)));
        assert!(!feb.contains(date!(2024 - 03 - 01)));
        assert_eq!(YearMonth::parse("2024-2"), None);
        assert_eq!(YearMonth::parse("2024-00"), None);
        assert_eq!(YearMonth::parse("abcd-01"), None);
        assert_eq!(feb.dates().len(), 29);
        assert_eq!(feb.dates().last(), Some(&date!(2024 - 02 - 29)));
    }
}
