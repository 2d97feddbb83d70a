//! Time-based trigger configuration and the pure predicates over it.
//!
//! Every predicate takes `now` explicitly; nothing here reads the clock.
//! All cadences are evaluated in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Cadence of a recurring-schedule rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// `trigger.config` of a `recurring-schedule` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringConfig {
    pub frequency: Frequency,
    /// Hour of day (0-23) for daily, weekly and monthly cadences.
    #[serde(default)]
    pub hour: Option<u32>,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub day_of_week: Option<u32>,
    /// 1-31; clamped to the last day of shorter months.
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

impl RecurringConfig {
    pub fn hourly() -> Self {
        Self { frequency: Frequency::Hourly, hour: None, day_of_week: None, day_of_month: None }
    }

    pub fn daily_at(hour: u32) -> Self {
        Self { frequency: Frequency::Daily, hour: Some(hour), day_of_week: None, day_of_month: None }
    }

    pub fn weekly_on(day_of_week: u32, hour: u32) -> Self {
        Self {
            frequency: Frequency::Weekly,
            hour: Some(hour),
            day_of_week: Some(day_of_week),
            day_of_month: None,
        }
    }

    pub fn monthly_on(day_of_month: u32, hour: u32) -> Self {
        Self {
            frequency: Frequency::Monthly,
            hour: Some(hour),
            day_of_week: None,
            day_of_month: Some(day_of_month),
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

/// Whether a recurring rule should fire at `now`.
pub fn is_due(now: DateTime<Utc>, config: &RecurringConfig) -> bool {
    let hour_matches = config.hour.is_none_or(|h| now.hour() == h);

    match config.frequency {
        Frequency::Hourly => true,
        Frequency::Daily => hour_matches,
        Frequency::Weekly => {
            hour_matches
                && config
                    .day_of_week
                    .is_none_or(|d| now.weekday().num_days_from_sunday() == d % 7)
        }
        Frequency::Monthly => {
            let day_matches = config.day_of_month.is_none_or(|d| {
                let target = d.clamp(1, last_day_of_month(now.year(), now.month()));
                now.day() == target
            });
            hour_matches && day_matches
        }
    }
}

/// Whether `last` already falls in the same cadence interval as `now`.
pub fn is_same_interval(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RecurringConfig,
) -> bool {
    let Some(last) = last else {
        return false;
    };

    match config.frequency {
        Frequency::Hourly => last.date_naive() == now.date_naive() && last.hour() == now.hour(),
        Frequency::Daily => last.date_naive() == now.date_naive(),
        Frequency::Weekly => last.iso_week() == now.iso_week(),
        Frequency::Monthly => last.year() == now.year() && last.month() == now.month(),
    }
}

/// Due and not already fired in this interval.
pub fn should_fire(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RecurringConfig,
) -> bool {
    is_due(now, config) && !is_same_interval(last, now, config)
}

/// `trigger.config` of a `before-appointment` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderConfig {
    #[serde(default = "default_hours_before", alias = "leadHours")]
    pub hours_before: u32,
}

fn default_hours_before() -> u32 {
    24
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { hours_before: default_hours_before() }
    }
}

impl ReminderConfig {
    /// Half-open window `[now + lead, now + lead + width)` of appointment starts.
    ///
    /// `None` when the window falls outside the representable calendar.
    pub fn window(
        &self,
        now: DateTime<Utc>,
        width: Duration,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let lead = Duration::try_hours(i64::from(self.hours_before))?;
        let start = now.checked_add_signed(lead)?;
        Some((start, start.checked_add_signed(width)?))
    }
}
