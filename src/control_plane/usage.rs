//! # Usage Tracking
//!
//! Monthly reset boundaries for metered usage, plus the per-subscriber
//! usage record and audit event types. Date math only, no I/O.
//!
//! Every reset is anchored at midnight UTC on `reset_day` of a month. When
//! a month is shorter than `reset_day` the anchor is clamped to its last day.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tier::TierId;

const MILLIS_PER_DAY: i64 = 86_400_000;

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (y, m) = next_month(year, month);
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// `reset_day` of the given month, clamped to the month length
fn month_anchor(year: i32, month: u32, reset_day: u32) -> NaiveDate {
    let day = reset_day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MAX)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Next rollover date strictly after `today`.
///
/// On or after the anchor of the current month, that is next month's
/// anchor; before it, this month's anchor.
pub fn next_reset_date_from(reset_day: u32, today: NaiveDate) -> NaiveDate {
    let anchor = month_anchor(today.year(), today.month(), reset_day);
    if today >= anchor {
        let (y, m) = next_month(today.year(), today.month());
        month_anchor(y, m, reset_day)
    } else {
        anchor
    }
}

/// Next rollover date, relative to the current UTC date
pub fn next_reset_date(reset_day: u32) -> NaiveDate {
    next_reset_date_from(reset_day, Utc::now().date_naive())
}

/// Start of the billing period containing `today`
pub fn period_start_from(reset_day: u32, today: NaiveDate) -> NaiveDate {
    let anchor = month_anchor(today.year(), today.month(), reset_day);
    if today >= anchor {
        anchor
    } else {
        let (y, m) = previous_month(today.year(), today.month());
        month_anchor(y, m, reset_day)
    }
}

/// Whole days until the next rollover, rounded up
pub fn days_until_reset_at(reset_day: u32, now: DateTime<Utc>) -> i64 {
    let reset_at = start_of_day(next_reset_date_from(reset_day, now.date_naive()));
    let millis = (reset_at - now).num_milliseconds().max(0);
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

/// Whole days until the next rollover, relative to now
pub fn days_until_reset(reset_day: u32) -> i64 {
    days_until_reset_at(reset_day, Utc::now())
}

/// True iff `now` is at or past the anchor in the month after `last_reset`
pub fn should_reset_at(last_reset: DateTime<Utc>, reset_day: u32, now: DateTime<Utc>) -> bool {
    let last = last_reset.date_naive();
    let (y, m) = next_month(last.year(), last.month());
    now >= start_of_day(month_anchor(y, m, reset_day))
}

/// [`should_reset_at`] relative to now
pub fn should_reset(last_reset: DateTime<Utc>, reset_day: u32) -> bool {
    should_reset_at(last_reset, reset_day, Utc::now())
}

/// Metered usage of one subscriber for the current billing period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Subscriber id
    pub subscriber_id: Uuid,
    /// Owning tenant
    pub tenant_id: String,
    /// Tier the counter is accounted against
    pub tier: TierId,
    /// Metered actions consumed this period
    pub calls_consumed: u64,
    /// Start of the current period
    pub last_reset: DateTime<Utc>,
    /// Next scheduled rollover
    pub next_reset: NaiveDate,
}

impl UsageRecord {
    /// Fresh record for the period containing `now`
    pub fn new(
        subscriber_id: Uuid,
        tenant_id: impl Into<String>,
        tier: TierId,
        reset_day: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        Self {
            subscriber_id,
            tenant_id: tenant_id.into(),
            tier,
            calls_consumed: 0,
            last_reset: start_of_day(period_start_from(reset_day, today)),
            next_reset: next_reset_date_from(reset_day, today),
        }
    }

    /// Whether the period boundary has passed
    pub fn is_due(&self, reset_day: u32, now: DateTime<Utc>) -> bool {
        should_reset_at(self.last_reset, reset_day, now)
    }

    /// Zero the counter and advance timestamps to the period containing `now`
    pub fn reset(&mut self, reset_day: u32, now: DateTime<Utc>) {
        let today = now.date_naive();
        self.calls_consumed = 0;
        self.last_reset = start_of_day(period_start_from(reset_day, today));
        self.next_reset = next_reset_date_from(reset_day, today);
    }
}

/// Audit entry for a metered action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub subscriber_id: Uuid,
    pub tenant_id: String,
    /// Action name (e.g. "ai_assistant")
    pub action: String,
    /// Units charged against the quota
    pub accounted_cost: u64,
    /// Whether the privileged bypass applied
    pub privileged: bool,
    pub at: DateTime<Utc>,
}
