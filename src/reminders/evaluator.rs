//! Schedule evaluation. Pure functions over a medicine list and "now".
//!
//! A dose is due when it is untaken, not in flight, has no retry pending,
//! was not attempted in the current period, and its trigger fires:
//! - `CatchUp`: today's scheduled time is at or before now, so a missed
//!   tick still reminds later the same day;
//! - `ExactMinute`: now falls inside the scheduled minute.
//!
//! A retry is due once its deadline has passed, whatever the policy. A
//! retry only lives as long as the period of the attempt it repeats: once
//! that period ends it is dropped and the new period starts clean.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{Medicine, ReminderPhase, TriggerPolicy};

/// Why a dispatch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Retry,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Retry => "retry",
        }
    }
}

/// Date the current period of `med` is anchored on: when it was taken,
/// else when it was last attempted.
fn period_anchor(med: &Medicine) -> Option<NaiveDate> {
    med.taken_on().or(med.last_attempt_on)
}

/// Whether a taken dose belongs to an earlier period and should be reset.
///
/// As-needed medicines never roll over. Without a datable anchor (records
/// from older clients) the dose is left alone.
pub fn period_rolled_over(med: &Medicine, today: NaiveDate) -> bool {
    if !med.taken {
        return false;
    }
    match (med.frequency.period_days(), period_anchor(med)) {
        (Some(days), Some(anchor)) => (today - anchor).num_days() >= days,
        _ => false,
    }
}

/// Reset every taken dose whose period has rolled over. Idempotent.
/// Returns the ids that were reset.
pub fn apply_period_reset(list: &mut [Medicine], today: NaiveDate) -> Vec<String> {
    list.iter_mut()
        .filter(|med| period_rolled_over(med, today))
        .map(|med| {
            med.taken = false;
            med.taken_at = None;
            med.id.clone()
        })
        .collect()
}

/// Whether an attempt was already made in the current period.
pub fn attempted_this_period(med: &Medicine, today: NaiveDate) -> bool {
    match (med.frequency.period_days(), med.last_attempt_on) {
        (Some(days), Some(last)) => (today - last).num_days() < days,
        _ => false,
    }
}

/// Ids with a pending retry whose attempt belongs to an ended period.
pub fn expired_retries(
    list: &[Medicine],
    retries: &HashMap<String, NaiveDateTime>,
    today: NaiveDate,
) -> Vec<String> {
    list.iter()
        .filter(|med| retries.contains_key(&med.id) && !attempted_this_period(med, today))
        .map(|med| med.id.clone())
        .collect()
}

/// Scheduled trigger, ignoring retries.
pub fn is_due(med: &Medicine, now: NaiveDateTime, policy: TriggerPolicy) -> bool {
    if med.taken || med.in_flight || med.frequency.period_days().is_none() {
        return false;
    }
    if attempted_this_period(med, now.date()) {
        return false;
    }
    match policy {
        TriggerPolicy::CatchUp => med.time.on(now.date()) <= now,
        TriggerPolicy::ExactMinute => med.time.matches_minute(&now),
    }
}

/// What fires for `med` right now, if anything.
pub fn trigger_for(
    med: &Medicine,
    retry_deadline: Option<NaiveDateTime>,
    now: NaiveDateTime,
    policy: TriggerPolicy,
) -> Option<Trigger> {
    if med.taken || med.in_flight {
        return None;
    }
    match retry_deadline {
        Some(deadline) if deadline <= now => Some(Trigger::Retry),
        Some(_) => None,
        None if is_due(med, now, policy) => Some(Trigger::Scheduled),
        None => None,
    }
}

/// Ids due for a dispatch, in list order.
pub fn select_due(
    list: &[Medicine],
    retries: &HashMap<String, NaiveDateTime>,
    now: NaiveDateTime,
    policy: TriggerPolicy,
) -> Vec<(String, Trigger)> {
    list.iter()
        .filter_map(|med| {
            trigger_for(med, retries.get(&med.id).copied(), now, policy)
                .map(|trigger| (med.id.clone(), trigger))
        })
        .collect()
}

/// Current state-machine phase of `med`.
pub fn phase(
    med: &Medicine,
    retry_deadline: Option<NaiveDateTime>,
    now: NaiveDateTime,
    policy: TriggerPolicy,
) -> ReminderPhase {
    if med.taken {
        return ReminderPhase::Taken;
    }
    if med.in_flight {
        return ReminderPhase::InFlight;
    }
    match trigger_for(med, retry_deadline, now, policy) {
        Some(_) => ReminderPhase::Due,
        None if retry_deadline.is_some() => ReminderPhase::RetryPending,
        None => ReminderPhase::Idle,
    }
}
