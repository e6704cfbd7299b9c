//! Midnight rollover scheduling: a two-state machine over a host timer.
//!
//! Exactly one wake-up is pending process-wide. `arm` and `cancel` share one
//! lock so a cancel that happens-before a re-arm deterministically wins; a
//! re-arm after the cancel stands.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::core::errors::{DteError, Result};
use crate::scheduler::timer::{TimerHost, TimerPrecision};

/// Current scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// No wake-up pending. Surfaces will not self-update until an external
    /// trigger re-arms.
    Unarmed,
    /// One wake-up pending at `trigger`.
    Armed {
        precise: bool,
        trigger: DateTime<Utc>,
    },
}

impl ScheduleState {
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }
}

/// Owns the one pending rollover wake-up.
pub struct RolloverScheduler {
    host: Arc<dyn TimerHost>,
    allow_imprecise: bool,
    // Process-wide arm/cancel critical section.
    state: Mutex<ScheduleState>,
}

impl RolloverScheduler {
    #[must_use]
    pub fn new(host: Arc<dyn TimerHost>, allow_imprecise: bool) -> Self {
        Self {
            host,
            allow_imprecise,
            state: Mutex::new(ScheduleState::Unarmed),
        }
    }

    /// Arm for the next local midnight strictly after `now`.
    ///
    /// Any pending wake-up is cancelled first. Tries a precise wake-up, falls
    /// back to imprecise when the host denies precision, and stays `Unarmed`
    /// with `SchedulingFailed` when both are refused. One-shot: every fire
    /// needs an explicit re-arm.
    pub fn arm<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<ScheduleState> {
        let mut state = self.state.lock();
        self.host.cancel();
        *state = ScheduleState::Unarmed;

        let trigger = next_midnight_after(now).with_timezone(&Utc);

        match self.host.schedule(trigger, TimerPrecision::Precise) {
            Ok(()) => {
                *state = ScheduleState::Armed {
                    precise: true,
                    trigger,
                };
                Ok(*state)
            }
            Err(DteError::PermissionDenied { details }) if self.allow_imprecise => {
                match self.host.schedule(trigger, TimerPrecision::Imprecise) {
                    Ok(()) => {
                        *state = ScheduleState::Armed {
                            precise: false,
                            trigger,
                        };
                        Ok(*state)
                    }
                    Err(err) => Err(DteError::SchedulingFailed {
                        details: format!(
                            "precise wake-up denied ({details}); imprecise also failed: {err}"
                        ),
                    }),
                }
            }
            Err(DteError::PermissionDenied { details }) => Err(DteError::SchedulingFailed {
                details: format!(
                    "precise wake-up denied ({details}) and imprecise fallback is disabled"
                ),
            }),
            Err(err) => Err(DteError::SchedulingFailed {
                details: err.to_string(),
            }),
        }
    }

    /// Drop the pending wake-up. Idempotent; no effect on a fire already in
    /// flight, only on future ones.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        self.host.cancel();
        *state = ScheduleState::Unarmed;
    }

    /// Record that the armed wake-up elapsed. The caller dispatches, then
    /// calls [`arm`](Self::arm) again.
    pub fn acknowledge_fire(&self) {
        *self.state.lock() = ScheduleState::Unarmed;
    }

    #[must_use]
    pub fn state(&self) -> ScheduleState {
        *self.state.lock()
    }
}

/// Next local midnight strictly after `now`.
///
/// Always the following calendar day's 00:00, so calling exactly at a
/// midnight boundary never re-triggers the same instant. When that midnight
/// does not exist in the zone (skipped by a DST transition) the earliest
/// valid instant of the day is used; when it exists twice, the earlier one.
pub fn next_midnight_after<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let next_day = now
        .date_naive()
        .succ_opt()
        .unwrap_or_else(|| now.date_naive());
    let midnight = next_day
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_local());
    resolve_local(&tz, midnight)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // DST gap: probe forward in 15 minute steps for the earliest
            // instant that exists (gaps are at most a few hours).
            let mut probe = naive;
            for _ in 0..12 {
                probe += Duration::minutes(15);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(instant) => return instant,
                    LocalResult::Ambiguous(earliest, _) => return earliest,
                    LocalResult::None => {}
                }
            }
            // No sane zone skips more than three hours; interpret as UTC
            // rather than loop further.
            tz.from_utc_datetime(&naive)
        }
    }
}
