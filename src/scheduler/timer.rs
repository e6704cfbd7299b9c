//! Host timer abstraction.
//!
//! The rollover scheduler only knows how to ask a host for a wake-up at an
//! instant; what a "timer" physically is belongs to the host. Production
//! daemons use [`ThreadTimerHost`], tests use [`MockTimerHost`].

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::errors::Result;

/// Wake-up accuracy requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPrecision {
    /// Fires at (near-)exact wall-clock time even on an idle host.
    Precise,
    /// Best effort, may run late.
    Imprecise,
}

/// A host that can deliver at most one pending wake-up.
pub trait TimerHost: Send + Sync {
    /// Install a one-shot wake-up at `at`, replacing any pending one.
    ///
    /// Returns `DteError::PermissionDenied` when the host refuses the
    /// requested precision, any other error when scheduling itself failed.
    fn schedule(&self, at: DateTime<Utc>, precision: TimerPrecision) -> Result<()>;

    /// Drop the pending wake-up, if any. Idempotent.
    fn cancel(&self);
}

// ──────────────────── mock host ────────────────────

/// Scripted in-memory host for tests.
#[derive(Debug, Default)]
pub struct MockTimerHost {
    deny_precise: bool,
    deny_all: bool,
    inner: Mutex<MockTimerState>,
}

#[derive(Debug, Default)]
struct MockTimerState {
    active: Option<(DateTime<Utc>, TimerPrecision)>,
    schedule_calls: u32,
    cancel_calls: u32,
}

impl MockTimerHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that refuses precise wake-ups, like a device without the
    /// exact-alarm permission.
    #[must_use]
    pub fn denying_precise() -> Self {
        Self {
            deny_precise: true,
            ..Self::default()
        }
    }

    /// A host that refuses everything.
    #[must_use]
    pub fn denying_all() -> Self {
        Self {
            deny_precise: true,
            deny_all: true,
            ..Self::default()
        }
    }

    /// The currently pending wake-up, if any.
    #[must_use]
    pub fn active(&self) -> Option<(DateTime<Utc>, TimerPrecision)> {
        self.inner.lock().active
    }

    #[must_use]
    pub fn schedule_calls(&self) -> u32 {
        self.inner.lock().schedule_calls
    }

    #[must_use]
    pub fn cancel_calls(&self) -> u32 {
        self.inner.lock().cancel_calls
    }
}

impl TimerHost for MockTimerHost {
    fn schedule(&self, at: DateTime<Utc>, precision: TimerPrecision) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.schedule_calls += 1;
        if self.deny_all
            || (self.deny_precise && precision == TimerPrecision::Precise)
        {
            return Err(crate::core::errors::DteError::PermissionDenied {
                details: format!("{precision:?} wake-up refused by mock host"),
            });
        }
        inner.active = Some((at, precision));
        Ok(())
    }

    fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.cancel_calls += 1;
        inner.active = None;
    }
}

// ──────────────────── noop host ────────────────────

/// Host that accepts every request and never fires.
///
/// For one-shot CLI invocations: the process exits before any midnight, so
/// installing a real wake-up would be pointless.
#[derive(Debug, Default)]
pub struct NoopTimerHost;

impl TimerHost for NoopTimerHost {
    fn schedule(&self, _at: DateTime<Utc>, _precision: TimerPrecision) -> Result<()> {
        Ok(())
    }

    fn cancel(&self) {}
}

// ──────────────────── thread host ────────────────────

/// Thread-backed host: one sleeper thread per pending wake-up, firing onto a
/// crossbeam channel the daemon loop drains.
///
/// Sleeps in short slices so a host clock jump never strands the sleeper far
/// past the trigger, and so cancellation is picked up promptly.
#[cfg(feature = "daemon")]
pub struct ThreadTimerHost {
    fire_tx: crossbeam_channel::Sender<DateTime<Utc>>,
    cancel_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
}

#[cfg(feature = "daemon")]
impl ThreadTimerHost {
    /// Create the host and the channel the daemon receives fires on.
    ///
    /// Each message is the trigger instant the fired timer was armed for.
    #[must_use]
    pub fn new() -> (Self, crossbeam_channel::Receiver<DateTime<Utc>>) {
        let (fire_tx, fire_rx) = crossbeam_channel::bounded(4);
        (
            Self {
                fire_tx,
                cancel_tx: Mutex::new(None),
            },
            fire_rx,
        )
    }
}

#[cfg(feature = "daemon")]
impl TimerHost for ThreadTimerHost {
    fn schedule(&self, at: DateTime<Utc>, _precision: TimerPrecision) -> Result<()> {
        self.cancel();

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        *self.cancel_tx.lock() = Some(cancel_tx);

        let fire_tx = self.fire_tx.clone();
        std::thread::Builder::new()
            .name("dte-rollover-timer".to_string())
            .spawn(move || {
                const MAX_SLICE: std::time::Duration = std::time::Duration::from_secs(30);
                loop {
                    let remaining = at - Utc::now();
                    let Ok(remaining) = remaining.to_std() else {
                        // Trigger instant reached (or clock jumped past it).
                        let _ = fire_tx.send(at);
                        return;
                    };
                    let slice = remaining.min(MAX_SLICE);
                    match cancel_rx.recv_timeout(slice) {
                        // Cancelled, or the host dropped: stop silently.
                        Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    }
                }
            })
            .map_err(|err| crate::core::errors::DteError::SchedulingFailed {
                details: format!("timer thread spawn failed: {err}"),
            })?;
        Ok(())
    }

    fn cancel(&self) {
        // Dropping the sender disconnects the sleeper's cancel channel.
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}
