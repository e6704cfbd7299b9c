//! Foreground daemon loop.
//!
//! Owns the thread-backed timer host's fire channel. On timer fire it runs a
//! rollover dispatch and the dispatcher re-arms. SIGTERM/SIGINT shut down
//! cleanly, SIGUSR1 forces an immediate refresh dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::flag;

use crate::core::config::Config;
use crate::core::errors::{DteError, Result};
use crate::dispatch::{UpdateDispatcher, UpdateTrigger};
use crate::logger::jsonl::{ActivityLog, EventType, LogEntry, Severity};

/// Run until SIGTERM/SIGINT.
///
/// `fire_rx` is the channel the dispatcher's `ThreadTimerHost` fires on.
/// The initial pass uses the `boot` trigger so every surface starts on today
/// and the first wake-up gets armed.
pub fn run(
    config: &Config,
    dispatcher: &UpdateDispatcher,
    fire_rx: &Receiver<DateTime<Utc>>,
    log: &Arc<ActivityLog>,
) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let refresh = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        flag::register(signal, Arc::clone(&shutdown)).map_err(|err| DteError::Runtime {
            details: format!("cannot register signal {signal}: {err}"),
        })?;
    }
    flag::register(SIGUSR1, Arc::clone(&refresh)).map_err(|err| DteError::Runtime {
        details: format!("cannot register SIGUSR1: {err}"),
    })?;

    log.write(&LogEntry::new(EventType::DaemonStart, Severity::Info));

    let boot = dispatcher.on_external_trigger(UpdateTrigger::Boot, &Local::now());
    if let Some(warning) = boot.schedule_warning {
        eprintln!("dte daemon: scheduling unavailable: {warning}");
    }

    let poll = Duration::from_millis(config.scheduler.poll_interval_ms);
    while !shutdown.load(Ordering::Relaxed) {
        if refresh.swap(false, Ordering::Relaxed) {
            dispatcher.on_external_trigger(UpdateTrigger::ManualForceToday, &Local::now());
        }

        match fire_rx.recv_timeout(poll) {
            Ok(_) => {
                dispatcher.on_timer_fire(&Local::now());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log.write(
                    &LogEntry::new(EventType::Error, Severity::Critical)
                        .details("timer fire channel disconnected"),
                );
                return Err(DteError::ChannelClosed {
                    component: "rollover timer",
                });
            }
        }
    }

    dispatcher.scheduler().cancel();
    log.write(&LogEntry::new(EventType::DaemonStop, Severity::Info));
    Ok(())
}
