#![forbid(unsafe_code)]

//! Daily Text Engine (dte) — per-surface daily entry navigation with a
//! midnight rollover scheduler.
//!
//! Each display surface (a home-screen widget instance, a terminal pane)
//! shows one entry from a date-keyed sequence. Users step through the
//! sequence per surface; at local midnight every surface rolls back to
//! today. The moving parts:
//!
//! 1. **Navigation engine** — resolve/step cursors with a self-healing
//!    fallback chain and clamp-at-boundary stepping
//! 2. **Rollover scheduler** — one process-wide wake-up at the next local
//!    midnight, precise when the host allows it, best-effort otherwise
//! 3. **Update dispatcher** — global triggers force every surface to today,
//!    aggregate per-surface failures, re-arm
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use daily_text_engine::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use daily_text_engine::core::config::Config;
//! use daily_text_engine::engine::navigation::{Direction, NavigationEngine};
//! ```

pub mod prelude;

pub mod core;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod dispatch;
pub mod engine;
pub mod logger;
pub mod scheduler;
pub mod source;
pub mod store;
