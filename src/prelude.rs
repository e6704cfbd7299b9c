//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use daily_text_engine::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::date_key::MonthDay;
pub use crate::core::errors::{DteError, Result};

// Source
pub use crate::source::index::DateIndex;
pub use crate::source::{ReadingSchedule, VerseEntry, VerseSource};

// Store
pub use crate::store::{CursorStore, FileCursorStore, MemoryCursorStore, SurfaceId};

// Engine
pub use crate::engine::navigation::{Direction, NavigationEngine, Resolution};
pub use crate::engine::render::{RenderModel, RenderModelBuilder};

// Scheduler
pub use crate::scheduler::rollover::{RolloverScheduler, ScheduleState, next_midnight_after};
pub use crate::scheduler::timer::{MockTimerHost, NoopTimerHost, TimerHost, TimerPrecision};

// Dispatch
pub use crate::dispatch::{
    DispatchOutcome, NullRenderSink, RenderSink, StoreSurfaceRegistry, SurfaceRegistry,
    UpdateDispatcher, UpdateTrigger,
};
