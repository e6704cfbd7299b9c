//! Update dispatch: the host-facing entry points and the global fan-out.
//!
//! External triggers (boot, reinstall, clock or timezone change, timer fire,
//! manual refresh) force every known surface back to today and re-arm the
//! scheduler. Direct user navigation targets a single surface and leaves the
//! others alone.
//!
//! A dispatch pass never returns a hard failure. Per-surface problems are
//! aggregated in the outcome and the remaining surfaces still get processed.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone};
use parking_lot::Mutex;

use crate::core::date_key::MonthDay;
use crate::core::errors::Result;
use crate::engine::navigation::{Direction, NavigationEngine};
use crate::engine::render::{RenderModel, RenderModelBuilder};
use crate::logger::jsonl::{ActivityLog, EventType, LogEntry, Severity};
use crate::scheduler::rollover::{RolloverScheduler, ScheduleState};
use crate::source::VerseSource;
use crate::store::{CursorStore, SurfaceId};

/// What caused a global dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    Boot,
    Reinstall,
    ClockChanged,
    TimezoneChanged,
    TimerFired,
    ManualForceToday,
}

impl UpdateTrigger {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Reinstall => "reinstall",
            Self::ClockChanged => "clock_changed",
            Self::TimezoneChanged => "timezone_changed",
            Self::TimerFired => "timer_fired",
            Self::ManualForceToday => "manual_force_today",
        }
    }
}

/// Enumerates the surfaces the host currently shows.
pub trait SurfaceRegistry: Send + Sync {
    fn surfaces(&self) -> Vec<SurfaceId>;
}

/// Registry backed by the cursor store: every surface with a persisted
/// cursor is a known surface.
pub struct StoreSurfaceRegistry {
    store: Arc<dyn CursorStore>,
}

impl StoreSurfaceRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        Self { store }
    }
}

impl SurfaceRegistry for StoreSurfaceRegistry {
    fn surfaces(&self) -> Vec<SurfaceId> {
        self.store.surface_ids()
    }
}

/// Receives finished render models, one per surface.
pub trait RenderSink: Send + Sync {
    fn render(&self, surface: SurfaceId, model: &RenderModel) -> Result<()>;
}

/// Sink that drops models, for store-only operations.
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn render(&self, _surface: SurfaceId, _model: &RenderModel) -> Result<()> {
        Ok(())
    }
}

/// Aggregated result of one global dispatch pass.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub trigger: UpdateTrigger,
    pub today: MonthDay,
    /// Surfaces that received a render model.
    pub updated: Vec<SurfaceId>,
    /// Per-surface failures; processing continued past each one.
    pub failures: Vec<(SurfaceId, String)>,
    /// Scheduler state after the re-arm at the end of the pass.
    pub schedule: ScheduleState,
    /// Set when the re-arm failed; surfaces will not self-update until the
    /// next external trigger.
    pub schedule_warning: Option<String>,
}

/// Per-surface lock arena.
///
/// A surface's read-modify-persist sequence must not interleave with another
/// event on the same surface; different surfaces need no shared lock.
#[derive(Default)]
struct SurfaceGuards {
    locks: Mutex<HashMap<SurfaceId, Arc<Mutex<()>>>>,
}

impl SurfaceGuards {
    fn guard(&self, surface: SurfaceId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(surface)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// The host-facing coordinator.
pub struct UpdateDispatcher {
    source: VerseSource,
    store: Arc<dyn CursorStore>,
    registry: Arc<dyn SurfaceRegistry>,
    sink: Arc<dyn RenderSink>,
    scheduler: Arc<RolloverScheduler>,
    builder: RenderModelBuilder,
    log: Arc<ActivityLog>,
    guards: SurfaceGuards,
}

impl UpdateDispatcher {
    #[must_use]
    pub fn new(
        source: VerseSource,
        store: Arc<dyn CursorStore>,
        registry: Arc<dyn SurfaceRegistry>,
        sink: Arc<dyn RenderSink>,
        scheduler: Arc<RolloverScheduler>,
        builder: RenderModelBuilder,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            sink,
            scheduler,
            builder,
            log,
            guards: SurfaceGuards::default(),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &RolloverScheduler {
        &self.scheduler
    }

    /// A surface appeared on the host. Resolves and renders it; arms the
    /// rollover timer when it is the first one.
    pub fn on_surface_added<Tz: TimeZone>(
        &self,
        surface: SurfaceId,
        now: &DateTime<Tz>,
    ) -> Result<RenderModel> {
        let was_first = self.registry.surfaces().is_empty();
        let model = self.resolve_surface(surface, now, None)?;

        self.log.write(
            &LogEntry::new(EventType::SurfaceAdded, Severity::Info)
                .surface(surface)
                .key(model.key),
        );

        if was_first {
            self.arm_and_log(now);
        }
        Ok(model)
    }

    /// A surface went away. Drops its cursor; cancels the rollover timer
    /// when it was the last one.
    pub fn on_surface_removed(&self, surface: SurfaceId) -> Result<()> {
        self.store.remove(surface)?;
        self.log
            .write(&LogEntry::new(EventType::SurfaceRemoved, Severity::Info).surface(surface));

        if self.registry.surfaces().is_empty() {
            self.scheduler.cancel();
        }
        Ok(())
    }

    /// A global trigger arrived from the host.
    pub fn on_external_trigger<Tz: TimeZone>(
        &self,
        trigger: UpdateTrigger,
        now: &DateTime<Tz>,
    ) -> DispatchOutcome {
        self.dispatch(trigger, now)
    }

    /// The armed rollover timer elapsed.
    pub fn on_timer_fire<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DispatchOutcome {
        self.scheduler.acknowledge_fire();
        self.dispatch(UpdateTrigger::TimerFired, now)
    }

    /// Direct user navigation on one surface. Does not touch other surfaces
    /// and does not re-arm the scheduler.
    pub fn navigate<Tz: TimeZone>(
        &self,
        surface: SurfaceId,
        direction: Direction,
        now: &DateTime<Tz>,
    ) -> Result<RenderModel> {
        let guard = self.guards.guard(surface);
        let _held = guard.lock();

        let today = MonthDay::for_instant(now);
        let index = self.source.load_index();
        let schedule = self.source.load_schedule();

        let engine = NavigationEngine::new(&index, self.store.as_ref());
        let resolution = engine.navigate(surface, today, direction);
        self.log_resolution(EventType::Navigate, surface, &resolution);

        let model = self
            .builder
            .build(&index, &schedule, resolution.key, now.year());
        self.sink.render(surface, &model)?;
        Ok(model)
    }

    /// One global pass: force every known surface to today, render, re-arm.
    fn dispatch<Tz: TimeZone>(&self, trigger: UpdateTrigger, now: &DateTime<Tz>) -> DispatchOutcome {
        let today = MonthDay::for_instant(now);
        let index = self.source.load_index();
        let schedule = self.source.load_schedule();
        let engine = NavigationEngine::new(&index, self.store.as_ref());

        let mut updated = Vec::new();
        let mut failures = Vec::new();

        for surface in self.registry.surfaces() {
            let guard = self.guards.guard(surface);
            let _held = guard.lock();

            let resolution = engine.resolve(surface, today, Some(today));
            if let Some(err) = &resolution.persist_error {
                failures.push((surface, err.to_string()));
            }

            let model = self
                .builder
                .build(&index, &schedule, resolution.key, now.year());
            match self.sink.render(surface, &model) {
                Ok(()) => updated.push(surface),
                Err(err) => {
                    // Retryable failures are expected to clear on the next
                    // pass; anything else gets flagged for attention.
                    let severity = if err.is_retryable() {
                        Severity::Warning
                    } else {
                        Severity::Critical
                    };
                    self.log.write(
                        &LogEntry::new(EventType::Error, severity)
                            .surface(surface)
                            .error_code(err.code())
                            .details(err.to_string()),
                    );
                    failures.push((surface, err.to_string()));
                }
            }
        }

        let (schedule_state, schedule_warning) = self.arm_and_log(now);

        let mut entry = LogEntry::new(EventType::RolloverDispatch, Severity::Info)
            .trigger(trigger.label())
            .key(today);
        entry.surfaces = u32::try_from(updated.len()).ok();
        entry.failed = u32::try_from(failures.len()).ok();
        self.log.write(&entry);

        DispatchOutcome {
            trigger,
            today,
            updated,
            failures,
            schedule: schedule_state,
            schedule_warning,
        }
    }

    /// Resolve one surface (optionally toward a requested key) and render it.
    pub fn resolve_surface<Tz: TimeZone>(
        &self,
        surface: SurfaceId,
        now: &DateTime<Tz>,
        requested: Option<MonthDay>,
    ) -> Result<RenderModel> {
        let guard = self.guards.guard(surface);
        let _held = guard.lock();

        let today = MonthDay::for_instant(now);
        let index = self.source.load_index();
        let schedule = self.source.load_schedule();

        let engine = NavigationEngine::new(&index, self.store.as_ref());
        let resolution = engine.resolve(surface, today, requested);
        self.log_resolution(EventType::Resolve, surface, &resolution);

        let model = self
            .builder
            .build(&index, &schedule, resolution.key, now.year());
        self.sink.render(surface, &model)?;
        Ok(model)
    }

    fn arm_and_log<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> (ScheduleState, Option<String>) {
        match self.scheduler.arm(now) {
            Ok(state) => {
                let (event, severity) = match state {
                    ScheduleState::Armed { precise: true, .. } => {
                        (EventType::SchedulerArmed, Severity::Info)
                    }
                    _ => (EventType::SchedulerFallback, Severity::Warning),
                };
                self.log.write(&LogEntry::new(event, severity));
                (state, None)
            }
            Err(err) => {
                self.log.write(
                    &LogEntry::new(EventType::SchedulerFailed, Severity::Warning)
                        .error_code(err.code())
                        .details(err.to_string()),
                );
                (ScheduleState::Unarmed, Some(err.to_string()))
            }
        }
    }

    fn log_resolution(
        &self,
        event: EventType,
        surface: SurfaceId,
        resolution: &crate::engine::navigation::Resolution,
    ) {
        let severity = if resolution.degraded || resolution.persist_error.is_some() {
            Severity::Warning
        } else {
            Severity::Info
        };
        let mut entry = LogEntry::new(event, severity)
            .surface(surface)
            .key(resolution.key);
        if let Some(err) = &resolution.persist_error {
            entry = entry.error_code(err.code()).details(err.to_string());
        }
        self.log.write(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{PathsConfig, RenderConfig};
    use crate::scheduler::timer::MockTimerHost;
    use crate::store::MemoryCursorStore;
    use chrono::{FixedOffset, TimeZone as _};
    use std::fs;

    struct CollectingSink {
        rendered: Mutex<Vec<(SurfaceId, RenderModel)>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                rendered: Mutex::new(Vec::new()),
            }
        }
    }

    impl RenderSink for CollectingSink {
        fn render(&self, surface: SurfaceId, model: &RenderModel) -> Result<()> {
            self.rendered.lock().push((surface, model.clone()));
            Ok(())
        }
    }

    struct FixedRegistry(Vec<SurfaceId>);

    impl SurfaceRegistry for FixedRegistry {
        fn surfaces(&self) -> Vec<SurfaceId> {
            self.0.clone()
        }
    }

    fn key(raw: &str) -> MonthDay {
        raw.parse().expect("valid key")
    }

    fn write_entries(dir: &std::path::Path, keys: &[&str]) -> VerseSource {
        let entries: Vec<serde_json::Value> = keys
            .iter()
            .map(|raw| {
                serde_json::json!({
                    "date": raw,
                    "title": format!("title {raw}"),
                    "body": format!("body {raw}"),
                })
            })
            .collect();
        let path = dir.join("daily_verses.json");
        fs::write(&path, serde_json::to_string(&entries).unwrap()).expect("write entries");
        VerseSource::new(&PathsConfig {
            entries_file: path,
            reading_schedule_file: dir.join("missing_schedule.json"),
            ..PathsConfig::default()
        })
    }

    struct Harness {
        dispatcher: UpdateDispatcher,
        store: Arc<MemoryCursorStore>,
        sink: Arc<CollectingSink>,
        host: Arc<MockTimerHost>,
    }

    fn harness(dir: &std::path::Path, keys: &[&str], registry: Vec<SurfaceId>) -> Harness {
        let source = write_entries(dir, keys);
        let store = Arc::new(MemoryCursorStore::new());
        let sink = Arc::new(CollectingSink::new());
        let host = Arc::new(MockTimerHost::new());
        let scheduler = Arc::new(RolloverScheduler::new(host.clone(), true));
        let registry: Arc<dyn SurfaceRegistry> = if registry.is_empty() {
            Arc::new(StoreSurfaceRegistry::new(store.clone()))
        } else {
            Arc::new(FixedRegistry(registry))
        };
        let dispatcher = UpdateDispatcher::new(
            source,
            store.clone(),
            registry,
            sink.clone(),
            scheduler,
            RenderModelBuilder::new(&RenderConfig::default()).expect("builder"),
            Arc::new(ActivityLog::disabled()),
        );
        Harness {
            dispatcher,
            store,
            sink,
            host,
        }
    }

    fn noon(month: u32, day: u32) -> chrono::DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, month, day, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn global_trigger_resets_all_surfaces_to_today() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(
            dir.path(),
            &["01-05", "01-06", "01-07", "01-08", "01-09"],
            vec![1, 2, 3],
        );
        h.store.set(1, key("01-05")).unwrap();
        h.store.set(2, key("01-09")).unwrap();
        // Surface 3 has no stored cursor.

        let outcome = h
            .dispatcher
            .on_external_trigger(UpdateTrigger::Boot, &noon(1, 7));

        assert_eq!(outcome.today, key("01-07"));
        assert_eq!(outcome.updated, vec![1, 2, 3]);
        assert!(outcome.failures.is_empty());
        for surface in [1, 2, 3] {
            assert_eq!(h.store.get(surface), Some(key("01-07")));
        }
        assert!(outcome.schedule.is_armed());
    }

    #[test]
    fn user_navigation_leaves_other_surfaces_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), &["01-05", "01-06", "01-07"], vec![1, 2]);
        h.store.set(1, key("01-06")).unwrap();
        h.store.set(2, key("01-06")).unwrap();

        let model = h
            .dispatcher
            .navigate(1, Direction::Next, &noon(1, 6))
            .expect("navigate");

        assert_eq!(model.key, key("01-07"));
        assert_eq!(h.store.get(1), Some(key("01-07")));
        assert_eq!(h.store.get(2), Some(key("01-06")));
        // Navigation must not arm the scheduler.
        assert!(h.host.active().is_none());
    }

    #[test]
    fn timer_fire_dispatches_and_re_arms() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), &["06-03", "06-04"], vec![1]);
        h.store.set(1, key("06-03")).unwrap();

        let outcome = h.dispatcher.on_timer_fire(&noon(6, 4));

        assert_eq!(outcome.trigger, UpdateTrigger::TimerFired);
        assert_eq!(h.store.get(1), Some(key("06-04")));
        // Exactly one pending wake-up afterwards.
        assert!(h.host.active().is_some());
        assert!(outcome.schedule.is_armed());
    }

    #[test]
    fn first_surface_added_arms_timer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), &["06-03"], vec![]);

        assert!(h.host.active().is_none());
        let model = h
            .dispatcher
            .on_surface_added(10, &noon(6, 3))
            .expect("add");
        assert_eq!(model.key, key("06-03"));
        assert!(h.host.active().is_some());

        // A second surface does not re-arm.
        let armed_at = h.host.schedule_calls();
        h.dispatcher.on_surface_added(11, &noon(6, 3)).expect("add");
        assert_eq!(h.host.schedule_calls(), armed_at);
    }

    #[test]
    fn last_surface_removed_cancels_timer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), &["06-03"], vec![]);

        h.dispatcher.on_surface_added(10, &noon(6, 3)).expect("add");
        h.dispatcher.on_surface_added(11, &noon(6, 3)).expect("add");

        h.dispatcher.on_surface_removed(10).expect("remove");
        assert!(h.host.active().is_some(), "one surface left, timer stays");

        h.dispatcher.on_surface_removed(11).expect("remove");
        assert!(h.host.active().is_none(), "last surface gone, timer cancelled");
    }

    #[test]
    fn dispatch_with_empty_index_degrades_without_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), &[], vec![1]);

        let outcome = h
            .dispatcher
            .on_external_trigger(UpdateTrigger::ManualForceToday, &noon(4, 10));

        assert_eq!(outcome.updated, vec![1]);
        assert!(outcome.failures.is_empty());
        let rendered = h.sink.rendered.lock();
        let (_, model) = rendered.last().expect("rendered");
        assert!(model.placeholder);
        assert_eq!(model.key, key("04-10"));
    }

    #[test]
    fn render_failure_does_not_abort_remaining_surfaces() {
        struct FailingFirstSink {
            inner: CollectingSink,
        }
        impl RenderSink for FailingFirstSink {
            fn render(&self, surface: SurfaceId, model: &RenderModel) -> Result<()> {
                if surface == 1 {
                    return Err(crate::core::errors::DteError::Runtime {
                        details: "sink rejected surface".to_string(),
                    });
                }
                self.inner.render(surface, model)
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let source = write_entries(dir.path(), &["01-07"]);
        let store: Arc<MemoryCursorStore> = Arc::new(MemoryCursorStore::new());
        let sink = Arc::new(FailingFirstSink {
            inner: CollectingSink::new(),
        });
        let host = Arc::new(MockTimerHost::new());
        let dispatcher = UpdateDispatcher::new(
            source,
            store.clone(),
            Arc::new(FixedRegistry(vec![1, 2])),
            sink.clone(),
            Arc::new(RolloverScheduler::new(host, true)),
            RenderModelBuilder::new(&RenderConfig::default()).expect("builder"),
            Arc::new(ActivityLog::disabled()),
        );

        let outcome = dispatcher.on_external_trigger(UpdateTrigger::Boot, &noon(1, 7));

        assert_eq!(outcome.updated, vec![2]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, 1);
        // Both cursors were still forced to today.
        assert_eq!(store.get(1), Some(key("01-07")));
        assert_eq!(store.get(2), Some(key("01-07")));
    }

    #[test]
    fn render_failure_severity_follows_retryability() {
        struct MixedFailureSink;
        impl RenderSink for MixedFailureSink {
            fn render(&self, surface: SurfaceId, _model: &RenderModel) -> Result<()> {
                match surface {
                    1 => Err(crate::core::errors::DteError::Runtime {
                        details: "transient sink hiccup".to_string(),
                    }),
                    2 => Err(crate::core::errors::DteError::InvalidDateKey {
                        raw: "bogus".to_string(),
                    }),
                    _ => Ok(()),
                }
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let source = write_entries(dir.path(), &["01-07"]);
        let log_path = dir.path().join("activity.jsonl");
        let dispatcher = UpdateDispatcher::new(
            source,
            Arc::new(MemoryCursorStore::new()),
            Arc::new(FixedRegistry(vec![1, 2, 3])),
            Arc::new(MixedFailureSink),
            Arc::new(RolloverScheduler::new(Arc::new(MockTimerHost::new()), true)),
            RenderModelBuilder::new(&RenderConfig::default()).expect("builder"),
            Arc::new(ActivityLog::open(&log_path)),
        );

        let outcome = dispatcher.on_external_trigger(UpdateTrigger::Boot, &noon(1, 7));
        assert_eq!(outcome.updated, vec![3]);
        assert_eq!(outcome.failures.len(), 2);

        let raw = fs::read_to_string(&log_path).expect("log exists");
        let severity_of = |surface: i64| {
            raw.lines()
                .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("valid json"))
                .find(|v| v["event"] == "error" && v["surface"] == surface)
                .map(|v| v["severity"].as_str().expect("severity").to_string())
                .expect("error entry for surface")
        };
        // A transient runtime failure may clear on the next pass.
        assert_eq!(severity_of(1), "warning");
        // A malformed key will not fix itself.
        assert_eq!(severity_of(2), "critical");
    }

    #[test]
    fn scheduling_failure_surfaces_as_warning_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = write_entries(dir.path(), &["01-07"]);
        let store: Arc<MemoryCursorStore> = Arc::new(MemoryCursorStore::new());
        let dispatcher = UpdateDispatcher::new(
            source,
            store.clone(),
            Arc::new(FixedRegistry(vec![1])),
            Arc::new(CollectingSink::new()),
            Arc::new(RolloverScheduler::new(Arc::new(MockTimerHost::denying_all()), true)),
            RenderModelBuilder::new(&RenderConfig::default()).expect("builder"),
            Arc::new(ActivityLog::disabled()),
        );

        let outcome = dispatcher.on_external_trigger(UpdateTrigger::Boot, &noon(1, 7));

        assert_eq!(outcome.updated, vec![1]);
        assert_eq!(outcome.schedule, ScheduleState::Unarmed);
        assert!(outcome.schedule_warning.is_some());
    }
}
