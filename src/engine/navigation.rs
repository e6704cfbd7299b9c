//! Cursor resolution and stepping for one surface.
//!
//! `resolve` applies the fallback chain (requested, stored, today, first
//! entry, synthetic today) and then re-persists the effective key even when
//! it did not change, so an invalid stored cursor heals itself on the next
//! pass. `navigate` steps positionally and clamps at both ends of the
//! sequence; a prev/next at the edge is a no-op that still re-persists.
//!
//! Resolution never fails. Persistence problems are carried on the result
//! for the caller to log and the surface still gets a key to display.

#![allow(missing_docs)]

use crate::core::date_key::MonthDay;
use crate::core::errors::DteError;
use crate::source::index::DateIndex;
use crate::store::{CursorStore, SurfaceId};

/// User-initiated navigation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
    Today,
}

/// Outcome of a resolve or navigate pass for one surface.
#[derive(Debug)]
pub struct Resolution {
    /// The key the surface should display.
    pub key: MonthDay,
    /// True when the index is empty and `key` is a synthetic today with no
    /// payload behind it.
    pub degraded: bool,
    /// Swallowed self-healing persist failure, if any. The resolution is
    /// still valid for this pass; only durability suffered.
    pub persist_error: Option<DteError>,
}

/// Stateless resolver over one index snapshot and a cursor store.
pub struct NavigationEngine<'a> {
    index: &'a DateIndex,
    store: &'a dyn CursorStore,
}

impl<'a> NavigationEngine<'a> {
    #[must_use]
    pub fn new(index: &'a DateIndex, store: &'a dyn CursorStore) -> Self {
        Self { index, store }
    }

    /// Resolve the effective key for `surface` and persist it.
    pub fn resolve(
        &self,
        surface: SurfaceId,
        today: MonthDay,
        requested: Option<MonthDay>,
    ) -> Resolution {
        let candidate = requested
            .or_else(|| self.store.get(surface))
            .unwrap_or(today);

        let (key, degraded) = if self.index.contains(candidate) {
            (candidate, false)
        } else if self.index.contains(today) {
            (today, false)
        } else if let Some(first) = self.index.first() {
            // Deliberately the first entry, not the nearest date.
            (first, false)
        } else {
            (today, true)
        };

        self.persist(surface, key, degraded)
    }

    /// Apply a user navigation action for `surface` and persist the result.
    pub fn navigate(&self, surface: SurfaceId, today: MonthDay, direction: Direction) -> Resolution {
        if direction == Direction::Today {
            return self.resolve(surface, today, Some(today));
        }

        let Some(last) = self.index.len().checked_sub(1) else {
            return self.persist(surface, today, true);
        };

        let anchor = self.store.get(surface).unwrap_or(today);
        let position = self.index.position(anchor).unwrap_or(0);
        let stepped = if direction == Direction::Prev {
            position.saturating_sub(1)
        } else {
            position.saturating_add(1).min(last)
        };

        let key = self
            .index
            .key_at(stepped)
            .unwrap_or(anchor);
        self.persist(surface, key, false)
    }

    fn persist(&self, surface: SurfaceId, key: MonthDay, degraded: bool) -> Resolution {
        let persist_error = self.store.set(surface, key).err();
        Resolution {
            key,
            degraded,
            persist_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VerseEntry;
    use crate::store::MemoryCursorStore;

    fn key(raw: &str) -> MonthDay {
        raw.parse().expect("valid key")
    }

    fn index_of(keys: &[&str]) -> DateIndex {
        DateIndex::from_entries(
            keys.iter()
                .map(|raw| VerseEntry {
                    date: key(raw),
                    title: format!("title {raw}"),
                    reference: None,
                    body: String::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn stored_cursor_in_index_wins_over_today() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-02")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.resolve(1, key("01-03"), None);
        assert_eq!(res.key, key("01-02"));
        assert!(!res.degraded);
    }

    #[test]
    fn requested_key_wins_over_stored_cursor() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-02")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.resolve(1, key("01-01"), Some(key("01-03")));
        assert_eq!(res.key, key("01-03"));
    }

    #[test]
    fn invalid_stored_cursor_heals_to_today() {
        let index = index_of(&["02-01", "02-02"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("09-09")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.resolve(1, key("02-02"), None);
        assert_eq!(res.key, key("02-02"));
        // Self-healed in the store as well.
        assert_eq!(store.get(1), Some(key("02-02")));
    }

    #[test]
    fn today_absent_falls_back_to_first_entry() {
        let index = index_of(&["02-01", "02-02"]);
        let store = MemoryCursorStore::new();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.resolve(1, key("03-01"), None);
        assert_eq!(res.key, key("02-01"));
        assert!(!res.degraded);
    }

    #[test]
    fn empty_index_degrades_to_synthetic_today() {
        let index = DateIndex::default();
        let store = MemoryCursorStore::new();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.resolve(1, key("04-10"), None);
        assert_eq!(res.key, key("04-10"));
        assert!(res.degraded);
        assert!(res.persist_error.is_none());
    }

    #[test]
    fn resolve_is_idempotent() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-02")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let first = engine.resolve(1, key("01-01"), None);
        let second = engine.resolve(1, key("01-01"), None);
        assert_eq!(first.key, key("01-02"));
        assert_eq!(second.key, key("01-02"));
        assert_eq!(store.get(1), Some(key("01-02")));
    }

    #[test]
    fn next_clamps_at_last_entry() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-03")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.navigate(1, key("01-02"), Direction::Next);
        assert_eq!(res.key, key("01-03"));
        assert_eq!(store.get(1), Some(key("01-03")));
    }

    #[test]
    fn prev_clamps_at_first_entry() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-01")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.navigate(1, key("01-02"), Direction::Prev);
        assert_eq!(res.key, key("01-01"));
    }

    #[test]
    fn next_then_prev_returns_to_start() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-02")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        assert_eq!(engine.navigate(1, key("01-02"), Direction::Next).key, key("01-03"));
        assert_eq!(engine.navigate(1, key("01-02"), Direction::Prev).key, key("01-02"));
    }

    #[test]
    fn navigate_today_forces_today() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("01-03")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.navigate(1, key("01-01"), Direction::Today);
        assert_eq!(res.key, key("01-01"));
        assert_eq!(store.get(1), Some(key("01-01")));
    }

    #[test]
    fn unindexed_anchor_steps_from_first_entry() {
        let index = index_of(&["01-01", "01-02", "01-03"]);
        let store = MemoryCursorStore::new();
        store.set(1, key("07-07")).unwrap();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.navigate(1, key("08-08"), Direction::Next);
        assert_eq!(res.key, key("01-02"));
    }

    #[test]
    fn navigate_on_empty_index_degrades() {
        let index = DateIndex::default();
        let store = MemoryCursorStore::new();

        let engine = NavigationEngine::new(&index, &store);
        let res = engine.navigate(1, key("04-10"), Direction::Next);
        assert_eq!(res.key, key("04-10"));
        assert!(res.degraded);
    }
}
