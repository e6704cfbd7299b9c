//! Insertion-ordered date index over the loaded entry sequence.
//!
//! The index preserves the source file's order exactly and is never
//! re-sorted. Navigation distance is positional, not calendar-based, so a
//! source published out of calendar order still steps the way its author
//! arranged it.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::core::date_key::MonthDay;
use crate::source::VerseEntry;

/// Immutable ordered sequence of unique date keys with their payloads.
#[derive(Debug, Clone, Default)]
pub struct DateIndex {
    entries: Vec<VerseEntry>,
    positions: HashMap<MonthDay, usize>,
}

impl DateIndex {
    /// Build an index from raw entries in file order.
    ///
    /// Duplicate keys keep the position of their first occurrence, but the
    /// last payload wins.
    #[must_use]
    pub fn from_entries(raw: Vec<VerseEntry>) -> Self {
        let mut entries: Vec<VerseEntry> = Vec::with_capacity(raw.len());
        let mut positions: HashMap<MonthDay, usize> = HashMap::with_capacity(raw.len());

        for entry in raw {
            if let Some(&pos) = positions.get(&entry.date) {
                entries[pos] = entry;
            } else {
                positions.insert(entry.date, entries.len());
                entries.push(entry);
            }
        }

        Self { entries, positions }
    }

    /// Position of `key` in the sequence, if present.
    #[must_use]
    pub fn position(&self, key: MonthDay) -> Option<usize> {
        self.positions.get(&key).copied()
    }

    #[must_use]
    pub fn contains(&self, key: MonthDay) -> bool {
        self.positions.contains_key(&key)
    }

    /// First key in source order.
    #[must_use]
    pub fn first(&self) -> Option<MonthDay> {
        self.entries.first().map(|e| e.date)
    }

    #[must_use]
    pub fn key_at(&self, position: usize) -> Option<MonthDay> {
        self.entries.get(position).map(|e| e.date)
    }

    /// Payload for `key`, if the sequence carries it.
    #[must_use]
    pub fn entry(&self, key: MonthDay) -> Option<&VerseEntry> {
        self.position(key).and_then(|pos| self.entries.get(pos))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in source order.
    pub fn keys(&self) -> impl Iterator<Item = MonthDay> + '_ {
        self.entries.iter().map(|e| e.date)
    }
}
