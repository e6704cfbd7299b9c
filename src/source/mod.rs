//! Entry and reading-schedule sources: JSON files on disk, loaded tolerantly.
//!
//! A widget that cannot load its data still has to render something, so the
//! tolerant loaders degrade to empty data instead of failing. The strict
//! variants exist for `config validate` style diagnostics.

#![allow(missing_docs)]

pub mod index;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::PathsConfig;
use crate::core::date_key::MonthDay;
use crate::core::errors::{DteError, Result};
use crate::source::index::DateIndex;

/// One daily entry as published in the source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerseEntry {
    pub date: MonthDay,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub body: String,
}

/// One day of the year-long reading plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadingAssignment {
    /// 1-based day number within the plan.
    pub day: u32,
    /// Human-readable range, e.g. `"Genesis 1-3"`.
    pub reading: String,
}

/// Reading plan keyed by date.
#[derive(Debug, Clone, Default)]
pub struct ReadingSchedule {
    by_date: HashMap<MonthDay, ReadingAssignment>,
}

impl ReadingSchedule {
    #[must_use]
    pub fn get(&self, key: MonthDay) -> Option<&ReadingAssignment> {
        self.by_date.get(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

/// File-backed source for entries and the reading plan.
#[derive(Debug, Clone)]
pub struct VerseSource {
    entries_file: PathBuf,
    schedule_file: PathBuf,
}

impl VerseSource {
    #[must_use]
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            entries_file: paths.entries_file.clone(),
            schedule_file: paths.reading_schedule_file.clone(),
        }
    }

    /// Load the entry index, degrading to empty on any failure.
    #[must_use]
    pub fn load_index(&self) -> DateIndex {
        self.try_load_index().unwrap_or_default()
    }

    /// Load the entry index, surfacing the failure.
    pub fn try_load_index(&self) -> Result<DateIndex> {
        let raw = read_source_file(&self.entries_file)?;
        let entries: Vec<VerseEntry> =
            serde_json::from_str(&raw).map_err(|err| DteError::DataUnavailable {
                path: self.entries_file.clone(),
                details: err.to_string(),
            })?;
        Ok(DateIndex::from_entries(entries))
    }

    /// Load the reading plan, degrading to empty on any failure.
    #[must_use]
    pub fn load_schedule(&self) -> ReadingSchedule {
        self.try_load_schedule().unwrap_or_default()
    }

    /// Load the reading plan, surfacing the failure.
    pub fn try_load_schedule(&self) -> Result<ReadingSchedule> {
        let raw = read_source_file(&self.schedule_file)?;
        let by_date: HashMap<MonthDay, ReadingAssignment> =
            serde_json::from_str(&raw).map_err(|err| DteError::DataUnavailable {
                path: self.schedule_file.clone(),
                details: err.to_string(),
            })?;
        Ok(ReadingSchedule { by_date })
    }
}

fn read_source_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| DteError::DataUnavailable {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_in(dir: &Path) -> VerseSource {
        let paths = PathsConfig {
            entries_file: dir.join("daily_verses.json"),
            reading_schedule_file: dir.join("bible_reading_schedule.json"),
            ..PathsConfig::default()
        };
        VerseSource::new(&paths)
    }

    #[test]
    fn loads_entry_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("daily_verses.json"),
            r#"[
                {"date": "01-01", "title": "T1", "reference": "Ps. 1:1", "body": "B1"},
                {"date": "01-02", "title": "T2", "body": "B2"}
            ]"#,
        )
        .expect("write entries");

        let index = source_in(dir.path()).try_load_index().expect("index loads");
        assert_eq!(index.len(), 2);
        let first = index.entry("01-01".parse().unwrap()).expect("entry");
        assert_eq!(first.reference.as_deref(), Some("Ps. 1:1"));
        let second = index.entry("01-02".parse().unwrap()).expect("entry");
        assert_eq!(second.reference, None);
    }

    #[test]
    fn missing_entries_file_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path());
        assert!(source.load_index().is_empty());

        let err = source.try_load_index().unwrap_err();
        assert_eq!(err.code(), "DTE-2001");
    }

    #[test]
    fn corrupt_entries_file_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("daily_verses.json"), "{ not json").expect("write");
        assert!(source_in(dir.path()).load_index().is_empty());
    }

    #[test]
    fn loads_reading_schedule_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("bible_reading_schedule.json"),
            r#"{"01-07": {"day": 7, "reading": "Genesis 18-20"}}"#,
        )
        .expect("write schedule");

        let schedule = source_in(dir.path()).load_schedule();
        assert_eq!(schedule.len(), 1);
        let assignment = schedule.get("01-07".parse().unwrap()).expect("assignment");
        assert_eq!(assignment.day, 7);
        assert_eq!(assignment.reading, "Genesis 18-20");
    }

    #[test]
    fn missing_schedule_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(source_in(dir.path()).load_schedule().is_empty());
    }
}
