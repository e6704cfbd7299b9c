//! `MonthDay` date keys: the `MM-DD` values the entry sequence is keyed by.
//!
//! Keys are month-day only (no year); collision-freedom is only guaranteed
//! within one logical calendar. Keys are never ordered by the engine — the
//! entry source defines reading order, so `MonthDay` deliberately does not
//! implement `Ord`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::DteError;

/// A month-day date key, serialized as zero-padded `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    month: u8,
    day: u8,
}

impl MonthDay {
    /// Build a key from raw components. Month must be 1–12, day 1–31.
    pub fn new(month: u8, day: u8) -> Result<Self, DteError> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(DteError::InvalidDateKey {
                raw: format!("{month:02}-{day:02}"),
            });
        }
        Ok(Self { month, day })
    }

    /// The key for the wall-clock date of `now`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn for_instant<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        // month()/day() are always in range, so new() cannot fail here.
        Self {
            month: now.month() as u8,
            day: now.day() as u8,
        }
    }

    /// Month component, 1-12.
    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }

    /// Day component, 1-31.
    #[must_use]
    pub const fn day(self) -> u8 {
        self.day
    }

    /// Project the key into a concrete year, if the date exists there
    /// (e.g. `02-29` only in leap years).
    #[must_use]
    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, u32::from(self.month), u32::from(self.day))
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = DteError;

    /// Strict parse: exactly `MM-DD`, zero-padded, in range.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || DteError::InvalidDateKey {
            raw: raw.to_string(),
        };

        let bytes = raw.as_bytes();
        if bytes.len() != 5 || bytes[2] != b'-' {
            return Err(invalid());
        }
        if !bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let month = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
        let day = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
        Self::new(month, day).map_err(|_| invalid())
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|_| {
            D::Error::custom(format!("invalid MM-DD date key: {raw:?}"))
        })
    }
}
