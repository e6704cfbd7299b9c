//! Render-model construction for one resolved surface.
//!
//! The model is everything a render sink needs to draw a surface: date
//! label, title line, marked-up body, reading-plan extras, and link targets.
//! Parenthesized scripture references in the body get wrapped in italic
//! colored markup.

#![allow(missing_docs)]

use std::fmt::Write as _;

use regex::Regex;
use serde::Serialize;

use crate::core::config::RenderConfig;
use crate::core::date_key::MonthDay;
use crate::core::errors::{DteError, Result};
use crate::source::index::DateIndex;
use crate::source::ReadingSchedule;

/// Everything the render sink needs for one surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenderModel {
    pub key: MonthDay,
    /// `YYYY-MM-DD (Weekday)`, or `YYYY-MM-DD` when the key does not exist
    /// in the display year (a leap day outside leap years).
    pub date_label: String,
    /// Title joined with its scripture reference when one exists.
    pub title_line: String,
    pub body_markup: String,
    /// 1-based reading-plan day number, when the plan covers this date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_range: Option<String>,
    /// Search link for the reading range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_range_link: Option<String>,
    /// Spreadsheet behind the reading-day label.
    pub schedule_sheet_link: String,
    /// Library page for this date.
    pub source_link: String,
    /// True when the key had no payload and the placeholder card is shown.
    pub placeholder: bool,
    pub nav: NavAffordances,
}

/// Which navigation actions are meaningful for the rendered position.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct NavAffordances {
    /// False at the first entry (and on an empty index): prev is a no-op.
    pub prev: bool,
    /// False at the last entry (and on an empty index): next is a no-op.
    pub next: bool,
    pub today: bool,
}

/// Builds render models from config plus loaded source data.
#[derive(Debug, Clone)]
pub struct RenderModelBuilder {
    cfg: RenderConfig,
    scripture_ref: Regex,
}

impl RenderModelBuilder {
    pub fn new(cfg: &RenderConfig) -> Result<Self> {
        let scripture_ref = Regex::new(r"\([^)]+\)").map_err(|err| DteError::Runtime {
            details: format!("scripture reference pattern failed to compile: {err}"),
        })?;
        Ok(Self {
            cfg: cfg.clone(),
            scripture_ref,
        })
    }

    /// Build the model for `key` in display year `year`.
    #[must_use]
    pub fn build(
        &self,
        index: &DateIndex,
        schedule: &ReadingSchedule,
        key: MonthDay,
        year: i32,
    ) -> RenderModel {
        let entry = index.entry(key);

        let (title_line, body_markup, placeholder) = entry.map_or_else(
            || {
                (
                    self.cfg.placeholder_title.clone(),
                    self.cfg.placeholder_body.clone(),
                    true,
                )
            },
            |entry| {
                let title_line = entry.reference.as_ref().map_or_else(
                    || entry.title.clone(),
                    |reference| format!("{} {}", entry.title, reference),
                );
                (title_line, self.mark_up_body(&entry.body), false)
            },
        );

        let assignment = schedule.get(key);
        let reading_range_link = assignment.map(|a| {
            format!(
                "{}?q={}",
                self.cfg.library_search_url,
                percent_encode(&a.reading)
            )
        });

        let position = index.position(key);
        let nav = NavAffordances {
            prev: position.is_some_and(|p| p > 0),
            next: position.is_some_and(|p| p + 1 < index.len()),
            today: true,
        };

        RenderModel {
            key,
            date_label: date_label(key, year),
            title_line,
            body_markup,
            reading_day: assignment.map(|a| a.day),
            reading_range: assignment.map(|a| a.reading.clone()),
            reading_range_link,
            schedule_sheet_link: self.cfg.schedule_sheet_url.clone(),
            source_link: format!(
                "{}/{year}/{}/{}",
                self.cfg.library_base_url,
                key.month(),
                key.day()
            ),
            placeholder,
            nav,
        }
    }

    fn mark_up_body(&self, body: &str) -> String {
        self.scripture_ref
            .replace_all(body, |caps: &regex::Captures<'_>| {
                format!(
                    "<i><font color=\"{}\">{}</font></i>",
                    self.cfg.highlight_color, &caps[0]
                )
            })
            .into_owned()
    }
}

fn date_label(key: MonthDay, year: i32) -> String {
    key.in_year(year).map_or_else(
        || format!("{year}-{key}"),
        |date| date.format("%Y-%m-%d (%a)").to_string(),
    )
}

/// RFC 3986 percent-encoding of everything outside the unreserved set.
fn percent_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}
