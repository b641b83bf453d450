//! Date-range normalization for event listings.
//!
//! Listing pages describe dates as free text: `"Jan 5 - Jan 8, 2025"`,
//! `"Mar 3 - ongoing"`, `"Jul 4, 2024 - ongoing"`, `"Dec 31"`. The
//! [`DateRangeNormalizer`] turns that text into a `(start, end)` pair of
//! calendar dates relative to the run date.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::constants::ISO_DATE_FORMAT;
use crate::error::ParseError;

pub const RANGE_DELIMITER: &str = " - ";
const ONGOING_MARKER: &str = "ongoing";

const ENGLISH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const ENGLISH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Month-name lookup, `{name: month number}`. Keys are matched
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTable {
    months: HashMap<String, u32>,
}

impl MonthTable {
    /// Three-letter English abbreviations only, as `%b` accepts.
    pub fn english() -> Self {
        Self::from_pairs(ENGLISH_ABBREVIATIONS.iter().zip(1..=12).map(|(m, n)| (*m, n)))
    }

    /// Abbreviations plus full English month names and "Sept".
    pub fn english_long() -> Self {
        let mut table = Self::english();
        table.extend(ENGLISH_NAMES.iter().zip(1..=12).map(|(m, n)| (*m, n)));
        table.extend([("sept", 9)]);
        table
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut table = Self {
            months: HashMap::new(),
        };
        table.extend(pairs);
        table
    }

    fn extend<I, S>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        for (name, number) in pairs {
            self.months.insert(name.as_ref().to_lowercase(), number);
        }
    }

    pub fn month(&self, name: &str) -> Option<u32> {
        self.months.get(&name.to_lowercase()).copied()
    }
}

impl Default for MonthTable {
    fn default() -> Self {
        Self::english()
    }
}

/// The raw text split on [`RANGE_DELIMITER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segments<'a> {
    Single(&'a str),
    Range { start: &'a str, end: &'a str },
}

impl<'a> Segments<'a> {
    pub fn split(raw: &'a str) -> Self {
        let raw = raw.trim();
        match raw.split_once(RANGE_DELIMITER) {
            Some((start, end)) => Segments::Range {
                start: start.trim(),
                end: end.trim(),
            },
            None => Segments::Single(raw),
        }
    }

    pub fn start(&self) -> &'a str {
        match *self {
            Segments::Single(text) => text,
            Segments::Range { start, .. } => start,
        }
    }
}

/// Where a year-less start date takes its year from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSource {
    /// The run date's year.
    RunYear,
    /// The text after the last comma of the end segment.
    EndSegment,
}

/// An "ongoing" end, or a lone date with nothing to inherit from, takes the
/// run year. Every other start inherits the end segment's year.
pub fn year_source(segments: &Segments<'_>) -> YearSource {
    match segments {
        Segments::Single(_) => YearSource::RunYear,
        Segments::Range { end, .. } if is_ongoing(end) => YearSource::RunYear,
        Segments::Range { .. } => YearSource::EndSegment,
    }
}

pub fn is_ongoing(text: &str) -> bool {
    text.to_lowercase().contains(ONGOING_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn iso_pair(&self) -> (String, String) {
        (
            self.start.format(ISO_DATE_FORMAT).to_string(),
            self.end.format(ISO_DATE_FORMAT).to_string(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DateRangeNormalizer {
    months: MonthTable,
}

impl DateRangeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_months(months: MonthTable) -> Self {
        Self { months }
    }

    /// Normalizes `raw` relative to `run_date`.
    ///
    /// A start date written without a year gets one according to
    /// [`year_source`]. An end marked "ongoing" resolves to `run_date`; a
    /// single date is both start and end.
    pub fn normalize(&self, raw: &str, run_date: NaiveDate) -> Result<DateRange, ParseError> {
        let segments = Segments::split(raw);
        let start_text = segments.start();
        let year_inferred = start_text.split_whitespace().count() == 2;

        let mut start = if year_inferred {
            let year = self.resolve_year(&segments, run_date, raw)?;
            self.parse_date(&format!("{start_text}, {year}"))?
        } else {
            self.parse_date(start_text)?
        };

        let end = match segments {
            Segments::Single(_) => start,
            Segments::Range { end, .. } if is_ongoing(end) => run_date,
            Segments::Range { end, .. } => self.parse_date(end)?,
        };

        if end < start {
            if !year_inferred {
                return Err(ParseError::EndBeforeStart(raw.trim().to_string()));
            }
            // "Nov 21 - Jan 4, 2026" and "Aug 1 - ongoing" before August
            // both started the year before
            start = NaiveDate::from_ymd_opt(start.year() - 1, start.month(), start.day())
                .ok_or_else(|| ParseError::NonexistentDate(raw.trim().to_string()))?;
        }

        Ok(DateRange { start, end })
    }

    fn resolve_year(
        &self,
        segments: &Segments<'_>,
        run_date: NaiveDate,
        raw: &str,
    ) -> Result<String, ParseError> {
        match (year_source(segments), segments) {
            (YearSource::RunYear, _) => Ok(run_date.year().to_string()),
            (YearSource::EndSegment, Segments::Range { end, .. }) => end
                .rsplit_once(',')
                .map(|(_, year)| year.trim().to_string())
                .filter(|year| !year.is_empty())
                .ok_or_else(|| ParseError::MissingYear(raw.trim().to_string())),
            (YearSource::EndSegment, Segments::Single(_)) => {
                Err(ParseError::MissingYear(raw.trim().to_string()))
            }
        }
    }

    /// Parses `"Mon D, YYYY"`. Runs of whitespace are tolerated; the comma
    /// after the day is not optional.
    pub fn parse_date(&self, text: &str) -> Result<NaiveDate, ParseError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [month, day, year] = tokens.as_slice() else {
            return Err(ParseError::Malformed(text.to_string()));
        };

        let month_number = self
            .months
            .month(month)
            .ok_or_else(|| ParseError::UnknownMonth {
                input: text.to_string(),
                month: month.to_string(),
            })?;

        let day = day
            .strip_suffix(',')
            .ok_or_else(|| ParseError::Malformed(text.to_string()))?;
        if day.is_empty() || day.len() > 2 || !day.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidDay(text.to_string()));
        }
        let day: u32 = day
            .parse()
            .map_err(|_| ParseError::InvalidDay(text.to_string()))?;

        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidYear(text.to_string()));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| ParseError::InvalidYear(text.to_string()))?;

        NaiveDate::from_ymd_opt(year, month_number, day)
            .ok_or_else(|| ParseError::NonexistentDate(text.to_string()))
    }

    /// Best-effort variant for the major-events detail pages. Only the first
    /// line is read. The year after the end's comma (or the start's, for a
    /// single date) fills in whichever side lacks one, and anything
    /// unparseable becomes `None`. A missing end falls back to the start.
    pub fn normalize_lenient(&self, raw: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let line = raw.lines().next().unwrap_or_default().trim();

        let (start_part, end_part) = match line.split_once(RANGE_DELIMITER) {
            Some((start, end)) => (start.trim(), Some(end.trim())),
            None => (line, None),
        };

        let year = end_part
            .unwrap_or(start_part)
            .split_once(',')
            .map(|(_, year)| year.trim())
            .filter(|year| !year.is_empty());

        let Some(year) = year else {
            return (None, None);
        };

        // A side that spells out its own year keeps it
        let with_year = |part: &str| {
            let text = match part.split_once(',') {
                Some((month_day, own)) if !own.trim().is_empty() => {
                    format!("{}, {}", month_day.trim(), own.trim())
                }
                Some((month_day, _)) => format!("{}, {year}", month_day.trim()),
                None => format!("{}, {year}", part.trim()),
            };
            self.parse_date(&text).ok()
        };

        let start = with_year(start_part);
        let end = end_part.and_then(with_year).or(start);
        (start, end)
    }
}
