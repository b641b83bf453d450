use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::constants::{FILE_STAMP_FORMAT, ISO_DATE_FORMAT, LOAD_TIMESTAMP_FORMAT};

/// Wall clock captured once per run. Every date and timestamp a run
/// writes derives from this single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    pub now: NaiveDateTime,
}

impl RunClock {
    pub fn now() -> Self {
        Self {
            now: Local::now().naive_local(),
        }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn load_timestamp(&self) -> String {
        self.now.format(LOAD_TIMESTAMP_FORMAT).to_string()
    }

    pub fn partition_date(&self) -> String {
        self.now.format(ISO_DATE_FORMAT).to_string()
    }

    pub fn file_stamp(&self) -> String {
        self.now.format(FILE_STAMP_FORMAT).to_string()
    }
}

/// Event text as found on the listing page, before date normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedEvent {
    pub name: String,
    pub date_range_raw: String,
}

/// One normalized event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub date_range_raw: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub record_load_timestamp: String,
    /// Set only when the major-events lookup ran.
    pub is_major_event: Option<bool>,
}

/// A major event as listed on the major-events article. Dates stay
/// optional: detail pages are frequently missing or unparseable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorEventRecord {
    pub name: String,
    pub link: String,
    pub raw_dates: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub record_load_timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_renderings_share_one_instant() {
        let clock = RunClock::at(
            NaiveDate::from_ymd_opt(2025, 3, 7)
                .unwrap()
                .and_hms_opt(9, 5, 2)
                .unwrap(),
        );
        assert_eq!(clock.partition_date(), "2025-03-07");
        assert_eq!(clock.file_stamp(), "20250307_090502");
        assert_eq!(clock.load_timestamp(), "07-03-2025 09:05:02");
        assert_eq!(clock.run_date(), NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
    }
}
