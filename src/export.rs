use std::io::{self, Write};
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::constants::ISO_DATE_FORMAT;
use crate::error::{Result, ScraperError};
use crate::types::{EventRecord, MajorEventRecord};

pub const EVENT_COLUMNS: [&str; 4] = ["event_name", "start_date", "end_date", "record_load_timestamp"];
pub const MAJOR_FLAG_COLUMN: &str = "is_major_event";

fn iso(date: &chrono::NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

fn flag(is_major: bool) -> &'static str {
    if is_major {
        "Y"
    } else {
        "N"
    }
}

/// `with_flag` adds the trailing `is_major_event` column; set it whenever
/// the lookup ran, even for an empty table.
fn write_events<W: Write>(
    writer: &mut Writer<W>,
    records: &[EventRecord],
    with_flag: bool,
) -> Result<()> {
    let mut header: Vec<&str> = EVENT_COLUMNS.to_vec();
    if with_flag {
        header.push(MAJOR_FLAG_COLUMN);
    }
    writer.write_record(&header)?;

    for record in records {
        let start = iso(&record.start_date);
        let end = iso(&record.end_date);
        let mut row = vec![
            record.name.as_str(),
            start.as_str(),
            end.as_str(),
            record.record_load_timestamp.as_str(),
        ];
        if with_flag {
            row.push(flag(record.is_major_event.unwrap_or(false)));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_events_csv(path: &Path, records: &[EventRecord], with_flag: bool) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    write_events(&mut writer, records, with_flag)
}

pub fn events_csv_string(records: &[EventRecord], with_flag: bool) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::<u8>::new());
    write_events(&mut writer, records, with_flag)?;
    into_string(writer)
}

/// Link and raw date text are dropped; missing dates are empty cells.
pub fn major_events_csv_string(records: &[MajorEventRecord]) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::<u8>::new());
    writer.write_record(EVENT_COLUMNS)?;
    for record in records {
        let start = record.start_date.as_ref().map(iso).unwrap_or_default();
        let end = record.end_date.as_ref().map(iso).unwrap_or_default();
        writer.write_record([
            record.name.as_str(),
            start.as_str(),
            end.as_str(),
            record.record_load_timestamp.as_str(),
        ])?;
    }
    writer.flush()?;
    into_string(writer)
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|error| ScraperError::Io(error.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|error| ScraperError::Io(io::Error::new(io::ErrorKind::InvalidData, error)))
}
