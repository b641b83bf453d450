use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LookupLocation;
use crate::constants::{
    EVENTS_CSV_FILE, EVENTS_HTML_SNAPSHOT, EVENTS_OBJECT_STEM, MAJOR_EVENTS_OBJECT_STEM,
};
use crate::dates::DateRangeNormalizer;
use crate::error::Result;
use crate::export;
use crate::fetch::PageSource;
use crate::lookup::MajorEventLookup;
use crate::scrapers::events::parse_events;
use crate::scrapers::major_events::{MajorEventListing, MajorEventsCrawler};
use crate::storage::{partitioned_key, upload_events_file, ObjectStore};
use crate::types::{EventRecord, MajorEventRecord, RunClock, ScrapedEvent};

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub output_file: Option<String>,
    pub object_key: String,
    pub uploaded: bool,
}

/// Normalizes every scraped event. The first date that fails to parse
/// aborts the whole batch.
pub fn normalize_events(
    scraped: Vec<ScrapedEvent>,
    normalizer: &DateRangeNormalizer,
    clock: &RunClock,
) -> Result<Vec<EventRecord>> {
    let run_date = clock.run_date();
    let record_load_timestamp = clock.load_timestamp();

    scraped
        .into_iter()
        .map(|event| -> Result<EventRecord> {
            let range = normalizer
                .normalize(&event.date_range_raw, run_date)
                .map_err(|e| {
                    error!(event = %event.name, "Failed to normalize dates: {}", e);
                    e
                })?;
            Ok(EventRecord {
                name: event.name,
                date_range_raw: event.date_range_raw,
                start_date: range.start,
                end_date: range.end,
                record_load_timestamp: record_load_timestamp.clone(),
                is_major_event: None,
            })
        })
        .collect()
}

pub struct EventsPipeline {
    source: Arc<dyn PageSource>,
    store: Arc<dyn ObjectStore>,
    normalizer: DateRangeNormalizer,
    url: String,
    work_dir: PathBuf,
    lookup: Option<LookupLocation>,
}

impl EventsPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn ObjectStore>,
        url: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            store,
            normalizer: DateRangeNormalizer::new(),
            url: url.into(),
            work_dir: work_dir.into(),
            lookup: None,
        }
    }

    /// Flag major events from the lookup table at `location`.
    pub fn with_lookup(mut self, location: Option<LookupLocation>) -> Self {
        self.lookup = location;
        self
    }

    /// Fetch, parse, normalize, export and upload. Fetch and parse failures
    /// abort the run; an upload failure is logged and shows up as
    /// `uploaded: false` in the summary.
    #[instrument(skip(self, clock), fields(url = %self.url))]
    pub async fn run(&self, bucket: &str, prefix: &str, clock: &RunClock) -> Result<RunSummary> {
        info!("Navigating webpage");
        let html = match self.source.fetch(&self.url).await {
            Ok(html) => html,
            Err(e) => {
                error!("An error occurred: {}", e);
                return Err(e.into());
            }
        };

        fs::create_dir_all(&self.work_dir)?;
        let snapshot = self.work_dir.join(EVENTS_HTML_SNAPSHOT);
        fs::write(&snapshot, &html)?;
        debug!("Saved page snapshot to {}", snapshot.display());

        info!("Scraping all events");
        let scraped = parse_events(&html)?;

        info!("Normalizing event dates to YYYY-MM-DD");
        let mut records = normalize_events(scraped, &self.normalizer, clock)?;

        if let Some(location) = &self.lookup {
            let lookup = MajorEventLookup::load(self.store.as_ref(), location).await?;
            lookup.flag(&mut records);
            let major = records
                .iter()
                .filter(|r| r.is_major_event == Some(true))
                .count();
            info!("{} of {} events are major events", major, records.len());
        }

        let output_file = self.work_dir.join(EVENTS_CSV_FILE);
        export::write_events_csv(&output_file, &records, self.lookup.is_some())?;
        info!("Wrote {} events to {}", records.len(), output_file.display());

        let (object_key, uploaded) = upload_events_file(
            self.store.as_ref(),
            &output_file,
            bucket,
            prefix,
            EVENTS_OBJECT_STEM,
            clock,
        )
        .await;

        Ok(RunSummary {
            records: records.len(),
            output_file: Some(output_file.display().to_string()),
            object_key,
            uploaded,
        })
    }
}

pub struct MajorEventsPipeline {
    crawler: MajorEventsCrawler,
    store: Arc<dyn ObjectStore>,
    normalizer: DateRangeNormalizer,
}

impl MajorEventsPipeline {
    pub fn new(
        crawler: MajorEventsCrawler,
        store: Arc<dyn ObjectStore>,
        normalizer: DateRangeNormalizer,
    ) -> Self {
        Self {
            crawler,
            store,
            normalizer,
        }
    }

    pub fn records(
        &self,
        crawled: Vec<(MajorEventListing, Option<String>)>,
        clock: &RunClock,
    ) -> Vec<MajorEventRecord> {
        let record_load_timestamp = clock.load_timestamp();
        crawled
            .into_iter()
            .map(|(listing, raw_dates)| {
                let (start_date, end_date) = raw_dates
                    .as_deref()
                    .map(|raw| self.normalizer.normalize_lenient(raw))
                    .unwrap_or((None, None));
                if raw_dates.is_some() && start_date.is_none() {
                    warn!(event = %listing.name, "Unparseable major event dates");
                }
                MajorEventRecord {
                    name: listing.name,
                    link: listing.link,
                    raw_dates,
                    start_date,
                    end_date,
                    record_load_timestamp: record_load_timestamp.clone(),
                }
            })
            .collect()
    }

    /// Crawl, build the table and write it straight to object storage.
    /// Every failure propagates.
    #[instrument(skip(self, clock))]
    pub async fn run(&self, bucket: &str, prefix: &str, clock: &RunClock) -> Result<RunSummary> {
        let crawled = self.crawler.crawl().await?;
        let records = self.records(crawled, clock);
        let csv = export::major_events_csv_string(&records)?;

        let object_key = partitioned_key(prefix, MAJOR_EVENTS_OBJECT_STEM, clock);
        self.store
            .put_object(bucket, &object_key, csv.into_bytes())
            .await?;
        info!("Uploaded {} major events to s3://{}/{}", records.len(), bucket, object_key);

        Ok(RunSummary {
            records: records.len(),
            output_file: None,
            object_key,
            uploaded: true,
        })
    }
}
