use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;

use event_fetcher::dates::{DateRangeNormalizer, MonthTable};
use event_fetcher::error::ScraperError;
use event_fetcher::fetch::StaticPageSource;
use event_fetcher::pipeline::MajorEventsPipeline;
use event_fetcher::scrapers::major_events::MajorEventsCrawler;
use event_fetcher::storage::InMemoryObjectStore;
use event_fetcher::types::RunClock;

const ARTICLE_URL: &str = "https://visit.example/articles/major-events";
const BUCKET: &str = "data-lake";
const PREFIX: &str = "external-data/major_events/";

const FAIR_DETAIL: &str = r#"
    <div class="extra-block"><h3 class="tag">Date &amp; Time</h3>
      <p>June 6 - July 6, 2025<br>Wednesday - Sunday</p>
    </div>
"#;

const BOWL_DETAIL: &str = r#"
    <div class="extra-block"><h3 class="tag">Date &amp; Time</h3><p>To be announced</p></div>
"#;

fn clock() -> RunClock {
    RunClock::at(
        NaiveDate::from_ymd_opt(2025, 3, 2)
            .unwrap()
            .and_hms_opt(23, 5, 41)
            .unwrap(),
    )
}

fn pipeline(source: StaticPageSource, store: Arc<InMemoryObjectStore>) -> MajorEventsPipeline {
    let crawler = MajorEventsCrawler::new(Arc::new(source), ARTICLE_URL, Duration::ZERO);
    MajorEventsPipeline::new(
        crawler,
        store,
        DateRangeNormalizer::with_months(MonthTable::english_long()),
    )
}

#[tokio::test]
async fn writes_major_events_table_to_partitioned_key() -> Result<()> {
    let source = StaticPageSource::new()
        .with_page(
            ARTICLE_URL,
            std::fs::read_to_string("tests/fixtures/major_events.html")?,
        )
        .with_page("https://sdfair.example/", FAIR_DETAIL)
        .with_page("https://holidaybowl.example/", BOWL_DETAIL);
    let store = Arc::new(InMemoryObjectStore::new());

    let summary = pipeline(source, store.clone())
        .run(BUCKET, PREFIX, &clock())
        .await?;

    assert_eq!(summary.records, 3);
    assert_eq!(
        summary.object_key,
        "external-data/major_events/date=2025-03-02/major_events_20250302_230541.csv"
    );
    assert_eq!(store.keys(BUCKET), vec![summary.object_key.clone()]);

    let csv = String::from_utf8(store.object(BUCKET, &summary.object_key).unwrap())?;
    assert_eq!(
        csv.lines().collect::<Vec<_>>(),
        vec![
            "event_name,start_date,end_date,record_load_timestamp",
            "San Diego County Fair,2025-06-06,2025-07-06,02-03-2025 23:05:41",
            "San Diego Restaurant Week,,,02-03-2025 23:05:41",
            "Holiday Bowl,,,02-03-2025 23:05:41",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_article_fails_the_run() {
    let store = Arc::new(InMemoryObjectStore::new());
    let err = pipeline(StaticPageSource::new(), store.clone())
        .run(BUCKET, PREFIX, &clock())
        .await
        .unwrap_err();

    assert!(matches!(err, ScraperError::Fetch(_)));
    assert!(store.keys(BUCKET).is_empty());
}
