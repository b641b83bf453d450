use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};

use super::collapsed_text;
use crate::error::FetchError;
use crate::types::ScrapedEvent;

const RESULT_SECTION: &str = "section.result";

// Listing titles are numbered, e.g. "12. San Diego County Fair"
static ORDINAL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s+").expect("ordinal prefix pattern is valid"));

fn strip_ordinal(title: &str) -> &str {
    match ORDINAL_PREFIX.find(title) {
        Some(prefix) => &title[prefix.end()..],
        None => title,
    }
}

/// Extracts event titles and raw date text from the events listing page.
///
/// Result sections missing a title link or a date block are skipped. A page
/// with no result sections at all means the markup changed (or the page
/// never loaded), which is a [`FetchError::MarkupMissing`].
pub fn parse_events(html: &str) -> Result<Vec<ScrapedEvent>, FetchError> {
    let document = Html::parse_document(html);
    let sections: Vec<_> = document.select(selector!(RESULT_SECTION)).collect();

    if sections.is_empty() {
        return Err(FetchError::MarkupMissing(RESULT_SECTION.to_string()));
    }

    let mut events = Vec::with_capacity(sections.len());
    for section in sections {
        let title = section.select(selector!("h1.result__title a")).next();
        let dates = section.select(selector!("div.result__dates")).next();

        let (Some(title), Some(dates)) = (title, dates) else {
            debug!("Skipping result section without title or dates");
            continue;
        };

        let name = strip_ordinal(&collapsed_text(title)).to_string();
        let date_range_raw = collapsed_text(dates);
        if name.is_empty() || date_range_raw.is_empty() {
            debug!("Skipping result section with empty title or dates");
            continue;
        }

        events.push(ScrapedEvent {
            name,
            date_range_raw,
        });
    }

    info!("Parsed {} events from listing page", events.len());
    if events.is_empty() {
        warn!("No events found - the page structure may have changed");
    }

    Ok(events)
}
