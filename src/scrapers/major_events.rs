use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use tracing::{debug, info, instrument, warn};

use super::collapsed_text;
use crate::error::FetchError;
use crate::fetch::PageSource;

const DATE_BLOCK_HEADING: &str = "Date & Time";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MajorEventListing {
    pub name: String,
    pub link: String,
}

impl MajorEventListing {
    /// Site-relative links point at internal articles without a date block.
    pub fn is_relative(&self) -> bool {
        self.link.starts_with('/')
    }
}

/// Names and links from the major-events article, paired in page order.
pub fn parse_listings(html: &str) -> Result<Vec<MajorEventListing>, FetchError> {
    let document = Html::parse_document(html);

    let names: Vec<String> = document
        .select(selector!("h1.heading--small"))
        .map(collapsed_text)
        .collect();

    let links: Vec<String> = document
        .select(selector!("a.short-content__cta-link.hoverwhite"))
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect();

    if names.is_empty() {
        return Err(FetchError::MarkupMissing("h1.heading--small".to_string()));
    }
    if names.len() != links.len() {
        warn!(
            "Major events page lists {} names but {} links; pairing in order",
            names.len(),
            links.len()
        );
    }

    Ok(names
        .into_iter()
        .zip(links)
        .map(|(name, link)| MajorEventListing { name, link })
        .collect())
}

/// The paragraph under the "Date & Time" heading of an event detail page.
pub fn parse_detail_dates(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(selector!("div.extra-block"))
        .find(|block| {
            block
                .select(selector!("h3.tag"))
                .next()
                .is_some_and(|tag| collapsed_text(tag) == DATE_BLOCK_HEADING)
        })
        .and_then(|block| block.select(selector!("p")).next())
        .map(|p| {
            // One line per text node so a `<br>` keeps the date on its own line
            p.text()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
}

pub struct MajorEventsCrawler {
    source: Arc<dyn PageSource>,
    url: String,
    detail_delay: Duration,
}

impl MajorEventsCrawler {
    pub fn new(source: Arc<dyn PageSource>, url: impl Into<String>, detail_delay: Duration) -> Self {
        Self {
            source,
            url: url.into(),
            detail_delay,
        }
    }

    /// Fetches the article and each absolute detail link in turn. Only the
    /// article fetch is fatal; a detail page that fails leaves that event
    /// without dates.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn crawl(&self) -> Result<Vec<(MajorEventListing, Option<String>)>, FetchError> {
        let html = self.source.fetch(&self.url).await?;
        let listings = parse_listings(&html)?;
        info!("Found {} major events", listings.len());

        let mut results = Vec::with_capacity(listings.len());
        for listing in listings {
            if listing.is_relative() {
                debug!(link = %listing.link, "Skipping relative link");
                results.push((listing, None));
                continue;
            }

            let dates = match self.source.fetch(&listing.link).await {
                Ok(detail) => parse_detail_dates(&detail),
                Err(e) => {
                    warn!(link = %listing.link, "Failed to fetch detail page: {}", e);
                    None
                }
            };
            results.push((listing, dates));

            tokio::time::sleep(self.detail_delay).await;
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticPageSource;

    const ARTICLE: &str = r#"
        <html><body>
          <h1 class="heading--small">San Diego Pride</h1>
          <a class="short-content__cta-link hoverwhite" href="https://sdpride.example/festival">More</a>
          <h1 class="heading--small">Restaurant Week</h1>
          <a class="short-content__cta-link hoverwhite" href="/articles/food/restaurant-week.aspx">More</a>
          <h1 class="heading--small">Holiday Bowl</h1>
          <a class="short-content__cta-link hoverwhite" href="https://bowl.example/game">More</a>
        </body></html>
    "#;

    const PRIDE_DETAIL: &str = r#"
        <div class="extra-block"><h3 class="tag">Location</h3><p>Balboa Park</p></div>
        <div class="extra-block"><h3 class="tag"> Date &amp; Time </h3><p>
            Jul 19 - Jul 20, 2025
            11 a.m. - 8 p.m.
        </p></div>
    "#;

    #[test]
    fn pairs_names_with_links() {
        let listings = parse_listings(ARTICLE).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[1].name, "Restaurant Week");
        assert!(listings[1].is_relative());
        assert!(!listings[0].is_relative());
    }

    #[test]
    fn detail_dates_come_from_the_date_block() {
        let dates = parse_detail_dates(PRIDE_DETAIL).unwrap();
        assert!(dates.starts_with("Jul 19 - Jul 20, 2025"));
        assert_eq!(parse_detail_dates("<div class=\"extra-block\"><p>x</p></div>"), None);
    }

    #[test]
    fn article_without_headings_is_missing_markup() {
        assert!(matches!(
            parse_listings("<html></html>"),
            Err(FetchError::MarkupMissing(_))
        ));
    }

    #[tokio::test]
    async fn crawl_skips_relative_links_and_tolerates_failed_details() {
        let source = StaticPageSource::new()
            .with_page("https://www.example/major", ARTICLE)
            .with_page("https://sdpride.example/festival", PRIDE_DETAIL);
        let crawler = MajorEventsCrawler::new(
            Arc::new(source),
            "https://www.example/major",
            Duration::ZERO,
        );

        let results = crawler.crawl().await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.as_deref().unwrap().starts_with("Jul 19"));
        assert_eq!(results[1].1, None);
        // bowl.example is not served, so the detail fetch fails
        assert_eq!(results[2].1, None);
    }
}
