use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PopulateError;
use crate::util::http::{fetch_text, Fetcher};

/// Longest plain-text summary kept on a game.
pub const SHORT_DESCRIPTION_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameDetails {
    pub short_description: String,
    pub description: String,
}

/// Best-effort description scraper for product pages.
#[derive(Clone)]
pub struct DetailEnricher {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    selector: Selector,
    selector_source: String,
}

impl DetailEnricher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        base_url: &str,
        selector: &str,
    ) -> Result<Self, PopulateError> {
        let compiled = Selector::parse(selector)
            .map_err(|e| PopulateError::Parse(format!("invalid selector '{selector}': {e}")))?;
        Ok(Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            selector: compiled,
            selector_source: selector.to_string(),
        })
    }

    pub fn page_url(&self, slug: &str) -> String {
        format!("{}/{}", self.base_url, slug)
    }

    /// Description fields for `slug`, or `None` when the page cannot be fetched or parsed.
    pub async fn fetch_details(&self, slug: &str) -> Option<GameDetails> {
        match self.try_fetch_details(slug).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(slug, error = %e, "details: enrichment skipped");
                None
            }
        }
    }

    async fn try_fetch_details(&self, slug: &str) -> Result<GameDetails, PopulateError> {
        let url = self.page_url(slug);
        let html = fetch_text(self.fetcher.as_ref(), &url).await?;
        let details = self.parse_details(&html)?;
        debug!(slug, chars = details.description.len(), "details: extracted");
        Ok(details)
    }

    /// Extract the description element's text and markup from a product page.
    pub fn parse_details(&self, html: &str) -> Result<GameDetails, PopulateError> {
        let document = Html::parse_document(html);
        let element = document.select(&self.selector).next().ok_or_else(|| {
            PopulateError::Parse(format!("no element matches '{}'", self.selector_source))
        })?;

        let text: String = element.text().collect();
        Ok(GameDetails {
            short_description: summarize(&text),
            description: element.inner_html(),
        })
    }
}

/// Trimmed text cut to [`SHORT_DESCRIPTION_MAX_CHARS`] characters.
fn summarize(text: &str) -> String {
    let trimmed = text.trim();
    let cut: String = trimmed.chars().take(SHORT_DESCRIPTION_MAX_CHARS).collect();
    cut.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::http::testing::StaticFetcher;

    const BASE: &str = "https://store.test/game";

    fn enricher(fetcher: StaticFetcher) -> DetailEnricher {
        DetailEnricher::new(Arc::new(fetcher), BASE, ".description").unwrap()
    }

    #[test]
    fn extracts_text_and_markup() {
        let html = r#"<html><body>
            <div class="header">Ignore me</div>
            <div class="description">
              <p>A <b>bold</b> adventure.</p>
            </div>
        </body></html>"#;
        let details = enricher(StaticFetcher::new()).parse_details(html).unwrap();
        assert_eq!(details.short_description, "A bold adventure.");
        assert!(details.description.contains("<b>bold</b>"));
    }

    #[test]
    fn short_description_is_capped_at_160_chars() {
        let long = "é".repeat(400);
        let html = format!(r#"<div class="description">  {long}  </div>"#);
        let details = enricher(StaticFetcher::new()).parse_details(&html).unwrap();
        assert_eq!(details.short_description.chars().count(), SHORT_DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn missing_element_is_a_parse_error() {
        let err = enricher(StaticFetcher::new())
            .parse_details("<html><body><p>nothing</p></body></html>")
            .unwrap_err();
        assert!(matches!(err, PopulateError::Parse(_)));
    }

    #[test]
    fn invalid_selector_is_rejected_up_front() {
        assert!(DetailEnricher::new(Arc::new(StaticFetcher::new()), BASE, "div[").is_err());
    }

    #[tokio::test]
    async fn fetch_failures_yield_no_enrichment() {
        let fetcher = StaticFetcher::new().with(&format!("{BASE}/foo_bar"), 500, "boom");
        assert_eq!(enricher(fetcher).fetch_details("foo_bar").await, None);
    }

    #[tokio::test]
    async fn fetches_page_by_slug() {
        let fetcher = StaticFetcher::new().with(
            &format!("{BASE}/foo_bar"),
            200,
            r#"<div class="description">Great game</div>"#,
        );
        let details = enricher(fetcher).fetch_details("foo_bar").await.unwrap();
        assert_eq!(details.short_description, "Great game");
        assert_eq!(details.description, "Great game");
    }
}
