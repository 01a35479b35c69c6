use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::fetch::{self, RetryPolicy};
use super::SourceConnector;
use crate::common::error::SourceError;
use crate::config::RetrySettings;
use crate::domain::RawListing;
use crate::registry::{ConnectorSpec, HtmlSelectors, SourceConfig};

/// Direct-HTTP connector: fetches a listings page and lifts raw events
/// out of it with the CSS selectors declared in the source's registry
/// document. All parsing stays behind this type.
pub struct HtmlConnector {
    config: SourceConfig,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HtmlConnector {
    pub fn new(config: SourceConfig, retry: RetrySettings) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            policy: retry.into(),
        }
    }

    fn spec(&self) -> Result<(&str, &HtmlSelectors), SourceError> {
        match &self.config.connector {
            ConnectorSpec::Html { endpoint, selectors } => Ok((endpoint, selectors)),
            _ => Err(SourceError::MalformedPayload(
                "html connector built from non-html registry document".to_string(),
            )),
        }
    }

    fn parse_listings(&self, html: &str, selectors: &HtmlSelectors, page_url: &str) -> Result<Vec<RawListing>, SourceError> {
        let document = Html::parse_document(html);
        let listing_sel = parse_selector(&selectors.listing)?;
        let title_sel = parse_selector(&selectors.title)?;
        let date_sel = selectors.date.as_deref().map(parse_selector).transpose()?;
        let time_sel = selectors.time.as_deref().map(parse_selector).transpose()?;
        let location_sel = selectors.location.as_deref().map(parse_selector).transpose()?;
        let description_sel = selectors
            .description
            .as_deref()
            .map(parse_selector)
            .transpose()?;
        let link_sel = selectors.link.as_deref().map(parse_selector).transpose()?;

        let mut listings = Vec::new();
        for element in document.select(&listing_sel) {
            let Some(title) = select_text(&element, &title_sel) else {
                debug!(source_id = %self.config.source_id, "listing element without title, skipping");
                continue;
            };

            let raw_date = date_sel
                .as_ref()
                .and_then(|s| select_text(&element, s))
                .unwrap_or_default();
            let raw_time = time_sel.as_ref().and_then(|s| select_text(&element, s));
            let raw_location = location_sel
                .as_ref()
                .and_then(|s| select_text(&element, s))
                .unwrap_or_default();
            let description = description_sel
                .as_ref()
                .and_then(|s| select_text(&element, s));
            let url = link_sel
                .as_ref()
                .and_then(|s| element.select(s).next())
                .and_then(|a| a.value().attr("href"))
                .map(|href| absolutize(page_url, href));

            listings.push(RawListing {
                source_id: self.config.source_id.clone(),
                external_id: None,
                title,
                raw_date,
                raw_time,
                raw_location,
                description,
                url,
            });
        }

        if listings.is_empty() {
            return Err(SourceError::MalformedPayload(format!(
                "no listings matched selector '{}' on {}",
                selectors.listing, page_url
            )));
        }
        Ok(listings)
    }
}

#[async_trait::async_trait]
impl SourceConnector for HtmlConnector {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    #[instrument(skip(self), fields(source_id = %self.config.source_id))]
    async fn fetch(&self) -> Result<Vec<RawListing>, SourceError> {
        let (endpoint, _) = self.spec()?;
        let endpoint = endpoint.to_string();
        let headers = fetch::request_headers(&self.config.headers);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let payload =
            fetch::fetch_bytes(&self.client, &endpoint, &headers, timeout, &self.policy).await?;
        let html = String::from_utf8_lossy(&payload).into_owned();

        let (_, selectors) = self.spec()?;
        let listings = self.parse_listings(&html, selectors, &endpoint)?;
        info!(
            "fetched {} listings from {}",
            listings.len(),
            self.config.source_id
        );
        Ok(listings)
    }
}

fn parse_selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css)
        .map_err(|e| SourceError::MalformedPayload(format!("bad selector '{css}': {e:?}")))
}

/// Text of the first element matched inside `scope`, whitespace-collapsed.
fn select_text(scope: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().and_then(|el| {
        let text = el
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

/// Resolve relative hrefs against the page origin. Keeps it simple:
/// absolute URLs pass through, rooted paths join the origin.
fn absolutize(page_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let origin = page_url
        .find("://")
        .and_then(|scheme_end| {
            page_url[scheme_end + 3..]
                .find('/')
                .map(|path_start| &page_url[..scheme_end + 3 + path_start])
        })
        .unwrap_or(page_url);
    if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{}/{}", page_url.trim_end_matches('/'), href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config(selectors: HtmlSelectors) -> SourceConfig {
        SourceConfig {
            source_id: "test-html".to_string(),
            enabled: true,
            default_country: "IT".to_string(),
            timeout_secs: 5,
            headers: HashMap::new(),
            connector: ConnectorSpec::Html {
                endpoint: "https://example.org/events".to_string(),
                selectors,
            },
        }
    }

    fn default_selectors() -> HtmlSelectors {
        HtmlSelectors {
            listing: ".event".to_string(),
            title: ".title".to_string(),
            date: Some(".date".to_string()),
            time: Some(".time".to_string()),
            location: Some(".place".to_string()),
            description: Some(".desc".to_string()),
            link: Some("a".to_string()),
        }
    }

    #[test]
    fn parses_listing_elements() {
        let connector = HtmlConnector::new(test_config(default_selectors()), Default::default());
        let html = r#"
            <div class="event">
              <span class="title">Climate   March</span>
              <span class="date">Today</span>
              <span class="time">3:00 PM</span>
              <span class="place">Rome</span>
              <a href="/events/42">details</a>
            </div>
            <div class="event">
              <span class="title">General Strike</span>
              <span class="date">2025-06-02</span>
              <span class="place">Milan, Lombardy</span>
            </div>
        "#;
        let selectors = default_selectors();
        let listings = connector
            .parse_listings(html, &selectors, "https://example.org/events")
            .unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "Climate March");
        assert_eq!(listings[0].raw_date, "Today");
        assert_eq!(listings[0].raw_time.as_deref(), Some("3:00 PM"));
        assert_eq!(listings[0].url.as_deref(), Some("https://example.org/events/42"));
        assert_eq!(listings[1].raw_time, None);
        assert_eq!(listings[1].raw_location, "Milan, Lombardy");
    }

    #[test]
    fn titleless_elements_are_skipped() {
        let connector = HtmlConnector::new(test_config(default_selectors()), Default::default());
        let html = r#"
            <div class="event"><span class="date">Today</span></div>
            <div class="event"><span class="title">Vigil for Peace</span></div>
        "#;
        let selectors = default_selectors();
        let listings = connector
            .parse_listings(html, &selectors, "https://example.org/events")
            .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Vigil for Peace");
    }

    #[test]
    fn page_with_no_matches_is_malformed() {
        let connector = HtmlConnector::new(test_config(default_selectors()), Default::default());
        let selectors = default_selectors();
        let err = connector
            .parse_listings("<html><body>maintenance</body></html>", &selectors, "https://example.org/events")
            .unwrap_err();
        assert!(matches!(err, SourceError::MalformedPayload(_)));
    }
}
