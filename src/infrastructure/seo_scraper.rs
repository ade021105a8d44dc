//! SEO metadata scraper
//!
//! Extracts title/description metadata from a rendered page's head markup.
//! Strictly best-effort: any fetch or parse failure is swallowed and logged,
//! returning `None` so product sync carries on without enrichment.

use scraper::{Html, Selector};

use crate::infrastructure::http_client::HttpClient;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeoMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl SeoMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

pub struct SeoScraper {
    http: HttpClient,
}

impl SeoScraper {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch a page and extract head metadata. Never fails; every error path
    /// logs and yields `None`.
    pub async fn fetch(&self, url: &str) -> Option<SeoMetadata> {
        let html = match self.http.get_text(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!("SEO scrape failed for {}: {:#}", url, e);
                return None;
            }
        };
        let metadata = parse_head(&html);
        if metadata.is_empty() {
            tracing::debug!("No SEO metadata found in {}", url);
            None
        } else {
            Some(metadata)
        }
    }
}

/// Pulls `<title>`, `meta[name=description]`, and OpenGraph equivalents out
/// of head markup. OpenGraph values win over the plain tags when both exist.
pub fn parse_head(html: &str) -> SeoMetadata {
    let document = Html::parse_document(html);

    let select_content = |css: &str| -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let title_tag = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    });

    let title = select_content(r#"meta[property="og:title"]"#).or(title_tag);
    let description = select_content(r#"meta[property="og:description"]"#)
        .or_else(|| select_content(r#"meta[name="description"]"#));

    SeoMetadata { title, description }
}
