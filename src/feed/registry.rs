use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Errors raised when a registry entry cannot be used as a feed source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source names are the keys of the aggregation result and must not be blank.
    #[error("Source name must not be empty")]
    EmptyName,
    /// The URL string could not be parsed.
    #[error("Invalid URL for source {name}: {source}")]
    InvalidUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme for source {name}: {scheme} (only http/https allowed)")]
    UnsupportedScheme { name: String, scheme: String },
}

/// One named upstream feed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Checks that the source has a usable name and an HTTP(S) URL.
    pub fn validate(&self) -> Result<Url, SourceError> {
        if self.name.trim().is_empty() {
            return Err(SourceError::EmptyName);
        }

        let url = Url::parse(&self.url).map_err(|source| SourceError::InvalidUrl {
            name: self.name.clone(),
            source,
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(SourceError::UnsupportedScheme {
                name: self.name.clone(),
                scheme: scheme.to_owned(),
            }),
        }
    }
}

/// Built-in feeds used when no `[sources]` table or OPML file is supplied.
const DEFAULT_FEEDS: &[(&str, &str)] = &[
    (
        "Hindu",
        "https://www.thehindu.com/news/national/feeder/default.rss",
    ),
    (
        "TOI",
        "https://timesofindia.indiatimes.com/rssfeeds/-2128936835.cms",
    ),
    ("Mint", "https://www.livemint.com/rss/politics"),
    (
        "IndianExpress",
        "https://indianexpress.com/section/explained/explained-economics/feed/",
    ),
    (
        "ZeeNews",
        "https://zeenews.india.com/rss/india-national-news.xml",
    ),
    (
        "UN_APAC",
        "https://news.un.org/feed/subscribe/en/news/region/asia-pacific/feed/rss.xml",
    ),
    (
        "CNBC_Asia",
        "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=19832390",
    ),
];

pub fn default_sources() -> Vec<Source> {
    DEFAULT_FEEDS
        .iter()
        .map(|(name, url)| Source::new(*name, *url))
        .collect()
}

/// Builds the source list from a `name → url` table.
///
/// Keys are unique by construction; when the same name is inserted twice
/// upstream of this call the last write wins.
pub fn sources_from_map(map: &BTreeMap<String, String>) -> Vec<Source> {
    map.iter()
        .map(|(name, url)| Source::new(name.as_str(), url.as_str()))
        .collect()
}

/// Collapses duplicate names, keeping the last URL seen for each name while
/// preserving first-seen order.
pub fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::with_capacity(sources.len());
    for source in sources {
        match out.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => {
                tracing::debug!(source = %source.name, "Duplicate source name, last URL wins");
                existing.url = source.url;
            }
            None => out.push(source),
        }
    }
    out
}
