//! Boundary types for the natural-language enrichment stage.
//!
//! This crate does not call a language model. It renders the extraction
//! prompt for a [`NormalizedNewsItem`] and validates the model's JSON reply
//! into [`ParsedNews`], so any client can be plugged in between.

use crate::feed::NormalizedNewsItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Reply contains no JSON object")]
    NoJson,

    #[error("Reply does not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("Item has neither title nor summary")]
    EmptyItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Politics,
    Climate,
    Conflict,
    Economy,
    Health,
    Disaster,
    #[serde(alias = "diplomacy")]
    InternationalRelations,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::Politics,
        Topic::Climate,
        Topic::Conflict,
        Topic::Economy,
        Topic::Health,
        Topic::Disaster,
        Topic::InternationalRelations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Politics => "politics",
            Topic::Climate => "climate",
            Topic::Conflict => "conflict",
            Topic::Economy => "economy",
            Topic::Health => "health",
            Topic::Disaster => "disaster",
            Topic::InternationalRelations => "international_relations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Structured fields extracted from one headline and summary.
///
/// Unknown keys in the reply (e.g. `urgency`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNews {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub entities: Vec<String>,
    pub sentiment: Sentiment,
}

/// Prompt renderer and reply validator for the extraction stage.
#[derive(Debug, Clone, Default)]
pub struct NewsParser;

impl NewsParser {
    pub fn new() -> Self {
        Self
    }

    /// Renders the extraction prompt for one item.
    pub fn render_prompt(&self, item: &NormalizedNewsItem) -> Result<String, EnrichError> {
        if item.title.is_none() && item.summary.is_none() {
            return Err(EnrichError::EmptyItem);
        }

        let topics = Topic::ALL
            .iter()
            .map(Topic::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "Extract structured data from this news headline and summary.\n\
             \n\
             Headline: {title}\n\
             Summary: {summary}\n\
             \n\
             Fields:\n\
             - locations: countries, cities or regions mentioned\n\
             - topics: any of [{topics}]\n\
             - entities: organizations, people or companies mentioned\n\
             - sentiment: positive, neutral or negative\n\
             \n\
             Reply with a single JSON object and nothing else, for example:\n\
             {{\"locations\": [\"Nepal\"], \"topics\": [\"climate\"], \"entities\": [\"UNICEF\"], \"sentiment\": \"negative\"}}\n",
            title = item.title.as_deref().unwrap_or(""),
            summary = item.summary.as_deref().unwrap_or(""),
        ))
    }

    /// Validates a model reply. Surrounding prose or code fences are
    /// tolerated; the outermost `{...}` span is parsed.
    pub fn parse_reply(&self, reply: &str) -> Result<ParsedNews, EnrichError> {
        let start = reply.find('{').ok_or(EnrichError::NoJson)?;
        let end = reply.rfind('}').ok_or(EnrichError::NoJson)?;
        if end < start {
            return Err(EnrichError::NoJson);
        }
        Ok(serde_json::from_str(&reply[start..=end])?)
    }
}
