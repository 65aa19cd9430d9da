use crate::feed::parser::RawEntry;
use serde::{Deserialize, Serialize};

/// Placeholder used by [`summaries`] when an entry carries no text at all.
pub const NO_DESCRIPTION: &str = "No Description";

/// Uniform news record produced from any upstream entry shape.
///
/// At least one of `title` or `summary` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedNewsItem {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
}

/// Normalizes the first `limit` entries of a feed.
///
/// `limit` bounds the number of entries *visited*, not the number accepted:
/// an entry dropped for lacking both title and summary still uses up one
/// slot. The output therefore never exceeds `limit` and may be shorter.
///
/// Summary fallback chain: `summary`, then `description`, then `title`.
pub fn normalize(entries: &[RawEntry], limit: usize) -> Vec<NormalizedNewsItem> {
    entries
        .iter()
        .take(limit)
        .filter_map(normalize_entry)
        .collect()
}

fn normalize_entry(entry: &RawEntry) -> Option<NormalizedNewsItem> {
    let title = entry.get("title").map(str::to_string);
    let summary = entry
        .get("summary")
        .or_else(|| entry.get("description"))
        .map(str::to_string)
        .or_else(|| title.clone());

    if title.is_none() && summary.is_none() {
        return None;
    }

    Some(NormalizedNewsItem {
        title,
        summary,
        link: entry.get("link").map(str::to_string),
    })
}

/// Summary text of the first `limit` entries, one per visited entry.
pub fn summaries(entries: &[RawEntry], limit: usize) -> Vec<String> {
    entries
        .iter()
        .take(limit)
        .map(|entry| {
            entry
                .get("summary")
                .or_else(|| entry.get("description"))
                .or_else(|| entry.get("title"))
                .unwrap_or(NO_DESCRIPTION)
                .to_string()
        })
        .collect()
}
