use crate::feed::fetcher::{FetchError, RawFeedPayload};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

/// One upstream entry as an opaque field map.
///
/// Field names follow the upstream element names (`title`, `link`,
/// `description`, `pubDate`, ...). Only `title`, `summary`, `description`
/// and `link` are read by normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    fields: BTreeMap<String, String>,
}

impl RawEntry {
    /// Returns the trimmed value of `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn append(&mut self, key: &str, text: &str) {
        self.fields.entry(key.to_string()).or_default().push_str(text);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawEntry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A decoded feed: channel title plus entries in upstream order.
///
/// `well_formed == false` marks a tolerant parse. Such a feed is still
/// usable when `entries` is non-empty.
#[derive(Debug, Clone)]
pub struct DecodedFeed {
    pub source_name: String,
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
    pub well_formed: bool,
}

/// Decodes raw feed bytes. Never fails.
///
/// The payload is first checked for XML well-formedness, then handed to the
/// strict RSS/Atom parser. When either step rejects it, a lenient scan keeps
/// every `<item>`/`<entry>` closed before the first XML error and reports
/// `well_formed: false`.
pub fn decode(source_name: &str, bytes: &[u8]) -> DecodedFeed {
    let strict = check_well_formed(bytes)
        .and_then(|()| strict_parser().parse(bytes).map_err(|e| e.to_string()));

    match strict {
        Ok(feed) => DecodedFeed {
            source_name: source_name.to_string(),
            title: feed.title.map(|t| t.content),
            entries: feed.entries.into_iter().map(entry_fields).collect(),
            well_formed: true,
        },
        Err(reason) => {
            let (title, entries) = scan_lenient(bytes);
            tracing::debug!(
                source = %source_name,
                error = %reason,
                recovered = entries.len(),
                "Strict parse failed, using lenient scan"
            );
            DecodedFeed {
                source_name: source_name.to_string(),
                title,
                entries,
                well_formed: false,
            }
        }
    }
}

/// Runs [`decode`] on the blocking pool so parse work never stalls other
/// sources' network waits.
pub async fn decode_offloaded(payload: RawFeedPayload) -> Result<DecodedFeed, FetchError> {
    tokio::task::spawn_blocking(move || decode(&payload.source_name, &payload.bytes))
        .await
        .map_err(|e| FetchError::TaskFailed(e.to_string()))
}

/// Keys present on the first entry of a feed.
pub fn channel_elements(feed: &DecodedFeed) -> Vec<&str> {
    feed.entries
        .first()
        .map(|entry| entry.keys().collect())
        .unwrap_or_default()
}

// Entries without an upstream guid/id keep an empty id instead of a
// generated one.
fn strict_parser() -> feed_rs::parser::Parser {
    feed_rs::parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
}

/// Full pass over the document with end-name checking on.
///
/// Rejects mismatched or dangling end tags, elements left open at EOF, and
/// anything other than exactly one root element.
fn check_well_formed(bytes: &[u8]) -> Result<(), String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().check_end_names = true;

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) if depth == 0 => roots += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("{} at byte {}", e, reader.error_position())),
        }
        buf.clear();
    }

    match (depth, roots) {
        (0, 1) => Ok(()),
        (0, n) => Err(format!("expected one root element, found {}", n)),
        (open, _) => Err(format!("{} element(s) left open at end of input", open)),
    }
}

fn entry_fields(entry: feed_rs::model::Entry) -> RawEntry {
    let mut raw = RawEntry::default();

    if !entry.id.is_empty() {
        raw.insert("id", entry.id);
    }
    if let Some(title) = entry.title {
        raw.insert("title", title.content);
    }
    // feed-rs folds RSS <description> into `summary`
    if let Some(summary) = entry.summary {
        raw.insert("summary", summary.content);
    }
    if let Some(body) = entry.content.and_then(|c| c.body) {
        raw.insert("description", body);
    }
    if let Some(link) = entry.links.into_iter().next() {
        raw.insert("link", link.href);
    }
    if let Some(published) = entry.published {
        raw.insert("published", published.to_rfc3339());
    }
    if let Some(updated) = entry.updated {
        raw.insert("updated", updated.to_rfc3339());
    }
    if let Some(author) = entry.authors.into_iter().next() {
        raw.insert("author", author.name);
    }

    raw
}

fn is_entry_tag(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

/// Field name for a direct child of an entry, keyed by qualified name so
/// that `media:title` never collides with `title`.
fn field_key(qualified_name: &[u8]) -> String {
    match qualified_name {
        // content:encoded and Atom <content> are both long-form bodies
        b"content:encoded" | b"content" => "description".to_string(),
        other => String::from_utf8_lossy(other).into_owned(),
    }
}

fn href_attr(e: &BytesStart<'_>, decoder: Decoder) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"href")
        .and_then(|attr| attr.decode_and_unescape_value(decoder).ok())
        .map(|v| v.into_owned())
}

/// Best-effort scan of a payload the strict parser rejected.
///
/// Only direct children of an entry become fields, and a repeated child
/// keeps its first value.
fn scan_lenient(bytes: &[u8]) -> (Option<String>, Vec<RawEntry>) {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut title: Option<String> = None;
    let mut in_channel_title = false;

    // Open entry, element depth below it, and the child being captured
    let mut current: Option<RawEntry> = None;
    let mut depth = 0usize;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if let Some(entry) = current.as_mut() {
                    depth += 1;
                    if depth == 1 {
                        let key = field_key(e.name().as_ref());
                        if key == "link" && !entry.fields.contains_key("link") {
                            if let Some(href) = href_attr(&e, reader.decoder()) {
                                entry.insert("link", href);
                            }
                        }
                        field = (!entry.fields.contains_key(&key)).then_some(key);
                    }
                } else if is_entry_tag(e.local_name().as_ref()) {
                    current = Some(RawEntry::default());
                    depth = 0;
                    field = None;
                } else if e.local_name().as_ref() == b"title" && title.is_none() {
                    in_channel_title = true;
                }
            }
            Ok(Event::Empty(e)) => {
                // Atom links are self-closing: <link href="..."/>
                if let Some(entry) = current.as_mut() {
                    if depth == 0
                        && e.local_name().as_ref() == b"link"
                        && !entry.fields.contains_key("link")
                    {
                        if let Some(href) = href_attr(&e, reader.decoder()) {
                            entry.insert("link", href);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                let capture = if depth == 1 { field.as_deref() } else { None };
                push_text(&mut current, capture, &mut title, in_channel_title, &text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                let capture = if depth == 1 { field.as_deref() } else { None };
                push_text(&mut current, capture, &mut title, in_channel_title, &text);
            }
            Ok(Event::End(_)) => match current {
                Some(_) if depth == 0 => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                Some(_) => {
                    depth -= 1;
                    if depth == 0 {
                        field = None;
                    }
                }
                None => in_channel_title = false,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    position = reader.error_position(),
                    error = %e,
                    "Lenient scan stopped at XML error"
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    (title, entries)
}

fn push_text(
    current: &mut Option<RawEntry>,
    field: Option<&str>,
    title: &mut Option<String>,
    in_channel_title: bool,
    text: &str,
) {
    match (current.as_mut(), field) {
        (Some(entry), Some(key)) => entry.append(key, text),
        (None, _) if in_channel_title => title.get_or_insert_with(String::new).push_str(text),
        _ => {}
    }
}
