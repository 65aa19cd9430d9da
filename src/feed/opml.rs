use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use crate::feed::registry::Source;

/// Maximum allowed nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur while importing sources from OPML.
#[derive(Debug, Error)]
pub enum OpmlError {
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads an OPML subscription list and returns its feeds as sources.
///
/// The source name is the outline's `title`, falling back to `text`, then
/// to the feed URL itself. Outlines with unusable URLs are skipped with a
/// warning.
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations; custom entity
/// references fail to unescape and the attribute is rejected.
pub async fn load_sources(path: &Path) -> Result<Vec<Source>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml_content(&content)
}

/// Parses OPML content, collecting every `<outline>` with an `xmlUrl`
/// regardless of nesting. Folder outlines are traversed, not returned.
pub fn parse_opml_content(content: &str) -> Result<Vec<Source>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut sources = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }

                if let Some(source) = outline_source(&e, &reader)? {
                    sources.push(source);
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Some(source) = outline_source(&e, &reader)? {
                    sources.push(source);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(sources)
}

fn outline_source(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Option<Source>, OpmlError> {
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.into_owned())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(value()?),
            b"title" => title = Some(value()?),
            b"text" => text = Some(value()?),
            _ => {}
        }
    }

    let Some(url) = xml_url else {
        return Ok(None);
    };

    let name = title
        .or(text)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| url.clone());
    let source = Source::new(name, url);

    match source.validate() {
        Ok(_) => Ok(Some(source)),
        Err(e) => {
            tracing::warn!(url = %source.url, error = %e, "Skipping invalid feed URL");
            Ok(None)
        }
    }
}
