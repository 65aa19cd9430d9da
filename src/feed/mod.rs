//! Feed sources, fetching, decoding and normalization.
//!
//! The pipeline for one source, in order:
//!
//! - [`registry`] - which sources exist (`name → url`)
//! - [`fetcher`] - one HTTP GET with timeout, status and size checks
//! - [`parser`] - tolerant RSS/Atom decode into [`RawEntry`] maps
//! - [`normalize`] - `RawEntry → NormalizedNewsItem` under a visit limit
//!
//! [`opml`] loads a registry from an OPML subscription list.
//!
//! # Example
//!
//! ```ignore
//! use newsroll::feed::{build_client, fetch_one, normalize, FetchSettings, Source};
//!
//! let settings = FetchSettings::default();
//! let client = build_client(&settings)?;
//! let feed = fetch_one(&client, &Source::new("UN", url), &settings).await?;
//! let items = normalize(&feed.entries, 5);
//! ```

pub mod fetcher;
pub mod normalize;
pub mod opml;
pub mod parser;
pub mod registry;

pub use fetcher::{
    build_client, fetch, fetch_one, FailureKind, FetchError, FetchSettings, RawFeedPayload,
};
pub use normalize::{normalize, summaries, NormalizedNewsItem};
pub use opml::{load_sources, OpmlError};
pub use parser::{channel_elements, decode, decode_offloaded, DecodedFeed, RawEntry};
pub use registry::{default_sources, dedup_sources, sources_from_map, Source, SourceError};
