//! Concurrent RSS/Atom news aggregation with per-source quotas.
//!
//! Every registered [`Source`](feed::Source) is fetched in its own task,
//! decoded tolerantly, normalized into
//! [`NormalizedNewsItem`](feed::NormalizedNewsItem)s and capped by a
//! [`Quota`](aggregate::Quota). One source failing never affects another.

pub mod aggregate;
pub mod config;
pub mod enrich;
pub mod feed;
pub mod snapshot;
pub mod tls;

pub use aggregate::{
    aggregate, AggregateError, AggregateOptions, AggregationResult, Aggregator, Quota,
};
pub use config::{Config, ConfigError};
pub use snapshot::{Snapshot, SnapshotStore};
