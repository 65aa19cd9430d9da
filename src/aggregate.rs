//! Concurrent fan-out/fan-in over every registered source.
//!
//! Every source task is spawned up front, so a slow or hung source never
//! holds back the start of a sibling. A task's failure, timeout or panic is
//! contained at the task boundary and only removes that source from the
//! result; siblings are never cancelled. The result map is built by the
//! orchestrating future after every task has settled.

use crate::feed::{
    build_client, dedup_sources, fetch_one, normalize, DecodedFeed, FetchError, FetchSettings,
    NormalizedNewsItem, Source, SourceError,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_LIMIT: usize = 5;

/// Source name → normalized items in feed order.
///
/// Sorted by source name. A missing key means the source failed outright;
/// an empty list means it succeeded with nothing to report.
pub type AggregationResult = BTreeMap<String, Vec<NormalizedNewsItem>>;

/// Configuration errors. Upstream flakiness never produces one of these.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    InvalidSource(#[from] SourceError),

    #[error("Timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Concurrency limit must be greater than zero")]
    ZeroConcurrency,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Per-source item quota.
///
/// Deserializes from either a bare integer (`limits = 5`) or a table
/// (`[limits] Hindu = 8`). Negative values fail deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quota {
    Uniform(usize),
    PerSource(BTreeMap<String, usize>),
}

impl Default for Quota {
    fn default() -> Self {
        Quota::Uniform(DEFAULT_LIMIT)
    }
}

impl Quota {
    /// Effective limit for `name`. Sources missing from a per-source map get
    /// `default_limit`.
    pub fn resolve(&self, name: &str, default_limit: usize) -> usize {
        match self {
            Quota::Uniform(limit) => *limit,
            Quota::PerSource(limits) => limits.get(name).copied().unwrap_or(default_limit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub default_limit: usize,
    /// Optional cap on simultaneous fetches. `None` (the default) runs every
    /// source at once; with a cap, a source waits for a free slot before its
    /// timeout starts.
    pub max_concurrent: Option<usize>,
    pub fetch: FetchSettings,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_concurrent: None,
            fetch: FetchSettings::default(),
        }
    }
}

/// Settled outcome of one source task.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_name: String,
    pub result: Result<DecodedFeed, FetchError>,
}

pub struct Aggregator {
    client: reqwest::Client,
    sources: Vec<Source>,
    quota: Quota,
    options: AggregateOptions,
}

impl Aggregator {
    /// Validates the configuration and builds the shared HTTP client.
    ///
    /// Duplicate source names collapse with the last URL winning.
    ///
    /// # Errors
    ///
    /// Fails fast on a blank name or non-HTTP(S) URL, a zero timeout or
    /// concurrency cap, or an HTTP client that cannot be built. Quota
    /// entries naming unregistered sources are logged and ignored.
    pub fn new(
        sources: Vec<Source>,
        quota: Quota,
        options: AggregateOptions,
    ) -> Result<Self, AggregateError> {
        if options.fetch.timeout.is_zero() {
            return Err(AggregateError::ZeroTimeout);
        }
        if options.max_concurrent == Some(0) {
            return Err(AggregateError::ZeroConcurrency);
        }

        let sources = dedup_sources(sources);
        for source in &sources {
            source.validate()?;
        }

        if let Quota::PerSource(limits) = &quota {
            for unknown in limits
                .keys()
                .filter(|name| !sources.iter().any(|s| &s.name == *name))
            {
                tracing::warn!(source = %unknown, "Quota names an unregistered source, ignoring");
            }
        }

        crate::tls::init_tls_policy(options.fetch.verify_ssl);
        let client = build_client(&options.fetch).map_err(AggregateError::Client)?;

        Ok(Self {
            client,
            sources,
            quota,
            options,
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn resolved_limit(&self, name: &str) -> usize {
        self.quota.resolve(name, self.options.default_limit)
    }

    /// Fetches and decodes every source, waiting for all of them to settle.
    ///
    /// All tasks are spawned before any is awaited. Results arrive in
    /// completion order, not registry order.
    pub async fn fetch_all(&self) -> Vec<SourceOutcome> {
        let slots = self
            .options
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n)));

        let tasks: FuturesUnordered<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let client = self.client.clone();
                let settings = self.options.fetch.clone();
                let slots = slots.clone();
                let source_name = source.name.clone();

                let handle = tokio::spawn(async move {
                    let _slot = match slots {
                        Some(slots) => Some(
                            slots
                                .acquire_owned()
                                .await
                                .map_err(|e| FetchError::TaskFailed(e.to_string()))?,
                        ),
                        None => None,
                    };
                    fetch_one(&client, &source, &settings).await
                });
                settle(source_name, handle)
            })
            .collect();

        tasks.collect().await
    }

    /// Runs one aggregation pass. Never fails: sources that could not be
    /// fetched are absent, and if every source fails the map is empty.
    pub async fn aggregate(&self) -> AggregationResult {
        let outcomes = self.fetch_all().await;
        self.fan_in(outcomes)
    }

    /// Normalizes every successful outcome with its resolved limit.
    fn fan_in(&self, outcomes: Vec<SourceOutcome>) -> AggregationResult {
        let mut news = AggregationResult::new();
        let mut failed = 0usize;

        for outcome in outcomes {
            match outcome.result {
                Ok(feed) => {
                    let limit = self.resolved_limit(&outcome.source_name);
                    let items = normalize(&feed.entries, limit);
                    tracing::info!(
                        source = %outcome.source_name,
                        items = items.len(),
                        limit = limit,
                        "Retrieved items"
                    );
                    news.insert(outcome.source_name, items);
                }
                Err(_) => failed += 1,
            }
        }

        tracing::info!(
            succeeded = news.len(),
            failed = failed,
            "Aggregation complete"
        );
        news
    }
}

/// Waits for one spawned source task, turning a panic or cancellation into
/// that source's failure.
async fn settle(
    source_name: String,
    handle: JoinHandle<Result<DecodedFeed, FetchError>>,
) -> SourceOutcome {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(source = %source_name, error = %e, "Source task aborted");
            Err(FetchError::TaskFailed(e.to_string()))
        }
    };

    SourceOutcome {
        source_name,
        result,
    }
}

/// One-shot aggregation over `sources`.
///
/// # Errors
///
/// Only configuration errors; see [`Aggregator::new`].
pub async fn aggregate(
    sources: Vec<Source>,
    quota: Quota,
    default_limit: usize,
    timeout: Duration,
    verify_ssl: bool,
) -> Result<AggregationResult, AggregateError> {
    let options = AggregateOptions {
        default_limit,
        fetch: FetchSettings {
            timeout,
            verify_ssl,
            ..FetchSettings::default()
        },
        ..AggregateOptions::default()
    };
    let aggregator = Aggregator::new(sources, quota, options)?;
    Ok(aggregator.aggregate().await)
}
