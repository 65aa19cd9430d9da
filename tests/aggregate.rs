//! End-to-end aggregation tests against local mock feeds.
//!
//! Each test starts its own wiremock server and mounts one route per source,
//! so sources are independent and can be slowed, broken or removed
//! individually.

use newsroll::feed::{FetchSettings, Source};
use newsroll::{aggregate, AggregateOptions, Aggregator, Quota};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss_with_items(n: usize) -> String {
    let items: String = (1..=n)
        .map(|i| {
            format!(
                "<item><title>Item {i}</title><description>Summary {i}</description><link>https://example.com/{i}</link></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Mock</title>{items}</channel></rss>"#)
}

async fn mount_feed(server: &MockServer, route: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/rss+xml")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

fn source(server: &MockServer, name: &str, route: &str) -> Source {
    Source::new(name, format!("{}{}", server.uri(), route))
}

fn options(timeout: Duration, default_limit: usize) -> AggregateOptions {
    AggregateOptions {
        default_limit,
        fetch: FetchSettings {
            timeout,
            ..FetchSettings::default()
        },
        ..AggregateOptions::default()
    }
}

// ============================================================================
// Quota
// ============================================================================

#[tokio::test]
async fn test_per_source_quota_with_default() {
    let server = MockServer::start().await;
    mount_feed(&server, "/a", rss_with_items(5), Duration::ZERO).await;
    mount_feed(&server, "/b", rss_with_items(5), Duration::ZERO).await;

    let sources = vec![source(&server, "A", "/a"), source(&server, "B", "/b")];
    let quota = Quota::PerSource(BTreeMap::from([("A".to_string(), 3)]));

    let result = aggregate(sources, quota, 1, Duration::from_secs(5), false)
        .await
        .unwrap();

    assert_eq!(result["A"].len(), 3);
    assert_eq!(result["B"].len(), 1);
    assert_eq!(result["A"][0].title.as_deref(), Some("Item 1"));
    assert_eq!(result["A"][0].summary.as_deref(), Some("Summary 1"));
    assert_eq!(result["A"][2].link.as_deref(), Some("https://example.com/3"));
}

#[tokio::test]
async fn test_uniform_quota_larger_than_feed() {
    let server = MockServer::start().await;
    mount_feed(&server, "/a", rss_with_items(2), Duration::ZERO).await;

    let result = aggregate(
        vec![source(&server, "A", "/a")],
        Quota::Uniform(10),
        1,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    assert_eq!(result["A"].len(), 2);
}

#[tokio::test]
async fn test_zero_quota_is_present_but_empty() {
    let server = MockServer::start().await;
    mount_feed(&server, "/a", rss_with_items(3), Duration::ZERO).await;

    let result = aggregate(
        vec![source(&server, "A", "/a")],
        Quota::Uniform(0),
        5,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    assert!(result.contains_key("A"));
    assert!(result["A"].is_empty());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_timeout_isolated_from_siblings() {
    let server = MockServer::start().await;
    mount_feed(&server, "/fast1", rss_with_items(2), Duration::ZERO).await;
    mount_feed(&server, "/slow", rss_with_items(2), Duration::from_secs(10)).await;
    mount_feed(&server, "/fast2", rss_with_items(2), Duration::from_millis(100)).await;

    let sources = vec![
        source(&server, "Fast1", "/fast1"),
        source(&server, "Slow", "/slow"),
        source(&server, "Fast2", "/fast2"),
    ];
    let aggregator =
        Aggregator::new(sources, Quota::Uniform(5), options(Duration::from_secs(1), 5)).unwrap();

    let start = Instant::now();
    let result = aggregator.aggregate().await;
    let elapsed = start.elapsed();

    assert!(!result.contains_key("Slow"));
    assert_eq!(result["Fast1"].len(), 2);
    assert_eq!(result["Fast2"].len(), 2);
    // Bounded by the slow source's timeout, not its full delay
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_sources_fetched_concurrently() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(500);
    for route in ["/a", "/b", "/c", "/d"] {
        mount_feed(&server, route, rss_with_items(1), delay).await;
    }

    let sources = vec![
        source(&server, "A", "/a"),
        source(&server, "B", "/b"),
        source(&server, "C", "/c"),
        source(&server, "D", "/d"),
    ];
    let aggregator =
        Aggregator::new(sources, Quota::Uniform(5), options(Duration::from_secs(5), 5)).unwrap();

    let start = Instant::now();
    let result = aggregator.aggregate().await;
    let elapsed = start.elapsed();

    assert_eq!(result.len(), 4);
    // Sequential fetching would take at least 2s
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_many_slow_sources_do_not_hold_back_fast_one() {
    let server = MockServer::start().await;
    mount_feed(&server, "/slow", rss_with_items(1), Duration::from_secs(5)).await;
    mount_feed(&server, "/fast", rss_with_items(1), Duration::ZERO).await;

    let mut sources: Vec<Source> = (0..20)
        .map(|i| source(&server, &format!("Slow{i:02}"), "/slow"))
        .collect();
    sources.push(source(&server, "ZFast", "/fast"));

    let start = Instant::now();
    let result = aggregate(sources, Quota::Uniform(5), 5, Duration::from_secs(1), false)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["ZFast"]);
    // One timeout's worth, not one per batch of slow sources
    assert!(elapsed < Duration::from_millis(1800), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_bad_status_and_malformed_sources_absent() {
    let server = MockServer::start().await;
    mount_feed(&server, "/good", rss_with_items(3), Duration::ZERO).await;
    mount_feed(&server, "/garbage", "<not valid xml".to_string(), Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sources = vec![
        source(&server, "Good", "/good"),
        source(&server, "Garbage", "/garbage"),
        source(&server, "Missing", "/missing"),
    ];
    let result = aggregate(sources, Quota::Uniform(5), 5, Duration::from_secs(5), false)
        .await
        .unwrap();

    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["Good"]);
}

#[tokio::test]
async fn test_all_sources_fail_yields_empty_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sources = vec![
        source(&server, "A", "/a"),
        source(&server, "B", "/b"),
        // Nothing listens on the TCP port 1 of loopback
        Source::new("Closed", "http://127.0.0.1:1/rss"),
    ];
    let result = aggregate(sources, Quota::Uniform(5), 5, Duration::from_secs(5), false)
        .await
        .unwrap();

    assert!(result.is_empty());
}

// ============================================================================
// Tolerant decoding and normalization
// ============================================================================

#[tokio::test]
async fn test_partially_parseable_feed_contributes_entries() {
    let broken = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>One</title><description>First</description></item>
    <item><title>Two</title></item>
    <item><title>Three</broken></item>
</channel></rss>"#;

    let server = MockServer::start().await;
    mount_feed(&server, "/broken", broken.to_string(), Duration::ZERO).await;

    let result = aggregate(
        vec![source(&server, "Broken", "/broken")],
        Quota::Uniform(5),
        5,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    let items = &result["Broken"];
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].summary.as_deref(), Some("First"));
    // Title doubles as summary when nothing else is available
    assert_eq!(items[1].summary.as_deref(), Some("Two"));
}

#[tokio::test]
async fn test_quota_for_unregistered_source_is_ignored() {
    let server = MockServer::start().await;
    mount_feed(&server, "/a", rss_with_items(4), Duration::ZERO).await;

    let quota = Quota::PerSource(BTreeMap::from([
        ("A".to_string(), 2),
        ("Hindu".to_string(), 8),
    ]));
    let result = aggregate(
        vec![source(&server, "A", "/a")],
        quota,
        1,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    assert_eq!(result["A"].len(), 2);
}

#[tokio::test]
async fn test_empty_entries_dropped_but_counted() {
    let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Mixed</title>
    <item><link>https://example.com/no-text</link></item>
    <item><description>Description only</description></item>
    <item><title>Third</title></item>
</channel></rss>"#;

    let server = MockServer::start().await;
    mount_feed(&server, "/mixed", feed.to_string(), Duration::ZERO).await;

    let result = aggregate(
        vec![source(&server, "Mixed", "/mixed")],
        Quota::Uniform(2),
        5,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    let items = &result["Mixed"];
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, None);
    assert_eq!(items[0].summary.as_deref(), Some("Description only"));
}

#[tokio::test]
async fn test_well_formed_empty_feed_is_present() {
    let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Quiet</title></channel></rss>"#;

    let server = MockServer::start().await;
    mount_feed(&server, "/quiet", empty.to_string(), Duration::ZERO).await;

    let result = aggregate(
        vec![source(&server, "Quiet", "/quiet")],
        Quota::Uniform(5),
        5,
        Duration::from_secs(5),
        false,
    )
    .await
    .unwrap();

    assert_eq!(result.get("Quiet").map(Vec::len), Some(0));
}
