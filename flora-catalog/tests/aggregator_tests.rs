//! Multi-source search and lookup behavior against scripted sources

mod helpers;

use flora_catalog::{
    CatalogError, FetchError, KeyValueStore, Kingdom, MemoryStore, SearchOptions, Served, SourceId,
    SourceToggles,
};
use helpers::{fast_config, raw_record, test_catalog, test_catalog_with, Behavior, MockSource, DAY};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const A: SourceId = SourceId::PrimarySpecies;
const B: SourceId = SourceId::CommunityTaxonomy;
const C: SourceId = SourceId::Toxicity;

fn roses(source: SourceId) -> Vec<serde_json::Value> {
    vec![
        raw_record(source, 1, "Dog rose", "Rosa canina"),
        raw_record(source, 2, "Rugosa rose", "Rosa rugosa"),
    ]
}

#[tokio::test]
async fn test_partial_failure_isolation() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let b = Arc::new(MockSource::new(B, roses(B)));
    let c = Arc::new(MockSource::unreachable(C));
    let t = test_catalog(&[a.clone(), b.clone(), c.clone()]);

    let results = t.catalog.search("rose", &SearchOptions::default()).await;

    assert_eq!(results.records(A).len(), 2);
    assert_eq!(results.records(B).len(), 2);
    assert!(results.records(C).is_empty());

    let failed = results.get(C).unwrap();
    assert_eq!(failed.served, Served::Failed);
    assert!(failed.notice.is_some());
    assert_eq!(results.sources(), vec![A, B, C]);
}

#[tokio::test]
async fn test_all_sources_failing_is_an_empty_result_not_an_error() {
    let a = Arc::new(MockSource::unreachable(A));
    let c = Arc::new(MockSource::failing(C, FetchError::rate_limited(C)));
    let t = test_catalog(&[a, c]);

    let results = t.catalog.search("rose", &SearchOptions::default()).await;
    assert!(results.is_empty());
    assert_eq!(results.notices().len(), 2);
}

#[tokio::test]
async fn test_disabled_source_is_never_called() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let b = Arc::new(MockSource::new(B, roses(B)));
    let t = test_catalog(&[a.clone(), b.clone()]);

    let toggles = SourceToggles::new([(A, false), (B, true)]);
    let results = t
        .catalog
        .search_with("rose", &toggles, &SearchOptions::default())
        .await;

    assert_eq!(a.list_calls(), 0);
    assert_eq!(b.list_calls(), 1);
    assert!(results.get(A).is_none());
    assert_eq!(results.records(B).len(), 2);
}

#[tokio::test]
async fn test_retry_bound() {
    let mut config = fast_config();
    for settings in &mut config.sources {
        settings.max_attempts = 2;
    }
    let a = Arc::new(MockSource::failing(
        A,
        FetchError::RequestFailed {
            source_id: A,
            status: 503,
        },
    ));
    let t = test_catalog_with(config, &[a.clone()], Arc::new(MemoryStore::new()));

    let results = t.catalog.search("rose", &SearchOptions::default()).await;

    assert_eq!(a.list_calls(), 2);
    assert_eq!(results.get(A).unwrap().served, Served::Failed);
}

#[tokio::test]
async fn test_cache_hit_short_circuits_the_source() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog(&[a.clone()]);

    let first = t.catalog.search("rose", &SearchOptions::default()).await;
    let second = t.catalog.search("Rose ", &SearchOptions::default()).await;

    assert_eq!(a.list_calls(), 1);
    assert_eq!(first.get(A).unwrap().served, Served::Network);
    assert_eq!(second.get(A).unwrap().served, Served::Cache);
    assert_eq!(first.records(A), second.records(A));

    // Different page is a different key
    t.catalog
        .search("rose", &SearchOptions { page: 2, kingdom: None })
        .await;
    assert_eq!(a.list_calls(), 2);

    // Expired entries are refetched
    t.clock.advance(DAY + Duration::from_millis(1));
    t.catalog.search("rose", &SearchOptions::default()).await;
    assert_eq!(a.list_calls(), 3);
}

#[tokio::test]
async fn test_rate_limited_list_falls_back_to_stale_cache() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog(&[a.clone()]);

    t.catalog.search("rose", &SearchOptions::default()).await;
    t.clock.advance(DAY * 2);
    a.set_behavior(Behavior::Fail(FetchError::rate_limited(A)));

    let results = t.catalog.search("rose", &SearchOptions::default()).await;
    let served = results.get(A).unwrap();

    assert_eq!(a.list_calls(), 2);
    assert_eq!(served.served, Served::StaleCache);
    assert_eq!(served.records.len(), 2);
    assert!(served.notice.as_deref().unwrap().contains("Wait a minute"));
}

#[tokio::test]
async fn test_cache_write_failures_do_not_fail_the_search() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog_with(fast_config(), &[a.clone()], Arc::new(MemoryStore::with_quota(16)));

    let results = t.catalog.search("rose", &SearchOptions::default()).await;

    assert_eq!(results.records(A).len(), 2);
    assert_eq!(results.get(A).unwrap().served, Served::Network);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_malformed_records_are_dropped_individually() {
    let a = Arc::new(MockSource::new(
        A,
        vec![
            raw_record(A, 1, "Dog rose", "Rosa canina"),
            json!("not a record"),
            json!({"id": {"nested": true}}),
            json!({}),
            raw_record(A, 2, "Rugosa rose", "Rosa rugosa"),
        ],
    ));
    let t = test_catalog(&[a]);

    let results = t.catalog.search("rose", &SearchOptions::default()).await;
    let ids: Vec<&str> = results.records(A).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["perenual-1", "perenual-2"]);
}

#[tokio::test]
async fn test_page_with_malformed_records_is_not_cached() {
    let a = Arc::new(MockSource::new(A, vec![json!("garbage"), json!(42)]));
    let t = test_catalog(&[a.clone()]);

    let first = t.catalog.search("rose", &SearchOptions::default()).await;
    assert_eq!(first.get(A).unwrap().served, Served::Network);
    assert!(first.records(A).is_empty());
    assert!(t.store.is_empty());

    a.set_behavior(Behavior::Records(roses(A)));
    let second = t.catalog.search("rose", &SearchOptions::default()).await;

    assert_eq!(a.list_calls(), 2);
    assert_eq!(second.get(A).unwrap().served, Served::Network);
    assert_eq!(second.records(A).len(), 2);
}

#[tokio::test]
async fn test_enabled_source_without_client_reports_failure() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog_with(fast_config(), &[a.clone()], Arc::new(MemoryStore::new()));

    let results = t.catalog.search("rose", &SearchOptions::default()).await;

    assert_eq!(results.sources(), vec![A, B, C]);
    assert_eq!(results.records(A).len(), 2);
    for source in [B, C] {
        let missing = results.get(source).unwrap();
        assert_eq!(missing.served, Served::Failed);
        assert!(missing.records.is_empty());
        assert!(missing.notice.is_some());
    }
    assert_eq!(results.notices().len(), 2);
}

#[tokio::test]
async fn test_cache_hit_does_not_wait_for_cooldown() {
    let mut config = fast_config();
    config.set_enabled(B, false);
    config.set_enabled(C, false);
    for settings in &mut config.sources {
        settings.cooldown = Duration::from_millis(500);
    }
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog_with(config, &[a.clone()], Arc::new(MemoryStore::new()));

    t.catalog.search("rose", &SearchOptions::default()).await;

    let started = std::time::Instant::now();
    let cached = t.catalog.search("rose", &SearchOptions::default()).await;
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(cached.get(A).unwrap().served, Served::Cache);

    // A miss right after still pays the cooldown
    let started = std::time::Instant::now();
    t.catalog
        .search("rose", &SearchOptions { page: 2, kingdom: None })
        .await;
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(a.list_calls(), 2);
}

#[tokio::test]
async fn test_kingdom_filter_server_side_and_client_side() {
    let a = Arc::new(MockSource::new(
        A,
        vec![
            raw_record(A, 1, "Dog rose", "Rosa canina"),
            raw_record(A, 2, "Fly agaric", "Amanita muscaria"),
        ],
    ));
    let b = Arc::new(
        MockSource::new(B, vec![raw_record(B, 3, "Chanterelle", "Cantharellus cibarius")])
            .with_taxon_filter(),
    );
    let t = test_catalog(&[a.clone(), b.clone()]);

    let options = SearchOptions {
        page: 1,
        kingdom: Some(Kingdom::Fungi),
    };
    let results = t.catalog.search("", &options).await;

    // Server-side filter is passed through, client-side filter is not sent
    assert_eq!(b.last_query().unwrap().kingdom, Some(Kingdom::Fungi));
    assert_eq!(a.last_query().unwrap().kingdom, None);

    let names: Vec<&str> = results.records(A).iter().map(|r| r.common_name.as_str()).collect();
    assert_eq!(names, vec!["Fly agaric"]);
    assert_eq!(results.records(B).len(), 1);
}

#[tokio::test]
async fn test_search_merged_deduplicates_in_priority_order() {
    let a = Arc::new(MockSource::new(A, vec![raw_record(A, 1, "Death cap", "Amanita phalloides")]));
    let b = Arc::new(MockSource::new(
        B,
        vec![
            raw_record(B, 2, "Death cap", "amanita phalloides "),
            raw_record(B, 3, "Panther cap", "Amanita pantherina"),
        ],
    ));
    let t = test_catalog(&[a, b]);

    let merged = t.catalog.search_merged("amanita", &SearchOptions::default()).await;
    let ids: Vec<&str> = merged.records.iter().map(|r| r.id.as_str()).collect();

    assert_eq!(ids, vec!["perenual-1", "inat-3"]);
    assert!(merged.notices.is_empty());
}

// ============================================================================
// By-id lookups
// ============================================================================

#[tokio::test]
async fn test_fetch_by_id_caches_normalized_record() {
    let b = Arc::new(MockSource::new(B, roses(B)));
    let t = test_catalog(&[b.clone()]);

    let first = t.catalog.fetch_by_id("inat-1").await.unwrap();
    let second = t.catalog.fetch_by_id("inat-1").await.unwrap();

    assert_eq!(b.id_calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.scientific_name, "Rosa canina");
    assert_eq!(
        t.store.keys_with_prefix("taxon_inat-1").await.unwrap(),
        vec!["taxon_inat-1", "taxon_inat-1_time"]
    );
}

#[tokio::test]
async fn test_rate_limit_fallback_serves_stale_record() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let t = test_catalog(&[a.clone()]);

    let fresh = t.catalog.fetch_by_id("perenual-2").await.unwrap();

    t.clock.advance(DAY + Duration::from_secs(60));
    a.set_behavior(Behavior::Fail(FetchError::rate_limited(A)));

    let stale = t.catalog.fetch_by_id("perenual-2").await.unwrap();
    assert_eq!(a.id_calls(), 2);
    assert_eq!(stale, fresh);
}

#[tokio::test]
async fn test_rate_limited_without_cache_propagates() {
    let a = Arc::new(MockSource::failing(A, FetchError::rate_limited(A)));
    let t = test_catalog(&[a.clone()]);

    let err = t.catalog.fetch_by_id("perenual-9").await.unwrap_err();
    assert!(matches!(err, CatalogError::Fetch(FetchError::RateLimited { .. })));
    assert_eq!(a.id_calls(), 1);
}

#[tokio::test]
async fn test_fetch_by_id_preconditions() {
    let a = Arc::new(MockSource::new(A, roses(A)));
    let mut config = fast_config();
    config.set_enabled(A, false);
    let t = test_catalog_with(config, &[a.clone()], Arc::new(MemoryStore::new()));

    assert!(matches!(
        t.catalog.fetch_by_id("perenual-1").await,
        Err(CatalogError::SourceDisabled(SourceId::PrimarySpecies))
    ));
    assert!(matches!(
        t.catalog.fetch_by_id("plantnet-1").await,
        Err(CatalogError::UnknownId(_))
    ));
    assert_eq!(a.id_calls(), 0);
}
