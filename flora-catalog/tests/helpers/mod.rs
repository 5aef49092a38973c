//! Test Helper Utilities
//!
//! Scripted source clients and a catalog wired to an in-memory store and a
//! hand-driven clock. No test here touches the network.

#![allow(dead_code)]

use async_trait::async_trait;
use flora_catalog::cache::{Cache, ManualClock};
use flora_catalog::sources::{ListQuery, SourceClient};
use flora_catalog::{Catalog, CatalogConfig, FetchError, KeyValueStore, MemoryStore, SourceId};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Start of the manual clock used by every test catalog
pub const T0: i64 = 1_700_000_000_000;

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Mock source
// ============================================================================

/// What a mock source answers with
#[derive(Debug, Clone)]
pub enum Behavior {
    Records(Vec<Value>),
    Fail(FetchError),
}

/// Source client answering from a script and counting calls
pub struct MockSource {
    id: SourceId,
    taxon_filter: bool,
    behavior: Mutex<Behavior>,
    list_calls: AtomicUsize,
    id_calls: AtomicUsize,
    last_query: Mutex<Option<ListQuery>>,
}

impl MockSource {
    pub fn new(id: SourceId, records: Vec<Value>) -> Self {
        Self::with_behavior(id, Behavior::Records(records))
    }

    pub fn failing(id: SourceId, err: FetchError) -> Self {
        Self::with_behavior(id, Behavior::Fail(err))
    }

    pub fn unreachable(id: SourceId) -> Self {
        Self::failing(
            id,
            FetchError::Unreachable {
                source_id: id,
                reason: "connection refused".to_string(),
            },
        )
    }

    fn with_behavior(id: SourceId, behavior: Behavior) -> Self {
        Self {
            id,
            taxon_filter: false,
            behavior: Mutex::new(behavior),
            list_calls: AtomicUsize::new(0),
            id_calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn with_taxon_filter(mut self) -> Self {
        self.taxon_filter = true;
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn id_calls(&self) -> usize {
        self.id_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<ListQuery> {
        self.last_query.lock().unwrap().clone()
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn supports_taxon_filter(&self) -> bool {
        self.taxon_filter
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Value>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());

        match self.behavior() {
            Behavior::Records(records) => Ok(records),
            Behavior::Fail(err) => Err(err),
        }
    }

    async fn fetch_by_id(&self, native_id: &str) -> Result<Value, FetchError> {
        self.id_calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior() {
            Behavior::Records(records) => records
                .into_iter()
                .find(|r| r["id"].to_string().trim_matches('"') == native_id)
                .ok_or(FetchError::RequestFailed {
                    source_id: self.id,
                    status: 404,
                }),
            Behavior::Fail(err) => Err(err),
        }
    }
}

/// Raw provider JSON for a record with the given names
pub fn raw_record(source: SourceId, id: i64, common: &str, scientific: &str) -> Value {
    match source {
        SourceId::PrimarySpecies => json!({
            "id": id,
            "common_name": common,
            "scientific_name": [scientific],
            "cycle": "perennial",
            "sunlight": ["full sun"]
        }),
        SourceId::CommunityTaxonomy => json!({
            "id": id,
            "name": scientific,
            "preferred_common_name": common,
            "rank": "species",
            "observations_count": 120
        }),
        SourceId::Toxicity => json!({
            "id": id,
            "name": common,
            "scientific_name": scientific,
            "toxicity": "moderate",
            "toxic_to": "cats, dogs"
        }),
    }
}

// ============================================================================
// Catalog fixture
// ============================================================================

/// Catalog plus the handles tests steer it with
pub struct TestCatalog {
    pub catalog: Catalog,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

/// Default config with pacing switched off and near-instant retries
pub fn fast_config() -> CatalogConfig {
    let mut config = CatalogConfig::default();
    for settings in &mut config.sources {
        settings.cooldown = Duration::ZERO;
        settings.retry_delay = Duration::from_millis(1);
    }
    config
}

/// Catalog over `mocks`; sources without a mock are disabled
pub fn test_catalog(mocks: &[Arc<MockSource>]) -> TestCatalog {
    let mut config = fast_config();
    for id in config.priority() {
        if !mocks.iter().any(|m| m.id() == id) {
            config.set_enabled(id, false);
        }
    }
    test_catalog_with(config, mocks, Arc::new(MemoryStore::new()))
}

pub fn test_catalog_with(
    config: CatalogConfig,
    mocks: &[Arc<MockSource>],
    store: Arc<MemoryStore>,
) -> TestCatalog {
    let clock = Arc::new(ManualClock::new(T0));
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let cache = Cache::with_clock(kv, DAY, clock.clone());
    let clients: Vec<Arc<dyn SourceClient>> = mocks
        .iter()
        .map(|m| m.clone() as Arc<dyn SourceClient>)
        .collect();

    TestCatalog {
        catalog: Catalog::new(config, clients, cache),
        clock,
        store,
    }
}
