//! Multi-source aggregation
//!
//! `Catalog` owns every piece of per-process state (clients, pacing slots,
//! cache handle) so independent instances never share timestamps or entries.
//!
//! A search fans out to the enabled sources concurrently and waits for all of
//! them (a barrier, not a race). Each branch runs cache → pacing/retry →
//! normalize → cache write, and absorbs its own failure: a dead source
//! contributes an empty list, never an error for the whole search.

use crate::cache::{list_key, record_key, Cache};
use crate::config::{CatalogConfig, SourceToggles};
use crate::dedup;
use crate::error::{CatalogError, CatalogResult, FetchError};
use crate::normalizer::{normalize_all, normalize_value};
use crate::rate_limit::RateLimiter;
use crate::sources::{InaturalistClient, ListQuery, PerenualClient, SourceClient, ToxicityClient};
use crate::store::KeyValueStore;
use crate::types::{CanonicalRecord, Kingdom, SourceId};
use futures::future::{join_all, ready, Either};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Options of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// 1-based page
    pub page: u32,
    /// Restrict results to one kingdom
    pub kingdom: Option<Kingdom>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            kingdom: None,
        }
    }
}

/// How one source's contribution was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Served {
    Network,
    Cache,
    /// Expired cache entry served because the source was rate limited
    StaleCache,
    /// Source failed; records are empty
    Failed,
}

/// One source's share of a search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source: SourceId,
    pub records: Vec<CanonicalRecord>,
    pub served: Served,
    /// User-facing message when the source degraded
    pub notice: Option<String>,
}

impl SourceResult {
    fn failed(source: SourceId, err: &FetchError) -> Self {
        Self {
            source,
            records: Vec::new(),
            served: Served::Failed,
            notice: Some(err.user_message()),
        }
    }
}

/// Per-source results of a search, in the order sources were queried
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialResults {
    results: Vec<SourceResult>,
}

impl PartialResults {
    pub fn new(results: Vec<SourceResult>) -> Self {
        Self { results }
    }

    pub fn get(&self, source: SourceId) -> Option<&SourceResult> {
        self.results.iter().find(|r| r.source == source)
    }

    /// Records contributed by a source (empty if it was not queried)
    pub fn records(&self, source: SourceId) -> &[CanonicalRecord] {
        self.get(source).map(|r| r.records.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceResult> {
        self.results.iter()
    }

    /// Sources that were queried
    pub fn sources(&self) -> Vec<SourceId> {
        self.results.iter().map(|r| r.source).collect()
    }

    pub fn total(&self) -> usize {
        self.results.iter().map(|r| r.records.len()).sum()
    }

    /// No records from any source (the "no results" state)
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn notices(&self) -> Vec<(SourceId, &str)> {
        self.results
            .iter()
            .filter_map(|r| r.notice.as_deref().map(|n| (r.source, n)))
            .collect()
    }
}

/// Deduplicated search output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedResults {
    pub records: Vec<CanonicalRecord>,
    pub notices: Vec<String>,
}

/// Entry point of the data access layer
pub struct Catalog {
    clients: Vec<Arc<dyn SourceClient>>,
    config: CatalogConfig,
    limiter: RateLimiter,
    cache: Cache,
}

impl Catalog {
    /// Build a catalog around explicit clients
    pub fn new(config: CatalogConfig, clients: Vec<Arc<dyn SourceClient>>, cache: Cache) -> Self {
        let limiter = RateLimiter::from_settings(&config.sources);
        Self {
            clients,
            config,
            limiter,
            cache,
        }
    }

    /// Build a catalog with the HTTP clients for every configured source
    pub fn from_config(config: CatalogConfig, store: Arc<dyn KeyValueStore>) -> flora_common::Result<Self> {
        let mut clients: Vec<Arc<dyn SourceClient>> = Vec::new();
        for settings in &config.sources {
            let client: Arc<dyn SourceClient> = match settings.id {
                SourceId::PrimarySpecies => Arc::new(PerenualClient::new(settings)?),
                SourceId::CommunityTaxonomy => Arc::new(InaturalistClient::new(settings)?),
                SourceId::Toxicity => Arc::new(ToxicityClient::new(settings)?),
            };
            clients.push(client);
        }

        let cache = Cache::new(store, config.cache_ttl);
        Ok(Self::new(config, clients, cache))
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn client(&self, source: SourceId) -> Option<&Arc<dyn SourceClient>> {
        self.clients.iter().find(|c| c.id() == source)
    }

    /// Search every source enabled in configuration
    pub async fn search(&self, query: &str, options: &SearchOptions) -> PartialResults {
        self.search_with(query, &self.config.toggles(), options).await
    }

    /// Search the sources enabled in `toggles`
    ///
    /// Disabled sources are never called. Results come back in declared
    /// priority order.
    pub async fn search_with(
        &self,
        query: &str,
        toggles: &SourceToggles,
        options: &SearchOptions,
    ) -> PartialResults {
        let mut branches = Vec::new();
        for source in self.config.priority() {
            if !toggles.is_enabled(source) {
                debug!(source = %source, "Source disabled, skipping");
                continue;
            }
            match self.client(source) {
                Some(client) => {
                    branches.push(Either::Left(self.search_source(client.as_ref(), query, options)))
                }
                None => {
                    warn!(source = %source, "Source enabled but no client registered");
                    let err = FetchError::Unreachable {
                        source_id: source,
                        reason: "no client registered".to_string(),
                    };
                    branches.push(Either::Right(ready(SourceResult::failed(source, &err))));
                }
            }
        }

        let results = PartialResults::new(join_all(branches).await);

        info!(
            query = %query,
            page = options.page,
            sources = results.iter().count(),
            total = results.total(),
            "Search complete"
        );
        results
    }

    /// Search and deduplicate in configured priority order
    pub async fn search_merged(&self, query: &str, options: &SearchOptions) -> MergedResults {
        let partial = self.search(query, options).await;
        let records = dedup::merge(&partial, &self.config.priority());
        let notices = partial.notices().into_iter().map(|(_, n)| n.to_string()).collect();
        MergedResults { records, notices }
    }

    async fn search_source(
        &self,
        client: &dyn SourceClient,
        query: &str,
        options: &SearchOptions,
    ) -> SourceResult {
        let source = client.id();
        let cache_query = ListQuery::new(query, options.page).with_kingdom(options.kingdom);
        let key = list_key(source, &cache_query);

        if let Some(records) = self.cache.get::<Vec<CanonicalRecord>>(&key).await {
            return SourceResult {
                source,
                records,
                served: Served::Cache,
                notice: None,
            };
        }

        // Kingdom goes on the wire only where the provider filters server-side
        let server_filter = client.supports_taxon_filter();
        let wire_query = if server_filter {
            cache_query.clone()
        } else {
            cache_query.clone().with_kingdom(None)
        };
        let wire = &wire_query;

        match self.limiter.invoke(source, move || client.fetch_list(wire)).await {
            Ok(values) => {
                let fetched = values.len();
                let mut records = normalize_all(source, values);
                // A page with unusable records is not cached; the next search retries it
                let complete = records.len() == fetched;
                if let (Some(kingdom), false) = (options.kingdom, server_filter) {
                    records.retain(|r| {
                        kingdom.matches_names(&[
                            r.common_name.as_str(),
                            r.scientific_name.as_str(),
                            r.attributes.other_names.as_str(),
                        ])
                    });
                }
                if complete {
                    self.cache.put(&key, &records).await;
                } else {
                    warn!(source = %source, fetched, "Page had malformed records, not caching");
                }
                SourceResult {
                    source,
                    records,
                    served: Served::Network,
                    notice: None,
                }
            }
            Err(err) if err.is_rate_limited() => {
                match self.cache.get_stale::<Vec<CanonicalRecord>>(&key).await {
                    Some(records) => {
                        warn!(source = %source, key = %key, "Rate limited, serving stale cached list");
                        SourceResult {
                            source,
                            records,
                            served: Served::StaleCache,
                            notice: Some(err.user_message()),
                        }
                    }
                    None => {
                        warn!(source = %source, error = %err, "Rate limited and nothing cached");
                        SourceResult::failed(source, &err)
                    }
                }
            }
            Err(err) => {
                warn!(source = %source, error = %err, "Source failed, contributing no results");
                SourceResult::failed(source, &err)
            }
        }
    }

    /// Look up one record by its canonical id
    ///
    /// Fails only for ids naming no source, for disabled sources, or when the
    /// source fails with nothing usable in the cache.
    pub async fn fetch_by_id(&self, id: &str) -> CatalogResult<CanonicalRecord> {
        let (source, native_id) =
            SourceId::parse_record_id(id).ok_or_else(|| CatalogError::UnknownId(id.to_string()))?;

        let client = match self.client(source) {
            Some(client) if self.config.is_enabled(source) => client.as_ref(),
            _ => {
                error!(source = %source, id = %id, "By-id lookup against a disabled source");
                return Err(CatalogError::SourceDisabled(source));
            }
        };

        let key = record_key(source, id);
        if let Some(record) = self.cache.get::<CanonicalRecord>(&key).await {
            return Ok(record);
        }

        let fetched = self
            .limiter
            .invoke(source, move || client.fetch_by_id(native_id))
            .await
            .and_then(|value| normalize_value(source, value));

        match fetched {
            Ok(record) => {
                self.cache.put(&key, &record).await;
                Ok(record)
            }
            Err(err) if err.is_rate_limited() => {
                match self.cache.get_stale::<CanonicalRecord>(&key).await {
                    Some(record) => {
                        warn!(source = %source, id = %id, "Rate limited, serving stale cached record");
                        Ok(record)
                    }
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}
