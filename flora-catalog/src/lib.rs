//! flora-catalog library interface
//!
//! Multi-source plant and fungi catalog: concurrent provider queries,
//! normalization into one record shape, TTL caching, pacing with bounded
//! retries, and cross-source deduplication.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod favorites;
pub mod normalizer;
pub mod rate_limit;
pub mod sources;
pub mod store;
pub mod types;

pub use crate::aggregator::{Catalog, MergedResults, PartialResults, SearchOptions, Served, SourceResult};
pub use crate::cache::Cache;
pub use crate::config::{CatalogConfig, SourceSettings, SourceToggles};
pub use crate::error::{CatalogError, CatalogResult, FetchError};
pub use crate::favorites::{FavoriteRecord, FavoritesStore};
pub use crate::store::{KeyValueStore, MemoryStore, SqliteStore};
pub use crate::types::{CanonicalRecord, Kingdom, RecordAttributes, SourceId};
