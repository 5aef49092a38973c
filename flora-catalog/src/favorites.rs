//! Favorites collection
//!
//! A single serialized list under the `favorites` key. The catalog only hands
//! out `CanonicalRecord`s; promoting one into this list is the caller's call.

use crate::store::KeyValueStore;
use crate::types::CanonicalRecord;
use flora_common::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Well-known key of the favorites list
pub const FAVORITES_KEY: &str = "favorites";

/// A canonical record promoted into the favorites list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub added_at_epoch_ms: i64,
}

/// Favorites persisted in the shared key-value store
#[derive(Clone)]
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All favorites, oldest first
    ///
    /// An unreadable list is treated as empty rather than failing the caller.
    pub async fn list(&self) -> Result<Vec<FavoriteRecord>> {
        let Some(raw) = self.store.get(FAVORITES_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(favorites) => Ok(favorites),
            Err(e) => {
                warn!(error = %e, "Favorites list unreadable, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|f| f.record.id == id))
    }

    /// Add a record; returns false when its id is already a favorite
    pub async fn add(&self, record: CanonicalRecord) -> Result<bool> {
        let mut favorites = self.list().await?;
        if favorites.iter().any(|f| f.record.id == record.id) {
            return Ok(false);
        }

        info!(id = %record.id, "Adding favorite");
        favorites.push(FavoriteRecord {
            record,
            added_at_epoch_ms: chrono::Utc::now().timestamp_millis(),
        });
        self.save(&favorites).await?;
        Ok(true)
    }

    /// Remove by id; returns false when it was not a favorite
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut favorites = self.list().await?;
        let before = favorites.len();
        favorites.retain(|f| f.record.id != id);

        if favorites.len() == before {
            return Ok(false);
        }

        info!(id = %id, "Removing favorite");
        self.save(&favorites).await?;
        Ok(true)
    }

    async fn save(&self, favorites: &[FavoriteRecord]) -> Result<()> {
        let serialized = serde_json::to_string(favorites)?;
        self.store.set(FAVORITES_KEY, &serialized).await
    }
}
