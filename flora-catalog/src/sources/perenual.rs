//! Primary species database client (Perenual)
//!
//! # API Reference
//! - List: `GET {base}/species-list?key=..&q=..&page=..`, records under `data`
//! - Detail: `GET {base}/species/details/{id}?key=..`
//! - Free-tier keys are throttled hard; 429 is common and is surfaced as
//!   `FetchError::RateLimited`.

use super::{build_http_client, extract_items, get_json, ListQuery, Scalar, SourceClient, TextList};
use crate::config::SourceSettings;
use crate::error::FetchError;
use crate::types::SourceId;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://perenual.com/api";

/// Raw species record as the provider sends it
///
/// List records carry a subset of the detail fields; everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerenualSpecies {
    pub id: Option<Scalar>,
    pub common_name: Option<String>,
    pub scientific_name: Option<TextList>,
    pub other_name: Option<TextList>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub cycle: Option<String>,
    pub watering: Option<String>,
    pub sunlight: Option<TextList>,
    pub care_level: Option<String>,
    pub description: Option<String>,
    pub poisonous_to_humans: Option<Scalar>,
    pub poisonous_to_pets: Option<Scalar>,
    pub default_image: Option<PerenualImage>,
}

/// Image block; any of the size variants may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerenualImage {
    pub original_url: Option<String>,
    pub regular_url: Option<String>,
    pub medium_url: Option<String>,
    pub small_url: Option<String>,
    pub thumbnail: Option<String>,
}

/// Perenual species API client
pub struct PerenualClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PerenualClient {
    pub fn new(settings: &SourceSettings) -> flora_common::Result<Self> {
        Ok(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn key_param(&self) -> Vec<(&'static str, String)> {
        self.api_key
            .iter()
            .map(|key| ("key", key.clone()))
            .collect()
    }
}

#[async_trait]
impl SourceClient for PerenualClient {
    fn id(&self) -> SourceId {
        SourceId::PrimarySpecies
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/species-list", self.base_url);
        let mut params = self.key_param();
        if !query.is_browse() {
            params.push(("q", query.text.clone()));
        }
        params.push(("page", query.page.to_string()));

        let body = get_json(&self.http_client, self.id(), &url, &params).await?;
        extract_items(self.id(), body, &["data"])
    }

    async fn fetch_by_id(&self, native_id: &str) -> Result<Value, FetchError> {
        let url = format!("{}/species/details/{}", self.base_url, native_id);
        get_json(&self.http_client, self.id(), &url, &self.key_param()).await
    }
}
