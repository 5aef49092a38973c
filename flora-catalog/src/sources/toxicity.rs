//! Toxic plant database client
//!
//! # API Reference
//! - List: `GET {base}/plants?search=..&page=..`, records under `plants`,
//!   `data` or `results` (or a bare array)
//! - Detail: `GET {base}/plants/{id}`, the record itself or wrapped in `plant`
//!
//! Records are keyed by numeric id where the dataset has one, otherwise by a
//! slug of the scientific name. The dataset has no public host; point
//! `base_url` at the deployment in use.

use super::{build_http_client, extract_items, get_json, ListQuery, Scalar, SourceClient, TextList};
use crate::config::SourceSettings;
use crate::error::FetchError;
use crate::types::SourceId;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default API base URL (local deployment)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8710/api";

/// Raw toxic plant record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToxicPlant {
    pub id: Option<Scalar>,
    #[serde(alias = "common_name")]
    pub name: Option<String>,
    pub scientific_name: Option<TextList>,
    pub family: Option<String>,
    #[serde(alias = "severity")]
    pub toxicity: Option<String>,
    pub toxic_to: Option<TextList>,
    pub toxic_parts: Option<TextList>,
    #[serde(alias = "clinical_signs")]
    pub symptoms: Option<TextList>,
    pub description: Option<String>,
    #[serde(alias = "image_url")]
    pub image: Option<String>,
    #[serde(alias = "url")]
    pub reference_url: Option<String>,
}

/// Toxic plant database client
pub struct ToxicityClient {
    http_client: Client,
    base_url: String,
}

impl ToxicityClient {
    pub fn new(settings: &SourceSettings) -> flora_common::Result<Self> {
        Ok(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SourceClient for ToxicityClient {
    fn id(&self) -> SourceId {
        SourceId::Toxicity
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/plants", self.base_url);
        let mut params = vec![("page", query.page.to_string())];
        if !query.is_browse() {
            params.push(("search", query.text.clone()));
        }

        let body = get_json(&self.http_client, self.id(), &url, &params).await?;
        extract_items(self.id(), body, &["plants", "data", "results"])
    }

    async fn fetch_by_id(&self, native_id: &str) -> Result<Value, FetchError> {
        let url = format!("{}/plants/{}", self.base_url, native_id);
        let body = get_json(&self.http_client, self.id(), &url, &[]).await?;

        Ok(match body {
            Value::Object(mut map) if map.contains_key("plant") => {
                map.remove("plant").unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}
