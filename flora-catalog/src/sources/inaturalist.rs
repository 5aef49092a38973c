//! Community taxonomy client (iNaturalist)
//!
//! # API Reference
//! - List: `GET {base}/taxa?q=..&page=..&per_page=..&iconic_taxa=..`
//! - Detail: `GET {base}/taxa/{id}`, a one-element `results` array
//!
//! Kingdom restriction is applied server-side through `iconic_taxa`.

use super::{build_http_client, extract_items, get_json, ListQuery, Scalar, SourceClient};
use crate::config::SourceSettings;
use crate::error::FetchError;
use crate::types::SourceId;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.inaturalist.org/v1";

/// Records per list page
const PER_PAGE: u32 = 30;

/// Raw taxon record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InatTaxon {
    pub id: Option<Scalar>,
    /// Scientific name
    pub name: Option<String>,
    pub preferred_common_name: Option<String>,
    pub rank: Option<String>,
    pub iconic_taxon_name: Option<String>,
    pub observations_count: Option<Scalar>,
    pub wikipedia_url: Option<String>,
    pub wikipedia_summary: Option<String>,
    pub default_photo: Option<InatPhoto>,
    /// Present on detail records only
    pub ancestors: Option<Vec<InatAncestor>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InatPhoto {
    pub medium_url: Option<String>,
    pub url: Option<String>,
    pub square_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InatAncestor {
    pub rank: Option<String>,
    pub name: Option<String>,
}

/// iNaturalist taxa API client
pub struct InaturalistClient {
    http_client: Client,
    base_url: String,
}

impl InaturalistClient {
    pub fn new(settings: &SourceSettings) -> flora_common::Result<Self> {
        Ok(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SourceClient for InaturalistClient {
    fn id(&self) -> SourceId {
        SourceId::CommunityTaxonomy
    }

    fn supports_taxon_filter(&self) -> bool {
        true
    }

    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/taxa", self.base_url);
        let mut params = vec![
            ("page", query.page.to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        if !query.is_browse() {
            params.push(("q", query.text.clone()));
        }
        if let Some(kingdom) = query.kingdom {
            params.push(("iconic_taxa", kingdom.iconic_taxon().to_string()));
        }

        let body = get_json(&self.http_client, self.id(), &url, &params).await?;
        extract_items(self.id(), body, &["results"])
    }

    async fn fetch_by_id(&self, native_id: &str) -> Result<Value, FetchError> {
        let url = format!("{}/taxa/{}", self.base_url, native_id);
        let body = get_json(&self.http_client, self.id(), &url, &[]).await?;
        first_result(self.id(), body)
    }
}

/// The single taxon of a detail response; an empty `results` is not retried
fn first_result(source: SourceId, body: Value) -> Result<Value, FetchError> {
    extract_items(source, body, &["results"])?
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::MalformedResponse {
            source_id: source,
            reason: "no taxon in results".to_string(),
        })
}
