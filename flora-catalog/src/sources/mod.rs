//! Source clients, one per external provider
//!
//! Each client issues exactly one HTTP GET per call and hands back the
//! provider's JSON untouched. Status classification happens here; caching,
//! pacing and retries wrap the clients one layer up, and the provider shapes
//! are turned into `CanonicalRecord`s only by the normalizer.
//!
//! # Providers
//! 1. **perenual** - primary species database (care data, toxicity flags)
//! 2. **inaturalist** - community taxonomy service (server-side kingdom filter)
//! 3. **toxicity** - toxic plant database (toxic-to lists, symptoms)

pub mod inaturalist;
pub mod perenual;
pub mod toxicity;

use crate::error::FetchError;
use crate::types::{Kingdom, SourceId};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub use inaturalist::{InaturalistClient, InatTaxon};
pub use perenual::{PerenualClient, PerenualSpecies};
pub use toxicity::{ToxicPlant, ToxicityClient};

/// Parameters of one list request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListQuery {
    /// Free text; empty means unfiltered browse
    pub text: String,
    /// 1-based page number
    pub page: u32,
    /// Server-side kingdom restriction, only for sources that support it
    pub kingdom: Option<Kingdom>,
}

impl ListQuery {
    pub fn new(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into().trim().to_string(),
            page: page.max(1),
            kingdom: None,
        }
    }

    pub fn with_kingdom(mut self, kingdom: Option<Kingdom>) -> Self {
        self.kingdom = kingdom;
        self
    }

    pub fn is_browse(&self) -> bool {
        self.text.is_empty()
    }
}

/// One external provider
///
/// Implementations must not retry, sleep or touch the cache.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which provider this client talks to
    fn id(&self) -> SourceId;

    /// Whether `ListQuery::kingdom` is honored by the provider itself
    fn supports_taxon_filter(&self) -> bool {
        false
    }

    /// One page of raw records matching the query
    async fn fetch_list(&self, query: &ListQuery) -> Result<Vec<Value>, FetchError>;

    /// One raw record by the provider's native identifier
    async fn fetch_by_id(&self, native_id: &str) -> Result<Value, FetchError>;
}

/// Build the shared HTTP client used by a provider
pub fn build_http_client(timeout: Duration) -> flora_common::Result<Client> {
    let user_agent = flora_common::config::get_user_agent();
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .default_headers(headers)
        .build()
        .map_err(|e| flora_common::Error::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success status to the error taxonomy
pub fn classify_status(source: SourceId, status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::rate_limited(source));
    }
    Err(FetchError::RequestFailed {
        source_id: source,
        status: status.as_u16(),
    })
}

/// Issue one GET and decode the body as JSON
pub(crate) async fn get_json(
    http_client: &Client,
    source: SourceId,
    url: &str,
    params: &[(&str, String)],
) -> Result<Value, FetchError> {
    debug!(source = %source, url = %url, "Querying provider");

    let response = http_client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| FetchError::Unreachable {
            source_id: source,
            reason: e.to_string(),
        })?;

    classify_status(source, response.status())?;

    response
        .json::<Value>()
        .await
        .map_err(|e| FetchError::MalformedResponse {
            source_id: source,
            reason: format!("body is not JSON: {}", e),
        })
}

/// Pull the record array out of a list envelope
///
/// A bare top-level array is accepted as well; a `null` array means no results.
pub(crate) fn extract_items(
    source: SourceId,
    body: Value,
    envelope_keys: &[&str],
) -> Result<Vec<Value>, FetchError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in envelope_keys {
                match map.remove(*key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Null) => return Ok(Vec::new()),
                    Some(_) | None => continue,
                }
            }
            Err(FetchError::MalformedResponse {
                source_id: source,
                reason: format!("no result array under {:?}", envelope_keys),
            })
        }
        other => Err(FetchError::MalformedResponse {
            source_id: source,
            reason: format!("unexpected top-level JSON: {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Lenient field shapes shared by provider schemas
// ============================================================================

/// A field some records send as a scalar and others as an array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Text list tolerant of nulls inside the array
pub type TextList = OneOrMany<Option<String>>;

/// Flatten a text list into its non-blank entries
pub fn texts(list: Option<TextList>) -> Vec<String> {
    list.map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A field whose JSON type varies between records (ids, flags)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Display form; `None` for blank text
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Interpret as a flag: `true`, non-zero, "yes", "true", "1"
    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(n) => *n != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "y" | "1"
            ),
        }
    }

    /// Interpret as a non-negative count
    pub fn as_count(&self) -> u64 {
        match self {
            Scalar::Int(n) => (*n).max(0) as u64,
            Scalar::Float(f) if *f > 0.0 => *f as u64,
            Scalar::Text(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}
