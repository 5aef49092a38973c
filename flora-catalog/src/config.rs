//! Configuration resolution for flora-catalog
//!
//! Turns the TOML `[[sources]]` tables into per-source settings with provider
//! defaults filled in. API keys resolve with ENV → TOML priority.

use crate::sources::{inaturalist, perenual, toxicity};
use crate::types::SourceId;
use flora_common::config::TomlConfig;
use flora_common::{Error, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for provider requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolved settings for one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub id: SourceId,
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Minimum spacing between two calls to this source
    pub cooldown: Duration,
    pub timeout: Duration,
}

impl SourceSettings {
    /// Provider defaults
    pub fn defaults(id: SourceId) -> Self {
        let (base_url, max_attempts, cooldown_ms) = match id {
            SourceId::PrimarySpecies => (perenual::DEFAULT_BASE_URL, 2, 1000),
            SourceId::CommunityTaxonomy => (inaturalist::DEFAULT_BASE_URL, 2, 1000),
            SourceId::Toxicity => (toxicity::DEFAULT_BASE_URL, 1, 250),
        };

        Self {
            id,
            enabled: true,
            api_key: None,
            base_url: base_url.to_string(),
            max_attempts,
            retry_delay: Duration::from_millis(1000),
            cooldown: Duration::from_millis(cooldown_ms),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Environment variable holding a source's API key
pub fn api_key_env_var(id: SourceId) -> String {
    format!("FLORA_{}_API_KEY", id.tag().to_ascii_uppercase())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a source's API key
///
/// **Priority:** ENV → TOML
pub fn resolve_api_key(id: SourceId, toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(api_key_env_var(id)).ok();

    if let (Some(_), Some(toml)) = (&env_key, toml_key) {
        if is_valid_key(toml) {
            warn!(
                source = %id,
                "API key found in environment and TOML. Using environment (highest priority)."
            );
        }
    }

    if let Some(key) = env_key.filter(|k| is_valid_key(k)) {
        info!(source = %id, "API key loaded from environment variable");
        return Some(key.trim().to_string());
    }

    toml_key.filter(|k| is_valid_key(k)).map(|key| {
        info!(source = %id, "API key loaded from TOML config");
        key.trim().to_string()
    })
}

/// Per-search mapping of source → enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceToggles {
    entries: Vec<(SourceId, bool)>,
}

impl SourceToggles {
    pub fn new(entries: impl IntoIterator<Item = (SourceId, bool)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Unlisted sources are disabled
    pub fn is_enabled(&self, id: SourceId) -> bool {
        self.entries
            .iter()
            .find(|(source, _)| *source == id)
            .map(|(_, enabled)| *enabled)
            .unwrap_or(false)
    }

    pub fn enabled(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.entries
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(source, _)| *source)
    }
}

/// Resolved configuration consumed by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    /// Declaration order is the deduplication priority order
    pub sources: Vec<SourceSettings>,
    pub cache_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sources: SourceId::ALL.into_iter().map(SourceSettings::defaults).collect(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CatalogConfig {
    /// Resolve from the TOML file contents
    ///
    /// No `[[sources]]` tables means every source with defaults. Sources not
    /// declared when others are get appended, disabled, after the declared ones.
    pub fn from_toml(toml_config: &TomlConfig) -> Result<Self> {
        let mut sources = Vec::new();
        let mut seen = HashSet::new();

        for entry in &toml_config.sources {
            let id: SourceId = entry.id.parse().map_err(Error::Config)?;
            if !seen.insert(id) {
                return Err(Error::Config(format!("Source '{}' declared twice", entry.id)));
            }

            let mut settings = SourceSettings::defaults(id);
            settings.enabled = entry.enabled;
            if let Some(base_url) = entry.base_url.as_ref().filter(|u| !u.trim().is_empty()) {
                settings.base_url = base_url.trim().to_string();
            }
            if let Some(attempts) = entry.max_attempts {
                settings.max_attempts = attempts.max(1);
            }
            if let Some(ms) = entry.retry_delay_ms {
                settings.retry_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = entry.cooldown_ms {
                settings.cooldown = Duration::from_millis(ms);
            }
            sources.push(settings);
        }

        if sources.is_empty() {
            sources = SourceId::ALL.into_iter().map(SourceSettings::defaults).collect();
        } else {
            for id in SourceId::ALL {
                if !seen.contains(&id) {
                    let mut settings = SourceSettings::defaults(id);
                    settings.enabled = false;
                    sources.push(settings);
                }
            }
        }

        for settings in &mut sources {
            let toml_key = toml_config
                .sources
                .iter()
                .find(|e| e.id.parse::<SourceId>().ok() == Some(settings.id))
                .and_then(|e| e.api_key.as_deref());
            settings.api_key = resolve_api_key(settings.id, toml_key);

            if settings.enabled && settings.id == SourceId::PrimarySpecies && settings.api_key.is_none() {
                warn!(
                    source = %settings.id,
                    env = %api_key_env_var(settings.id),
                    "No API key configured; requests will be rejected by the provider"
                );
            }
        }

        Ok(Self {
            sources,
            cache_ttl: Duration::from_secs(
                toml_config.cache.ttl_hours.max(1).saturating_mul(60 * 60),
            ),
        })
    }

    pub fn settings(&self, id: SourceId) -> Option<&SourceSettings> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn is_enabled(&self, id: SourceId) -> bool {
        self.settings(id).map(|s| s.enabled).unwrap_or(false)
    }

    /// Declared priority order
    pub fn priority(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id).collect()
    }

    pub fn toggles(&self) -> SourceToggles {
        SourceToggles::new(self.sources.iter().map(|s| (s.id, s.enabled)))
    }

    pub fn set_enabled(&mut self, id: SourceId, enabled: bool) {
        if let Some(settings) = self.sources.iter_mut().find(|s| s.id == id) {
            settings.enabled = enabled;
        }
    }
}
