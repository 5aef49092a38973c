//! Core types shared by every layer of the catalog
//!
//! `CanonicalRecord` is the single source-agnostic shape handed to the UI.
//! It is a strict superset of every provider's fields: absent values carry
//! sentinels, never `None`, so renderers can show a best-effort card for any
//! source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display sentinel for absent strings
pub const NOT_AVAILABLE: &str = "N/A";

/// True when a display string carries real content (not empty, not the sentinel)
pub fn is_present(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != NOT_AVAILABLE
}

// ============================================================================
// Sources
// ============================================================================

/// Identifier of one external data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    /// Primary species database (care and toxicity flags, images)
    #[serde(rename = "primary-species-db")]
    PrimarySpecies,
    /// Community taxonomy service (ranks, observation counts)
    #[serde(rename = "community-taxonomy")]
    CommunityTaxonomy,
    /// Toxicity database (toxic-to lists, symptoms)
    #[serde(rename = "toxicity-db")]
    Toxicity,
}

impl SourceId {
    /// All sources in their default priority order
    pub const ALL: [SourceId; 3] = [
        SourceId::PrimarySpecies,
        SourceId::CommunityTaxonomy,
        SourceId::Toxicity,
    ];

    /// Configuration identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::PrimarySpecies => "primary-species-db",
            SourceId::CommunityTaxonomy => "community-taxonomy",
            SourceId::Toxicity => "toxicity-db",
        }
    }

    /// Short tag used as the prefix of record ids
    pub fn tag(&self) -> &'static str {
        match self {
            SourceId::PrimarySpecies => "perenual",
            SourceId::CommunityTaxonomy => "inat",
            SourceId::Toxicity => "toxic",
        }
    }

    /// Entity type used in cache keys (`<entity-type>_<id>`)
    pub fn entity_type(&self) -> &'static str {
        match self {
            SourceId::PrimarySpecies => "species",
            SourceId::CommunityTaxonomy => "taxon",
            SourceId::Toxicity => "toxicplant",
        }
    }

    pub fn from_tag(tag: &str) -> Option<SourceId> {
        SourceId::ALL.into_iter().find(|s| s.tag() == tag)
    }

    /// Compose a record id from this source's tag and a native identifier
    pub fn record_id(&self, native_id: &str) -> String {
        format!("{}-{}", self.tag(), native_id)
    }

    /// Split a record id into its source and native identifier
    pub fn parse_record_id(id: &str) -> Option<(SourceId, &str)> {
        let (tag, native) = id.split_once('-')?;
        let source = SourceId::from_tag(tag)?;
        if native.is_empty() {
            return None;
        }
        Some((source, native))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted || id.tag() == wanted)
            .ok_or_else(|| format!("unknown source '{}'", s))
    }
}

// ============================================================================
// Kingdom restriction
// ============================================================================

/// Taxonomic kingdom a search can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kingdom {
    Plantae,
    Fungi,
}

/// Name fragments that mark a record as fungal when no taxonomy is available
const FUNGAL_MARKERS: &[&str] = &[
    "mushroom",
    "fung",
    "toadstool",
    "bolete",
    "boletus",
    "amanita",
    "agaric",
    "russula",
    "lactarius",
    "cortinarius",
    "mycena",
    "morel",
    "morchella",
    "truffle",
    "tuber ",
    "chanterelle",
    "cantharellus",
    "puffball",
    "lycoperdon",
    "bracket",
    "polypore",
    "lichen",
    "mold",
    "mould",
    "psilocybe",
    "galerina",
    "pleurotus",
];

impl Kingdom {
    /// Value of the community taxonomy's iconic taxon filter
    pub fn iconic_taxon(&self) -> &'static str {
        match self {
            Kingdom::Plantae => "Plantae",
            Kingdom::Fungi => "Fungi",
        }
    }

    /// Client-side substring filter against a record's name fields
    pub fn matches_names(&self, names: &[&str]) -> bool {
        let fungal = names.iter().any(|name| {
            let lower = name.to_lowercase();
            FUNGAL_MARKERS.iter().any(|marker| lower.contains(marker))
        });
        match self {
            Kingdom::Fungi => fungal,
            Kingdom::Plantae => !fungal,
        }
    }
}

impl fmt::Display for Kingdom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.iconic_taxon())
    }
}

impl FromStr for Kingdom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plantae" | "plant" | "plants" => Ok(Kingdom::Plantae),
            "fungi" | "fungus" | "mushrooms" => Ok(Kingdom::Fungi),
            other => Err(format!("unknown kingdom '{}'", other)),
        }
    }
}

// ============================================================================
// Canonical record
// ============================================================================

/// Unified, source-agnostic representation of one plant or fungus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    /// `<source tag>-<native id>`; stable for the life of the provider record
    pub id: String,
    pub source: SourceId,
    pub common_name: String,
    pub scientific_name: String,
    pub description: String,
    pub image_url: String,
    pub external_reference_url: String,
    pub attributes: RecordAttributes,
}

impl CanonicalRecord {
    /// Deduplication key: trimmed, lower-cased scientific name, else common name
    ///
    /// Returns `None` when neither name carries content.
    pub fn dedup_key(&self) -> Option<String> {
        [&self.scientific_name, &self.common_name]
            .into_iter()
            .find(|name| is_present(name))
            .map(|name| name.trim().to_lowercase())
    }

    /// Name most suitable for display
    pub fn display_name(&self) -> &str {
        if is_present(&self.common_name) {
            &self.common_name
        } else {
            &self.scientific_name
        }
    }
}

/// Source-specific attribute bag
///
/// Superset of all known provider fields. Display strings default to
/// `"N/A"`, flags to `false`, counts to `0`, joined lists to `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttributes {
    // Care requirements (primary species db)
    pub cycle: String,
    pub watering: String,
    pub sunlight: String,
    pub care_level: String,
    pub other_names: String,

    // Toxicity
    pub poisonous_to_humans: bool,
    pub poisonous_to_pets: bool,
    pub toxicity_level: String,
    pub toxic_to: String,
    pub toxic_parts: String,
    pub symptoms: String,

    // Taxonomy
    pub rank: String,
    pub kingdom: String,
    pub family: String,
    pub genus: String,
    pub observations_count: u64,
}

impl Default for RecordAttributes {
    fn default() -> Self {
        Self {
            cycle: NOT_AVAILABLE.to_string(),
            watering: NOT_AVAILABLE.to_string(),
            sunlight: String::new(),
            care_level: NOT_AVAILABLE.to_string(),
            other_names: String::new(),
            poisonous_to_humans: false,
            poisonous_to_pets: false,
            toxicity_level: NOT_AVAILABLE.to_string(),
            toxic_to: String::new(),
            toxic_parts: String::new(),
            symptoms: NOT_AVAILABLE.to_string(),
            rank: NOT_AVAILABLE.to_string(),
            kingdom: NOT_AVAILABLE.to_string(),
            family: NOT_AVAILABLE.to_string(),
            genus: NOT_AVAILABLE.to_string(),
            observations_count: 0,
        }
    }
}
