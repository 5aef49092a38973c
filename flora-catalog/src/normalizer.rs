//! Normalizer: provider JSON → `CanonicalRecord`
//!
//! The only place provider shapes are understood. Decoding turns a JSON value
//! into the source's typed raw record and fails only when the value cannot be
//! read as that record at all (not an object, wildly wrong field types, no way
//! to identify it). Normalizing a decoded record is total: every absent field
//! becomes its sentinel.
//!
//! # Sentinels
//! - display strings → `"N/A"`
//! - flags → `false`, counts → `0`
//! - lists joined into one display string → `""`

use crate::error::FetchError;
use crate::sources::{texts, InatTaxon, PerenualSpecies, Scalar, ToxicPlant};
use crate::types::{is_present, CanonicalRecord, RecordAttributes, SourceId, NOT_AVAILABLE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Reference link base for synthesized external URLs
const REFERENCE_BASE_URL: &str = "https://en.wikipedia.org/wiki/";

/// Free-tier providers replace premium fields with this notice
const UPGRADE_NOTICE_PREFIX: &str = "upgrade plans";

/// Provider-specific record, tagged by source
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    PrimarySpecies(PerenualSpecies),
    CommunityTaxon(InatTaxon),
    ToxicPlant(ToxicPlant),
}

impl RawRecord {
    pub fn source(&self) -> SourceId {
        match self {
            RawRecord::PrimarySpecies(_) => SourceId::PrimarySpecies,
            RawRecord::CommunityTaxon(_) => SourceId::CommunityTaxonomy,
            RawRecord::ToxicPlant(_) => SourceId::Toxicity,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one JSON value into the source's raw record
pub fn decode(source: SourceId, value: Value) -> Result<RawRecord, FetchError> {
    if !value.is_object() {
        return Err(malformed(source, "record is not a JSON object"));
    }

    let raw = match source {
        SourceId::PrimarySpecies => RawRecord::PrimarySpecies(typed(source, value)?),
        SourceId::CommunityTaxonomy => RawRecord::CommunityTaxon(typed(source, value)?),
        SourceId::Toxicity => RawRecord::ToxicPlant(typed(source, value)?),
    };

    if native_id(&raw).is_none() {
        return Err(malformed(source, "record has neither an id nor a name"));
    }
    Ok(raw)
}

fn typed<T: DeserializeOwned>(source: SourceId, value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|e| malformed(source, &e.to_string()))
}

fn malformed(source: SourceId, reason: &str) -> FetchError {
    FetchError::MalformedResponse {
        source_id: source,
        reason: reason.to_string(),
    }
}

/// Decode and normalize a single record (by-id lookups)
pub fn normalize_value(source: SourceId, value: Value) -> Result<CanonicalRecord, FetchError> {
    decode(source, value).map(|raw| normalize(&raw))
}

/// Decode and normalize a list, dropping records that cannot be decoded
pub fn normalize_all(source: SourceId, values: Vec<Value>) -> Vec<CanonicalRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match normalize_value(source, value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(source = %source, index, error = %e, "Dropping malformed record");
                None
            }
        })
        .collect()
}

// ============================================================================
// Normalization
// ============================================================================

/// Map a raw record to the canonical shape. Never fails.
pub fn normalize(raw: &RawRecord) -> CanonicalRecord {
    let source = raw.source();
    let native = native_id(raw).unwrap_or_else(|| "unknown".to_string());
    let mut record = match raw {
        RawRecord::PrimarySpecies(species) => normalize_species(species),
        RawRecord::CommunityTaxon(taxon) => normalize_taxon(taxon),
        RawRecord::ToxicPlant(plant) => normalize_toxic_plant(plant),
    };
    record.id = source.record_id(&native);
    record.source = source;

    if !is_present(&record.external_reference_url) {
        record.external_reference_url =
            reference_url(&record.scientific_name).unwrap_or_else(|| {
                reference_url(&record.common_name).unwrap_or_else(|| NOT_AVAILABLE.to_string())
            });
    }
    record
}

/// Native identifier: provider id, else a slug of the best available name
fn native_id(raw: &RawRecord) -> Option<String> {
    let (id, names): (Option<&Scalar>, Vec<String>) = match raw {
        RawRecord::PrimarySpecies(s) => (
            s.id.as_ref(),
            first_of(texts(s.scientific_name.clone()), s.common_name.as_deref()),
        ),
        RawRecord::CommunityTaxon(t) => (
            t.id.as_ref(),
            [t.name.clone(), t.preferred_common_name.clone()]
                .into_iter()
                .flatten()
                .collect(),
        ),
        RawRecord::ToxicPlant(p) => (
            p.id.as_ref(),
            first_of(texts(p.scientific_name.clone()), p.name.as_deref()),
        ),
    };

    id.and_then(Scalar::as_text)
        .or_else(|| names.iter().map(|n| slugify(n)).find(|slug| !slug.is_empty()))
}

fn first_of(mut names: Vec<String>, fallback: Option<&str>) -> Vec<String> {
    names.extend(fallback.map(str::to_string));
    names
}

fn empty_record() -> CanonicalRecord {
    CanonicalRecord {
        id: String::new(),
        source: SourceId::PrimarySpecies,
        common_name: NOT_AVAILABLE.to_string(),
        scientific_name: NOT_AVAILABLE.to_string(),
        description: NOT_AVAILABLE.to_string(),
        image_url: NOT_AVAILABLE.to_string(),
        external_reference_url: NOT_AVAILABLE.to_string(),
        attributes: RecordAttributes::default(),
    }
}

fn normalize_species(species: &PerenualSpecies) -> CanonicalRecord {
    let image = species.default_image.as_ref().and_then(|img| {
        [
            &img.regular_url,
            &img.medium_url,
            &img.original_url,
            &img.small_url,
            &img.thumbnail,
        ]
        .into_iter()
        .find_map(|url| usable(url.as_deref()))
    });

    let (scientific_name, synonyms) = primary_and_rest(texts(species.scientific_name.clone()));

    CanonicalRecord {
        common_name: display(species.common_name.as_deref()),
        scientific_name,
        description: display(species.description.as_deref()),
        image_url: image.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        attributes: RecordAttributes {
            cycle: display_enum(species.cycle.as_deref()),
            watering: display_enum(species.watering.as_deref()),
            sunlight: join(
                texts(species.sunlight.clone()).iter().map(|s| sentence_case(s)),
                ", ",
            ),
            care_level: display_enum(species.care_level.as_deref()),
            other_names: join(synonyms.into_iter().chain(texts(species.other_name.clone())), ", "),
            poisonous_to_humans: flag(species.poisonous_to_humans.as_ref()),
            poisonous_to_pets: flag(species.poisonous_to_pets.as_ref()),
            family: display(species.family.as_deref()),
            genus: display(species.genus.as_deref()),
            kingdom: "Plantae".to_string(),
            ..RecordAttributes::default()
        },
        ..empty_record()
    }
}

fn normalize_taxon(taxon: &InatTaxon) -> CanonicalRecord {
    let ancestor = |rank: &str| {
        taxon
            .ancestors
            .iter()
            .flatten()
            .find(|a| a.rank.as_deref().map(|r| r.eq_ignore_ascii_case(rank)) == Some(true))
            .and_then(|a| a.name.clone())
    };
    let image = taxon.default_photo.as_ref().and_then(|photo| {
        [&photo.medium_url, &photo.url, &photo.square_url]
            .into_iter()
            .find_map(|url| usable(url.as_deref()))
    });

    CanonicalRecord {
        common_name: display(taxon.preferred_common_name.as_deref()),
        scientific_name: display(taxon.name.as_deref()),
        description: display(taxon.wikipedia_summary.as_deref().map(strip_markup).as_deref()),
        image_url: image.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        external_reference_url: display(taxon.wikipedia_url.as_deref()),
        attributes: RecordAttributes {
            rank: display_enum(taxon.rank.as_deref()),
            kingdom: display_enum(taxon.iconic_taxon_name.as_deref()),
            family: display(ancestor("family").as_deref()),
            genus: display(ancestor("genus").as_deref()),
            observations_count: taxon
                .observations_count
                .as_ref()
                .map(Scalar::as_count)
                .unwrap_or(0),
            ..RecordAttributes::default()
        },
        ..empty_record()
    }
}

fn normalize_toxic_plant(plant: &ToxicPlant) -> CanonicalRecord {
    let toxic_to: Vec<String> = texts(plant.toxic_to.clone())
        .iter()
        .flat_map(|entry| split_list(entry))
        .map(|s| sentence_case(&s))
        .collect();
    let affects = |needles: &[&str]| {
        toxic_to.iter().any(|target| {
            let lower = target.to_lowercase();
            needles.iter().any(|n| lower.contains(n))
        })
    };

    let (scientific_name, synonyms) = primary_and_rest(texts(plant.scientific_name.clone()));

    CanonicalRecord {
        common_name: display(plant.name.as_deref()),
        scientific_name,
        description: display(plant.description.as_deref()),
        image_url: usable(plant.image.as_deref()).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        external_reference_url: display(plant.reference_url.as_deref()),
        attributes: RecordAttributes {
            poisonous_to_humans: affects(&["human", "people", "child"]),
            poisonous_to_pets: affects(&["cat", "dog", "horse", "pet", "animal"]),
            toxicity_level: display_enum(plant.toxicity.as_deref()),
            other_names: join(synonyms, ", "),
            toxic_to: join(toxic_to.iter().cloned(), ", "),
            toxic_parts: join(texts(plant.toxic_parts.clone()), ", "),
            symptoms: join_or_sentinel(texts(plant.symptoms.clone()), ", "),
            family: display(plant.family.as_deref()),
            ..RecordAttributes::default()
        },
        ..empty_record()
    }
}

// ============================================================================
// Field helpers
// ============================================================================

/// Trimmed text, or `None` when blank or replaced by an upgrade notice
fn usable(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.to_lowercase().starts_with(UPGRADE_NOTICE_PREFIX) {
        return None;
    }
    Some(trimmed.to_string())
}

fn display(value: Option<&str>) -> String {
    usable(value).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Enum-like provider values arrive in any casing; show them sentence-cased
fn display_enum(value: Option<&str>) -> String {
    usable(value)
        .map(|v| sentence_case(&v))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn flag(value: Option<&Scalar>) -> bool {
    value.map(Scalar::truthy).unwrap_or(false)
}

fn join(items: impl IntoIterator<Item = String>, separator: &str) -> String {
    items
        .into_iter()
        .filter_map(|item| usable(Some(item.as_str())))
        .collect::<Vec<_>>()
        .join(separator)
}

fn join_or_sentinel(items: Vec<String>, separator: &str) -> String {
    let joined = join(items, separator);
    if joined.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        joined
    }
}

/// First usable name for display, the rest as alternates
fn primary_and_rest(names: Vec<String>) -> (String, Vec<String>) {
    let mut names = names.into_iter().filter_map(|n| usable(Some(n.as_str())));
    let primary = names.next().unwrap_or_else(|| NOT_AVAILABLE.to_string());
    (primary, names.collect())
}

fn split_list(entry: &str) -> Vec<String> {
    entry
        .split([',', ';'])
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// "FULL SUN" / "full sun" → "Full sun"
pub fn sentence_case(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-case slug for identifiers derived from names
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Deterministic reference link: whitespace → '_', then URL-encode
pub fn reference_url(name: &str) -> Option<String> {
    if !is_present(name) {
        return None;
    }
    let underscored = name.split_whitespace().collect::<Vec<_>>().join("_");
    let encoded: String = url::form_urlencoded::byte_serialize(underscored.as_bytes()).collect();
    Some(format!("{}{}", REFERENCE_BASE_URL, encoded))
}

/// Drop HTML tags from provider summaries
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_fields_absent_yields_sentinels() {
        let record = normalize(&RawRecord::PrimarySpecies(PerenualSpecies::default()));

        assert_eq!(record.id, "perenual-unknown");
        assert_eq!(record.source, SourceId::PrimarySpecies);
        assert_eq!(record.common_name, NOT_AVAILABLE);
        assert_eq!(record.scientific_name, NOT_AVAILABLE);
        assert_eq!(record.description, NOT_AVAILABLE);
        assert_eq!(record.image_url, NOT_AVAILABLE);
        assert_eq!(record.external_reference_url, NOT_AVAILABLE);
        assert_eq!(record.attributes.cycle, NOT_AVAILABLE);
        assert_eq!(record.attributes.sunlight, "");
        assert_eq!(record.attributes.other_names, "");
        assert!(!record.attributes.poisonous_to_pets);
        assert_eq!(record.attributes.observations_count, 0);
    }

    #[test]
    fn test_every_source_is_total_on_empty_records() {
        for raw in [
            RawRecord::PrimarySpecies(PerenualSpecies::default()),
            RawRecord::CommunityTaxon(InatTaxon::default()),
            RawRecord::ToxicPlant(ToxicPlant::default()),
        ] {
            let record = normalize(&raw);
            assert_eq!(record.source, raw.source());
            assert_eq!(record.common_name, NOT_AVAILABLE);
            assert_eq!(record.attributes.toxic_to, "");
            assert_eq!(record.attributes.symptoms, NOT_AVAILABLE);
        }
    }

    #[test]
    fn test_species_normalization() {
        let record = normalize_value(
            SourceId::PrimarySpecies,
            json!({
                "id": 425,
                "common_name": "Dog Rose",
                "scientific_name": ["Rosa canina"],
                "other_name": ["Briar", "Wild rose"],
                "cycle": "PERENNIAL",
                "watering": "average",
                "sunlight": ["full sun", "Part shade"],
                "poisonous_to_pets": 0,
                "poisonous_to_humans": true,
                "default_image": {
                    "regular_url": "Upgrade Plans To Premium/Supreme - https://perenual.com/subscription-api-pricing",
                    "thumbnail": "https://img.example/rose-thumb.jpg"
                }
            }),
        )
        .unwrap();

        assert_eq!(record.id, "perenual-425");
        assert_eq!(record.scientific_name, "Rosa canina");
        assert_eq!(record.image_url, "https://img.example/rose-thumb.jpg");
        assert_eq!(record.external_reference_url, "https://en.wikipedia.org/wiki/Rosa_canina");
        assert_eq!(record.attributes.cycle, "Perennial");
        assert_eq!(record.attributes.watering, "Average");
        assert_eq!(record.attributes.sunlight, "Full sun, Part shade");
        assert_eq!(record.attributes.other_names, "Briar, Wild rose");
        assert!(record.attributes.poisonous_to_humans);
        assert!(!record.attributes.poisonous_to_pets);
    }

    #[test]
    fn test_extra_scientific_names_become_other_names() {
        let species = normalize_value(
            SourceId::PrimarySpecies,
            json!({
                "id": 7,
                "common_name": "Silver fir",
                "scientific_name": ["Abies alba", " ", "Abies pectinata"],
                "other_name": ["Christmas tree"]
            }),
        )
        .unwrap();

        assert_eq!(species.scientific_name, "Abies alba");
        assert_eq!(species.dedup_key().as_deref(), Some("abies alba"));
        assert_eq!(species.attributes.other_names, "Abies pectinata, Christmas tree");

        let plant = normalize_value(
            SourceId::Toxicity,
            json!({
                "id": 3,
                "name": "Foxglove",
                "scientific_name": ["Digitalis purpurea", "Digitalis tomentosa"]
            }),
        )
        .unwrap();

        assert_eq!(plant.scientific_name, "Digitalis purpurea");
        assert_eq!(plant.attributes.other_names, "Digitalis tomentosa");
    }

    #[test]
    fn test_taxon_normalization() {
        let record = normalize_value(
            SourceId::CommunityTaxonomy,
            json!({
                "id": 48715,
                "name": "Amanita phalloides",
                "preferred_common_name": "Death Cap",
                "rank": "SPECIES",
                "iconic_taxon_name": "Fungi",
                "observations_count": 10832,
                "wikipedia_url": "http://en.wikipedia.org/wiki/Amanita_phalloides",
                "wikipedia_summary": "<b>Amanita phalloides</b>, commonly known as the death cap",
                "ancestors": [{"rank": "genus", "name": "Amanita"}]
            }),
        )
        .unwrap();

        assert_eq!(record.id, "inat-48715");
        assert_eq!(record.common_name, "Death Cap");
        assert_eq!(record.description, "Amanita phalloides, commonly known as the death cap");
        assert_eq!(
            record.external_reference_url,
            "http://en.wikipedia.org/wiki/Amanita_phalloides"
        );
        assert_eq!(record.attributes.rank, "Species");
        assert_eq!(record.attributes.kingdom, "Fungi");
        assert_eq!(record.attributes.genus, "Amanita");
        assert_eq!(record.attributes.family, NOT_AVAILABLE);
        assert_eq!(record.attributes.observations_count, 10832);
    }

    #[test]
    fn test_toxic_plant_without_id_uses_name_slug() {
        let record = normalize_value(
            SourceId::Toxicity,
            json!({
                "name": "Lily of the Valley",
                "scientific_name": "Convallaria majalis",
                "toxicity": "severe",
                "toxic_to": "CATS, dogs; Horses",
                "toxic_parts": ["leaves", "flowers"],
                "symptoms": ["Vomiting", "Arrhythmia"]
            }),
        )
        .unwrap();

        assert_eq!(record.id, "toxic-convallaria-majalis");
        assert_eq!(record.attributes.toxicity_level, "Severe");
        assert_eq!(record.attributes.toxic_to, "Cats, Dogs, Horses");
        assert_eq!(record.attributes.toxic_parts, "leaves, flowers");
        assert_eq!(record.attributes.symptoms, "Vomiting, Arrhythmia");
        assert!(record.attributes.poisonous_to_pets);
        assert!(!record.attributes.poisonous_to_humans);
    }

    #[test]
    fn test_unidentifiable_and_broken_records_are_malformed() {
        assert!(matches!(
            decode(SourceId::Toxicity, json!({"toxicity": "mild"})),
            Err(FetchError::MalformedResponse { .. })
        ));
        assert!(decode(SourceId::PrimarySpecies, json!("just a string")).is_err());
        assert!(decode(SourceId::PrimarySpecies, json!({"id": {"nested": 1}})).is_err());
    }

    #[test]
    fn test_normalize_all_drops_only_broken_records() {
        let records = normalize_all(
            SourceId::CommunityTaxonomy,
            vec![
                json!({"id": 1, "name": "Rosa canina"}),
                json!(null),
                json!({"id": [1, 2]}),
                json!({"id": 2, "name": "Rosa rugosa"}),
            ],
        );

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["inat-1", "inat-2"]);
    }

    #[test]
    fn test_reference_url_encoding() {
        assert_eq!(
            reference_url("  Amanita   phalloides "),
            Some("https://en.wikipedia.org/wiki/Amanita_phalloides".to_string())
        );
        assert_eq!(
            reference_url("Kalanchoë daigremontiana"),
            Some("https://en.wikipedia.org/wiki/Kalancho%C3%AB_daigremontiana".to_string())
        );
        assert_eq!(reference_url(NOT_AVAILABLE), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Lily of the Valley! "), "lily-of-the-valley");
        assert_eq!(slugify("Rosa × damascena"), "rosa-damascena");
        assert_eq!(slugify("---"), "");
    }
}
