//! Core data models for the wardrobe service.
//!
//! These types represent the items, object references, and reports that
//! flow through the ingestion, reconciliation, and recommendation
//! pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::store::FieldMap;

/// Metadata-store key prefix under which all wardrobe records live.
pub const WARDROBE_PREFIX: &str = "wardrobe:";

/// Derive the metadata-store key for a wardrobe item id.
pub fn wardrobe_key(id: &str) -> String {
    format!("{}{}", WARDROBE_PREFIX, id)
}

/// Generate a fresh, high-entropy item id.
///
/// The hyphenless form keeps the [`ObjectRef`] pathname encoding
/// unambiguous: the first `-` in a pathname always separates the id from
/// the original filename.
pub fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The fixed, closed set of garment categories.
///
/// Categories are always derived by the normalizer
/// ([`crate::normalize::normalize_category`]), never typed by the user,
/// and serialize to their canonical spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Tops,
    Bottoms,
    Dresses,
    Outerwear,
    Footwear,
    Accessories,
    Suits,
    Sportswear,
    Sleepwear,
    Underwear,
    Other,
}

impl Category {
    /// All taxonomy members, in rule-evaluation order.
    pub const ALL: [Category; 11] = [
        Category::Tops,
        Category::Bottoms,
        Category::Dresses,
        Category::Outerwear,
        Category::Footwear,
        Category::Accessories,
        Category::Suits,
        Category::Sportswear,
        Category::Sleepwear,
        Category::Underwear,
        Category::Other,
    ];

    /// The canonical spelling stored and displayed for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tops => "Tops",
            Category::Bottoms => "Bottoms",
            Category::Dresses => "Dresses",
            Category::Outerwear => "Outerwear",
            Category::Footwear => "Footwear",
            Category::Accessories => "Accessories",
            Category::Suits => "Suits",
            Category::Sportswear => "Sportswear",
            Category::Sleepwear => "Sleepwear",
            Category::Underwear => "Underwear",
            Category::Other => "Other",
        }
    }

    /// Parse an exact canonical spelling back into a category.
    ///
    /// Returns `None` for anything else; free-form text goes through the
    /// normalizer instead.
    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reference to a stored image object.
///
/// Replaces ad-hoc pathname splitting with an explicit encoding contract:
/// the pathname renders as `"{id}-{filename}"`, and because ids are
/// hyphenless (see [`fresh_id`]), parsing splits on the *first* `-` only.
/// Filenames containing `-` round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// The wardrobe item id this object backs. Immutable.
    pub id: String,
    /// The original upload filename, kept for display fallbacks.
    pub filename: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
        }
    }

    /// Render the object-store pathname for this reference.
    pub fn pathname(&self) -> String {
        format!("{}-{}", self.id, self.filename)
    }

    /// Parse a pathname back into its id and filename halves.
    ///
    /// Returns `None` when the pathname does not follow the
    /// `"{id}-{filename}"` convention (no delimiter, or an empty half).
    pub fn parse(pathname: &str) -> Option<Self> {
        let (id, filename) = pathname.split_once('-')?;
        if id.is_empty() || filename.is_empty() {
            return None;
        }
        Some(Self::new(id, filename))
    }
}

/// The canonical persisted wardrobe entity.
///
/// Created once by the ingestion pipeline and never mutated in place;
/// removal deletes both the metadata record and the backing object.
/// Descriptive attributes default to empty strings or empty sequences —
/// never null — so downstream consumers need no null-checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    /// Globally unique, immutable primary key.
    pub id: String,
    /// Object-store pathname of the backing image. Set once at creation.
    pub pathname: String,
    /// Retrievable URL for the backing image.
    pub url: String,
    /// Human-readable label; defaults to the original filename.
    pub name: String,
    /// Normalized garment category.
    pub category: Category,
    #[serde(default)]
    pub fabric: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub fit: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub sleeves: String,
    #[serde(default)]
    pub length: String,
    #[serde(default)]
    pub occasions: Vec<String>,
    #[serde(default)]
    pub weather: Vec<String>,
}

impl WardrobeItem {
    /// Encode this item as a flat string-string record for the metadata
    /// store. Sequence fields are stored as JSON arrays.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), self.id.clone());
        fields.insert("pathname".into(), self.pathname.clone());
        fields.insert("url".into(), self.url.clone());
        fields.insert("name".into(), self.name.clone());
        fields.insert("category".into(), self.category.as_str().to_string());
        fields.insert("fabric".into(), self.fabric.clone());
        fields.insert("pattern".into(), self.pattern.clone());
        fields.insert("colors".into(), encode_list(&self.colors));
        fields.insert("fit".into(), self.fit.clone());
        fields.insert("style".into(), self.style.clone());
        fields.insert("sleeves".into(), self.sleeves.clone());
        fields.insert("length".into(), self.length.clone());
        fields.insert("occasions".into(), encode_list(&self.occasions));
        fields.insert("weather".into(), encode_list(&self.weather));
        fields
    }

    /// Decode a metadata record back into an item.
    ///
    /// Returns `None` when the record carries no `id` (it is not a
    /// wardrobe record). Sequence fields tolerate both JSON arrays and
    /// bare comma-separated strings, since older records mixed the two.
    pub fn from_fields(fields: &FieldMap) -> Option<Self> {
        let id = fields.get("id")?.clone();
        if id.is_empty() {
            return None;
        }
        let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let category = fields
            .get("category")
            .and_then(|s| Category::parse(s))
            .unwrap_or(Category::Other);
        Some(Self {
            id,
            pathname: text("pathname"),
            url: text("url"),
            name: text("name"),
            category,
            fabric: text("fabric"),
            pattern: text("pattern"),
            colors: decode_list(fields.get("colors")),
            fit: text("fit"),
            style: text("style"),
            sleeves: text("sleeves"),
            length: text("length"),
            occasions: decode_list(fields.get("occasions")),
            weather: decode_list(fields.get("weather")),
        })
    }
}

impl Default for WardrobeItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            pathname: String::new(),
            url: String::new(),
            name: String::new(),
            category: Category::Other,
            fabric: String::new(),
            pattern: String::new(),
            colors: Vec::new(),
            fit: String::new(),
            style: String::new(),
            sleeves: String::new(),
            length: String::new(),
            occasions: Vec::new(),
            weather: Vec::new(),
        }
    }
}

fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_default()
}

fn decode_list(raw: Option<&String>) -> Vec<String> {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r.trim(),
        _ => return Vec::new(),
    };
    if let Ok(values) = serde_json::from_str::<Vec<String>>(raw) {
        return values;
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A per-item failure collected during a batch operation.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    /// The filename, pathname, or key the failure belongs to.
    pub filename: String,
    /// Human-readable failure message.
    pub message: String,
}

/// Result of one ingestion batch: successful items alongside isolated
/// per-image failures. `items.len() + errors.len()` always equals the
/// batch size.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestOutcome {
    pub items: Vec<WardrobeItem>,
    pub errors: Vec<ItemError>,
}

impl IngestOutcome {
    pub fn success_count(&self) -> usize {
        self.items.len()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Objects that were missing metadata and were successfully re-ingested.
    pub processed: u64,
    /// Objects whose re-ingestion failed.
    pub failed: Vec<ItemError>,
}

/// Result of emptying both stores.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub records_deleted: u64,
    pub records_failed: Vec<ItemError>,
    pub objects_deleted: u64,
    pub objects_failed: Vec<ItemError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ref_round_trips() {
        let r = ObjectRef::new("abc123", "photo.jpg");
        assert_eq!(r.pathname(), "abc123-photo.jpg");
        assert_eq!(ObjectRef::parse("abc123-photo.jpg"), Some(r));
    }

    #[test]
    fn object_ref_keeps_dashes_in_filename() {
        let r = ObjectRef::new("abc123", "summer-beach-hat.png");
        let parsed = ObjectRef::parse(&r.pathname()).unwrap();
        assert_eq!(parsed.id, "abc123");
        assert_eq!(parsed.filename, "summer-beach-hat.png");
    }

    #[test]
    fn object_ref_rejects_malformed_pathnames() {
        assert_eq!(ObjectRef::parse("no_delimiter"), None);
        assert_eq!(ObjectRef::parse("-leading.jpg"), None);
        assert_eq!(ObjectRef::parse("trailing-"), None);
    }

    #[test]
    fn fresh_ids_are_hyphenless_and_distinct() {
        let a = fresh_id();
        let b = fresh_id();
        assert!(!a.contains('-'));
        assert_ne!(a, b);
    }

    #[test]
    fn category_canonical_spellings_parse_back() {
        for cat in Category::ALL {
            assert_eq!(Category::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(Category::parse("jacket"), None);
    }

    #[test]
    fn item_field_codec_round_trips() {
        let item = WardrobeItem {
            id: "id1".into(),
            pathname: "id1-shirt.jpg".into(),
            url: "https://example.com/id1-shirt.jpg".into(),
            name: "Blue Cotton Shirt".into(),
            category: Category::Tops,
            fabric: "cotton".into(),
            pattern: "solid".into(),
            colors: vec!["blue".into(), "white".into()],
            fit: "regular".into(),
            style: "casual".into(),
            sleeves: "short".into(),
            length: "hip".into(),
            occasions: vec!["work".into()],
            weather: vec!["warm".into()],
        };
        let decoded = WardrobeItem::from_fields(&item.to_fields()).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn from_fields_tolerates_comma_separated_lists() {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), "id2".into());
        fields.insert("colors".into(), "red, green".into());
        let item = WardrobeItem::from_fields(&fields).unwrap();
        assert_eq!(item.colors, vec!["red", "green"]);
        assert_eq!(item.category, Category::Other);
        assert_eq!(item.fabric, "");
        assert!(item.weather.is_empty());
    }

    #[test]
    fn from_fields_requires_an_id() {
        assert!(WardrobeItem::from_fields(&FieldMap::new()).is_none());
    }
}
