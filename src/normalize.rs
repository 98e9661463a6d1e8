//! Attribute normalizer.
//!
//! Maps the oracle's free-form attribute text onto the fixed category
//! taxonomy and a canonical record shape. The oracle guarantees no schema:
//! depending on the instruction it answers with JSON (sometimes wrapped in
//! markdown code fences) or with line-oriented `key: value` text, so both
//! shapes are parsed here and everything downstream sees one
//! [`RawAttributes`] struct with empty-string / empty-sequence defaults.
//!
//! # Category rules
//!
//! [`normalize_category`] runs an *ordered* list of substring rules,
//! case-insensitive, first match wins. The ordering is the documented
//! tie-break: text mentioning both "jacket" and "dress" resolves to
//! `Dresses` because that rule is evaluated first, not because either word
//! is more specific. Each category's own canonical spelling is among its
//! needles, which makes the function idempotent over canonical spellings.

use anyhow::{bail, Result};

use crate::models::{Category, ObjectRef, WardrobeItem};

/// Ordered substring rules, evaluated top to bottom. First match wins.
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (
        Category::Tops,
        &["top", "shirt", "blouse", "t-shirt", "sweater", "sweatshirt"],
    ),
    (
        Category::Bottoms,
        &["bottom", "pant", "trouser", "jeans", "skirt", "shorts"],
    ),
    (Category::Dresses, &["dress"]),
    (
        Category::Outerwear,
        &["outerwear", "coat", "jacket", "cardigan", "blazer"],
    ),
    (
        Category::Footwear,
        &["shoe", "boot", "sneaker", "sandal", "footwear", "slipper"],
    ),
    (
        Category::Accessories,
        &["accessor", "jewelry", "bag", "hat", "scarf", "belt"],
    ),
    (Category::Suits, &["suit"]),
    (Category::Sportswear, &["sport", "athletic"]),
    (Category::Sleepwear, &["sleep", "pajama"]),
    (Category::Underwear, &["underwear", "lingerie"]),
];

/// Map free-form category text onto the closed taxonomy.
///
/// Matching is substring-based and case-insensitive against
/// [`CATEGORY_RULES`]; no match falls back to [`Category::Other`].
pub fn normalize_category(text: &str) -> Category {
    let lowered = text.to_lowercase();
    let lowered = lowered.trim();
    for (category, needles) in CATEGORY_RULES {
        if needles.iter().any(|needle| lowered.contains(needle)) {
            return *category;
        }
    }
    Category::Other
}

/// Attribute fields extracted from one oracle response, before category
/// normalization and defaulting. Every field is present — empty when the
/// oracle omitted it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAttributes {
    pub name: String,
    pub category: String,
    pub fabric: String,
    pub pattern: String,
    pub fit: String,
    pub style: String,
    pub sleeves: String,
    pub length: String,
    pub colors: Vec<String>,
    pub occasions: Vec<String>,
    pub weather: Vec<String>,
}

/// Parse an oracle response into [`RawAttributes`].
///
/// Tries JSON first (stripping markdown code fences the oracle sometimes
/// adds), then falls back to line-oriented `key: value` text. Unknown
/// keys are ignored. Returns an error when the response is empty or
/// neither shape yields a single recognized attribute — the raw response
/// is then discarded rather than partially trusted.
pub fn parse_attributes(raw: &str) -> Result<RawAttributes> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("empty oracle response");
    }

    let unfenced = strip_code_fences(trimmed);
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(unfenced) {
        return Ok(from_json_object(&map));
    }

    let (attrs, recognized) = from_key_value_lines(trimmed);
    if recognized == 0 {
        bail!("oracle response is neither JSON nor key-value lines");
    }
    Ok(attrs)
}

/// Assemble a persisted item from a parsed oracle response.
///
/// Applies the defaults the data model promises: the category is
/// normalized onto the taxonomy, and `name` falls back to the original
/// upload filename when the oracle provided none.
pub fn build_item(object_ref: &ObjectRef, url: &str, raw: &RawAttributes) -> WardrobeItem {
    let name = if raw.name.trim().is_empty() {
        object_ref.filename.clone()
    } else {
        raw.name.trim().to_string()
    };
    WardrobeItem {
        id: object_ref.id.clone(),
        pathname: object_ref.pathname(),
        url: url.to_string(),
        name,
        category: normalize_category(&raw.category),
        fabric: raw.fabric.clone(),
        pattern: raw.pattern.clone(),
        colors: raw.colors.clone(),
        fit: raw.fit.clone(),
        style: raw.style.clone(),
        sleeves: raw.sleeves.clone(),
        length: raw.length.clone(),
        occasions: raw.occasions.clone(),
        weather: raw.weather.clone(),
    }
}

/// Strip a leading ```` ```json ```` (or bare ```` ``` ````) line and a
/// trailing fence line, when both are present.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let after_open = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => return text,
    };
    after_open
        .trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(after_open)
}

fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> RawAttributes {
    let mut attrs = RawAttributes::default();
    for (key, value) in map {
        assign(&mut attrs, &key.to_lowercase(), value);
    }
    attrs
}

/// JSON values may be strings or arrays of strings for any field; both
/// are accepted, matching the oracle's observed output.
fn assign(attrs: &mut RawAttributes, key: &str, value: &serde_json::Value) {
    match key {
        "name" => attrs.name = text_value(value),
        "category" => attrs.category = text_value(value),
        "fabric" | "material" => attrs.fabric = text_value(value),
        "pattern" | "print" => attrs.pattern = text_value(value),
        "fit" => attrs.fit = text_value(value),
        "style" => attrs.style = text_value(value),
        "sleeves" | "sleeve" => attrs.sleeves = text_value(value),
        "length" => attrs.length = text_value(value),
        "colors" | "color" | "colour" | "colours" => attrs.colors = list_value(value),
        "suitable_occasions" | "occasions" | "occasion" => attrs.occasions = list_value(value),
        "suitable_weather" | "weather" => attrs.weather = list_value(value),
        _ => {}
    }
}

fn text_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn list_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        serde_json::Value::String(s) => split_list(s),
        _ => Vec::new(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Parse line-oriented `key: value` text. Returns the attributes and how
/// many lines carried a recognized key. Values containing `:` keep
/// everything after the first delimiter.
fn from_key_value_lines(text: &str) -> (RawAttributes, usize) {
    let mut attrs = RawAttributes::default();
    let mut recognized = 0;
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "name" => attrs.name = value.to_string(),
            "category" => attrs.category = value.to_string(),
            "fabric" | "material" => attrs.fabric = value.to_string(),
            "pattern" | "print" => attrs.pattern = value.to_string(),
            "fit" => attrs.fit = value.to_string(),
            "style" => attrs.style = value.to_string(),
            "sleeves" | "sleeve" => attrs.sleeves = value.to_string(),
            "length" => attrs.length = value.to_string(),
            "colors" | "color" | "colour" | "colours" => attrs.colors = split_list(value),
            "suitable_occasions" | "occasions" | "occasion" => {
                attrs.occasions = split_list(value)
            }
            "suitable_weather" | "weather" => attrs.weather = split_list(value),
            _ => continue,
        }
        recognized += 1;
    }
    (attrs, recognized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_input_lands_in_the_taxonomy() {
        for text in ["denim jacket", "running shoes", "???", "", "chapeau"] {
            let cat = normalize_category(text);
            assert!(Category::ALL.contains(&cat));
        }
    }

    #[test]
    fn canonical_spellings_are_fixed_points() {
        for cat in Category::ALL {
            assert_eq!(normalize_category(cat.as_str()), cat, "{}", cat);
        }
    }

    #[test]
    fn rule_order_breaks_ties() {
        // Both "jacket" and "dress" match; the Dresses rule runs first.
        assert_eq!(normalize_category("jacket dress combo"), Category::Dresses);
        assert_eq!(normalize_category("denim jacket"), Category::Outerwear);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        assert_eq!(normalize_category("  Wool SWEATER  "), Category::Tops);
        assert_eq!(normalize_category("leather handbag"), Category::Accessories);
        assert_eq!(normalize_category("three-piece suit"), Category::Suits);
        assert_eq!(normalize_category("galoshes"), Category::Other);
    }

    #[test]
    fn parses_plain_json() {
        let attrs = parse_attributes(
            r#"{"category":"denim jacket","name":"Jean Jacket","colors":["blue"],"suitable_weather":["cool","mild"]}"#,
        )
        .unwrap();
        assert_eq!(attrs.name, "Jean Jacket");
        assert_eq!(attrs.category, "denim jacket");
        assert_eq!(attrs.colors, vec!["blue"]);
        assert_eq!(attrs.weather, vec!["cool", "mild"]);
        assert_eq!(attrs.fabric, "");
        assert!(attrs.occasions.is_empty());
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"category\": \"sneakers\", \"name\": \"White Runners\"}\n```";
        let attrs = parse_attributes(raw).unwrap();
        assert_eq!(attrs.name, "White Runners");
        assert_eq!(normalize_category(&attrs.category), Category::Footwear);
    }

    #[test]
    fn parses_key_value_lines() {
        let raw = "Name: Silk Scarf\nCategory: accessory\nColor: red, gold\nOccasion: evening, formal\nFabric: silk";
        let attrs = parse_attributes(raw).unwrap();
        assert_eq!(attrs.name, "Silk Scarf");
        assert_eq!(attrs.colors, vec!["red", "gold"]);
        assert_eq!(attrs.occasions, vec!["evening", "formal"]);
        assert_eq!(attrs.fabric, "silk");
    }

    #[test]
    fn keeps_colons_inside_line_values() {
        let attrs = parse_attributes("Name: Ratio 60:40 Blend Tee\nCategory: t-shirt").unwrap();
        assert_eq!(attrs.name, "Ratio 60:40 Blend Tee");
    }

    #[test]
    fn ignores_unknown_keys() {
        let attrs =
            parse_attributes(r#"{"category":"dress","frobnication":"max","name":"Sundress"}"#)
                .unwrap();
        assert_eq!(attrs.name, "Sundress");
    }

    #[test]
    fn rejects_unrecognizable_responses() {
        assert!(parse_attributes("").is_err());
        assert!(parse_attributes("I cannot analyze this image.").is_err());
        assert!(parse_attributes("[1, 2, 3]").is_err());
    }

    #[test]
    fn build_item_defaults_name_to_filename() {
        let object_ref = ObjectRef::new("id9", "mystery.jpg");
        let raw = RawAttributes {
            category: "unidentifiable".into(),
            ..Default::default()
        };
        let item = build_item(&object_ref, "https://example.com/x", &raw);
        assert_eq!(item.name, "mystery.jpg");
        assert_eq!(item.category, Category::Other);
        assert_eq!(item.id, "id9");
        assert_eq!(item.pathname, "id9-mystery.jpg");
    }
}
