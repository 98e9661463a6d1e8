//! Outfit recommendation.
//!
//! Renders the full inventory into a one-line-per-item wardrobe
//! description, asks the oracle for a complete outfit given the user's
//! mood, weather, and occasion, then matches the free-text reply back
//! against the inventory to return the concrete items it mentioned.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::{not_found, precondition};
use crate::models::WardrobeItem;
use crate::oracle::Oracle as _;
use crate::scan::load_inventory;
use crate::AppContext;

/// User preferences for one recommendation.
#[derive(Debug, Clone, Deserialize)]
pub struct OutfitRequest {
    pub mood: String,
    pub weather: String,
    pub occasion: String,
}

impl OutfitRequest {
    fn validate(&self) -> Result<()> {
        if self.mood.trim().is_empty()
            || self.weather.trim().is_empty()
            || self.occasion.trim().is_empty()
        {
            return Err(precondition("mood, weather, and occasion are all required"));
        }
        Ok(())
    }
}

/// The oracle's free-text suggestion plus the inventory items it named.
#[derive(Debug, Clone, Serialize)]
pub struct OutfitRecommendation {
    pub recommendation: String,
    pub outfit: Vec<WardrobeItem>,
}

/// Generate an outfit recommendation from the current inventory.
pub async fn recommend(ctx: &AppContext, request: &OutfitRequest) -> Result<OutfitRecommendation> {
    request.validate()?;

    let inventory = load_inventory(&ctx.metadata, &ctx.config.scan).await?;
    if inventory.is_empty() {
        return Err(not_found("no wardrobe items found"));
    }

    let prompt = render_prompt(&inventory, request);
    let recommendation = ctx.oracle.complete(&prompt).await?;
    let outfit = match_outfit(&inventory, &recommendation);

    Ok(OutfitRecommendation {
        recommendation,
        outfit,
    })
}

fn render_prompt(inventory: &[WardrobeItem], request: &OutfitRequest) -> String {
    let wardrobe: Vec<String> = inventory.iter().map(describe_item).collect();
    format!(
        "Given the following wardrobe and user preferences, suggest an appropriate outfit:\n\n\
         Wardrobe:\n{}\n\n\
         User preferences:\n\
         Mood: {}\n\
         Weather: {}\n\
         Occasion: {}\n\n\
         Please suggest a complete outfit that matches the user's preferences and the weather \
         conditions, using items from the wardrobe. The outfit should include a combination of \
         top, bottom (or dress), accessories, jacket (if appropriate), and shoes. Be specific in \
         your recommendations, mentioning the exact items from the wardrobe to use for each part \
         of the outfit.",
        wardrobe.join("\n"),
        request.mood,
        request.weather,
        request.occasion,
    )
}

/// One inventory line in the prompt. Missing attributes fall back to
/// neutral phrasing so every item stays describable.
fn describe_item(item: &WardrobeItem) -> String {
    let colors = if item.colors.is_empty() {
        "unknown color".to_string()
    } else {
        item.colors.join(", ")
    };
    let weather = if item.weather.is_empty() {
        "any weather".to_string()
    } else {
        item.weather.join(", ")
    };
    format!(
        "{} ({}): {} {}, suitable for {}",
        item.name,
        item.category.as_str(),
        colors,
        item.fabric,
        weather
    )
}

/// Items whose names appear in the recommendation text, matched
/// case-insensitively and returned in inventory order.
fn match_outfit(inventory: &[WardrobeItem], recommendation: &str) -> Vec<WardrobeItem> {
    let haystack = recommendation.to_lowercase();
    inventory
        .iter()
        .filter(|item| {
            let name = item.name.trim().to_lowercase();
            !name.is_empty() && haystack.contains(&name)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn item(name: &str, category: Category) -> WardrobeItem {
        WardrobeItem {
            id: name.to_lowercase().replace(' ', ""),
            name: name.to_string(),
            category,
            ..WardrobeItem::default()
        }
    }

    #[test]
    fn matches_names_case_insensitively_in_inventory_order() {
        let inventory = vec![
            item("Blue Jeans", Category::Bottoms),
            item("White Tee", Category::Tops),
            item("Red Scarf", Category::Accessories),
        ];
        let text = "Wear the WHITE TEE with your blue jeans.";
        let outfit = match_outfit(&inventory, text);
        let names: Vec<_> = outfit.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Blue Jeans", "White Tee"]);
    }

    #[test]
    fn empty_names_never_match() {
        let inventory = vec![item("", Category::Other)];
        assert!(match_outfit(&inventory, "anything at all").is_empty());
    }

    #[test]
    fn describe_falls_back_for_missing_attributes() {
        let bare = item("Plain Shirt", Category::Tops);
        let line = describe_item(&bare);
        assert!(line.contains("unknown color"));
        assert!(line.contains("any weather"));
    }

    #[test]
    fn blank_preferences_are_rejected() {
        let request = OutfitRequest {
            mood: "happy".into(),
            weather: "  ".into(),
            occasion: "work".into(),
        };
        assert!(request.validate().is_err());
    }
}
