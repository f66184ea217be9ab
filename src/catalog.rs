use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::model::Extents;

const BUNDLED_CATALOG_JSON: &str = include_str!("../assets/asset-catalog.json");

/// A catalog hit: where the asset lives and how big it is.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub key: String,
    pub category: String,
    pub asset_ref: String,
    pub extents: Extents,
    pub polygon_count: u32,
}

/// Read-only asset catalog. Shared across concurrent pipeline runs.
pub trait AssetCatalog: Send + Sync {
    /// Best match for an entity name: exact variant, then category fallback.
    fn lookup(&self, name: &str) -> Option<AssetInfo>;

    /// Candidate substitutions for a name, best first.
    fn substitutes(&self, name: &str) -> Vec<AssetInfo>;
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    #[allow(dead_code)]
    version: String,
    categories: Vec<CatalogCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogCategory {
    pub category: String,
    pub default: String,
    pub variants: Vec<CatalogVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVariant {
    pub key: String,
    pub path: String,
    pub polygons: u32,
    pub extents: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct StaticCatalog {
    categories: Vec<CatalogCategory>,
}

impl StaticCatalog {
    /// The catalog shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(BUNDLED_CATALOG_JSON).context("failed to load bundled asset catalog")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawCatalog = serde_json::from_str(text).context("failed to parse catalog json")?;
        Self::from_categories(raw.categories)
    }

    pub fn from_categories(categories: Vec<CatalogCategory>) -> Result<Self> {
        for c in &categories {
            if !c.variants.iter().any(|v| v.key == c.default) {
                bail!(
                    "catalog category '{}' names default '{}' which is not one of its variants",
                    c.category,
                    c.default
                );
            }
        }
        Ok(Self { categories })
    }

    /// Copy of this catalog without the named category.
    pub fn without(&self, category: &str) -> Self {
        Self {
            categories: self
                .categories
                .iter()
                .filter(|c| c.category != category)
                .cloned()
                .collect(),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.category.as_str())
    }

    fn info(category: &CatalogCategory, variant: &CatalogVariant) -> AssetInfo {
        let [w, d, h] = variant.extents;
        AssetInfo {
            key: variant.key.clone(),
            category: category.category.clone(),
            asset_ref: variant.path.clone(),
            extents: Extents::new(w, d, h),
            polygon_count: variant.polygons,
        }
    }

    fn default_of(category: &CatalogCategory) -> Option<AssetInfo> {
        category
            .variants
            .iter()
            .find(|v| v.key == category.default)
            .map(|v| Self::info(category, v))
    }

    fn category_for_words(&self, words: &[String]) -> Option<&CatalogCategory> {
        // The head noun sits last in English compounds ("desk lamp" is a lamp).
        words.iter().rev().find_map(|w| {
            self.categories.iter().find(|c| {
                let cat = c.category.as_str();
                w == cat || *w == format!("{cat}s") || format!("{w}s") == cat
            })
        })
    }
}

fn words_of(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

impl AssetCatalog for StaticCatalog {
    fn lookup(&self, name: &str) -> Option<AssetInfo> {
        let words = words_of(name);
        if words.is_empty() {
            return None;
        }
        let joined = words.join("_");

        for c in &self.categories {
            if let Some(v) = c.variants.iter().find(|v| v.key == joined) {
                return Some(Self::info(c, v));
            }
        }

        let category = self.category_for_words(&words)?;
        let refined = category.variants.iter().find(|v| {
            v.key != category.default && v.key.split('_').all(|part| words.iter().any(|w| w == part))
        });
        match refined {
            Some(v) => Some(Self::info(category, v)),
            None => Self::default_of(category),
        }
    }

    fn substitutes(&self, name: &str) -> Vec<AssetInfo> {
        let words = words_of(name);
        let mut out = Vec::new();
        for c in &self.categories {
            for v in c.variants.iter().filter(|v| v.key != c.default) {
                if v.key.split('_').any(|part| words.iter().any(|w| w == part)) {
                    out.push(Self::info(c, v));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticCatalog {
        StaticCatalog::bundled().expect("bundled catalog parses")
    }

    #[test]
    fn exact_variant_key_wins() {
        let hit = catalog().lookup("Desk Lamp").unwrap();
        assert_eq!(hit.key, "desk_lamp");
        assert_eq!(hit.category, "lamp");
    }

    #[test]
    fn category_falls_back_to_default_variant() {
        let hit = catalog().lookup("bed").unwrap();
        assert_eq!(hit.key, "standard_bed");
        assert_eq!(hit.extents, Extents::new(2.0, 1.6, 0.8));
    }

    #[test]
    fn variant_words_refine_category() {
        let hit = catalog().lookup("a wooden desk").unwrap();
        assert_eq!(hit.key, "wooden_desk");
    }

    #[test]
    fn plural_names_match_singular_categories() {
        assert_eq!(catalog().lookup("chairs").unwrap().category, "chair");
        assert_eq!(catalog().lookup("book").unwrap().category, "books");
    }

    #[test]
    fn unknown_names_miss() {
        assert!(catalog().lookup("spaceship").is_none());
        assert!(catalog().lookup("  ").is_none());
    }

    #[test]
    fn substitutes_share_a_word() {
        let subs = catalog().substitutes("statue");
        let keys: Vec<&str> = subs.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["bust_statue"]);
    }

    #[test]
    fn without_removes_category() {
        let c = catalog().without("desk");
        assert!(c.categories().all(|name| name != "desk"));
        assert_eq!(c.lookup("desk").map(|a| a.key), None);
    }

    #[test]
    fn default_must_exist() {
        let err = StaticCatalog::from_json_str(
            r#"{"version":"1","categories":[{"category":"x","default":"nope","variants":[]}]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
    }
}
