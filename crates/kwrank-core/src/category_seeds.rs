use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySeedConfig {
    /// Category name, e.g. `Health & Fitness`; matched by slug.
    pub category: String,
    /// Other names the storefronts use for this category, such as the
    /// Play codes `HEALTH_AND_FITNESS` or `GAME`.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeedsFile {
    pub categories: Vec<CategorySeedConfig>,
}

/// Seed keyword phrases per category. Every category name and alias is
/// indexed by its slug.
#[derive(Debug, Clone, Default)]
pub struct CategorySeeds {
    keywords: Vec<Vec<String>>,
    by_slug: HashMap<String, usize>,
}

impl CategorySeeds {
    /// Seed phrases for `category`, or an empty slice for unknown categories.
    ///
    /// A slug with no entry falls back to its leading words, so the Play code
    /// `GAME_PUZZLE` resolves through a `GAME` alias.
    #[must_use]
    pub fn for_category(&self, category: &str) -> &[String] {
        let mut slug = category_slug(category);
        loop {
            if let Some(&idx) = self.by_slug.get(&slug) {
                return &self.keywords[idx];
            }
            match slug.rfind('-') {
                Some(cut) => slug.truncate(cut),
                None => return &[],
            }
        }
    }

    /// Number of categories, not counting aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Lowercase a category name and join its words with `-`, dropping `and`.
///
/// `"Health & Fitness"` and `HEALTH_AND_FITNESS` both become `health-fitness`.
#[must_use]
pub fn category_slug(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty() && *s != "and")
        .collect::<Vec<_>>()
        .join("-")
}

/// Load and validate the category seed list from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_category_seeds(path: &Path) -> Result<CategorySeeds, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SeedsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_category_seeds(&content)
}

/// Parse and validate category seeds from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_category_seeds(content: &str) -> Result<CategorySeeds, ConfigError> {
    let file: CategorySeedsFile =
        serde_yaml::from_str(content).map_err(ConfigError::SeedsFileParse)?;
    validate_category_seeds(&file)?;

    let mut seeds = CategorySeeds::default();
    for entry in file.categories {
        let idx = seeds.keywords.len();
        seeds.keywords.push(
            entry
                .keywords
                .iter()
                .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
                .collect(),
        );
        for name in std::iter::once(&entry.category).chain(&entry.aliases) {
            seeds.by_slug.insert(category_slug(name), idx);
        }
    }

    Ok(seeds)
}

fn validate_category_seeds(file: &CategorySeedsFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &file.categories {
        let slug = category_slug(&entry.category);
        if slug.is_empty() {
            return Err(ConfigError::Validation(
                "category name must be non-empty".to_string(),
            ));
        }
        if !seen.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category: '{}' (slug '{slug}')",
                entry.category
            )));
        }
        for alias in &entry.aliases {
            let alias_slug = category_slug(alias);
            if alias_slug.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "category '{}' has an empty alias",
                    entry.category
                )));
            }
            if !seen.insert(alias_slug.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate category alias: '{alias}' (slug '{alias_slug}')"
                )));
            }
        }
        if entry.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "category '{}' contains an empty keyword",
                entry.category
            )));
        }
    }

    Ok(())
}
