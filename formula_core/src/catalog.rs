//! Catalog repository of approved ingredients.
//!
//! The catalog is built once and only read afterwards. Lookups are
//! case-insensitive and whitespace-normalized, canonical names first and
//! aliases second. There is no partial matching: anything ambiguous
//! resolves to nothing.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog with the built-in ingredient rules
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference. This function is retained for testing and custom catalog creation.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

/// Normalize a name for lookup: trim, collapse inner whitespace, lowercase
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read-only lookup of ingredient rules
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    /// Keyed by normalized canonical name
    rules: HashMap<String, IngredientRule>,
    /// Normalized alias -> normalized canonical name
    aliases: HashMap<String, String>,
    /// Aliases claimed by more than one rule
    ambiguous: BTreeSet<String>,
    /// Canonical names that appeared more than once while building
    duplicates: Vec<String>,
}

impl Catalog {
    /// Build a catalog from a list of rules
    ///
    /// Later duplicates of a canonical name are dropped and reported by
    /// `validate()`.
    pub fn from_rules(rules: impl IntoIterator<Item = IngredientRule>) -> Self {
        let mut catalog = Catalog::default();

        for rule in rules {
            let key = normalize_key(&rule.canonical_name);
            if catalog.rules.contains_key(&key) {
                catalog.duplicates.push(rule.canonical_name.clone());
                continue;
            }
            catalog.rules.insert(key, rule);
        }

        let mut claims: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (key, rule) in &catalog.rules {
            for alias in &rule.aliases {
                let alias_key = normalize_key(alias);
                if alias_key.is_empty() || alias_key == *key {
                    continue;
                }
                claims.entry(alias_key).or_default().insert(key.clone());
            }
        }

        for (alias_key, owners) in claims {
            if owners.len() == 1 {
                if let Some(owner) = owners.into_iter().next() {
                    catalog.aliases.insert(alias_key, owner);
                }
            } else {
                catalog.ambiguous.insert(alias_key);
            }
        }

        catalog
    }

    /// Resolve a raw ingredient name to its rule
    pub fn resolve(&self, raw_name: &str) -> Option<&IngredientRule> {
        let key = normalize_key(raw_name);
        if key.is_empty() {
            return None;
        }

        if let Some(rule) = self.rules.get(&key) {
            return Some(rule);
        }

        if self.ambiguous.contains(&key) {
            return None;
        }

        self.aliases.get(&key).and_then(|owner| self.rules.get(owner))
    }

    /// All rules, sorted by canonical name
    pub fn rules(&self) -> Vec<&IngredientRule> {
        let mut rules: Vec<_> = self.rules.values().collect();
        rules.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate the catalog for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for name in &self.duplicates {
            errors.push(format!("Ingredient '{}' is defined more than once", name));
        }

        for rule in self.rules() {
            let name = &rule.canonical_name;
            if name.trim().is_empty() {
                errors.push("Ingredient has empty canonical name".to_string());
            }

            match rule.dose {
                DoseRule::Fixed { fixed_dose_mg } => {
                    if !(fixed_dose_mg.is_finite() && fixed_dose_mg > 0.0) {
                        errors.push(format!(
                            "Ingredient '{}': fixed dose {} must be positive",
                            name, fixed_dose_mg
                        ));
                    }
                }
                DoseRule::Ranged {
                    min_dose_mg,
                    max_dose_mg,
                } => {
                    if !(min_dose_mg.is_finite() && max_dose_mg.is_finite()) || min_dose_mg < 0.0
                    {
                        errors.push(format!(
                            "Ingredient '{}': dose range [{}, {}] is invalid",
                            name, min_dose_mg, max_dose_mg
                        ));
                    }
                    if min_dose_mg > max_dose_mg {
                        errors.push(format!(
                            "Ingredient '{}': min dose {} > max {}",
                            name, min_dose_mg, max_dose_mg
                        ));
                    }
                }
            }
        }

        for alias in &self.ambiguous {
            errors.push(format!(
                "Alias '{}' is claimed by more than one ingredient",
                alias
            ));
        }

        errors
    }
}

fn fixed(name: &str, category: IngredientCategory, dose: f64, weight: i32, aliases: &[&str]) -> IngredientRule {
    IngredientRule {
        canonical_name: name.into(),
        category,
        dose: DoseRule::Fixed { fixed_dose_mg: dose },
        priority_weight: weight,
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn ranged(
    name: &str,
    category: IngredientCategory,
    min: f64,
    max: f64,
    weight: i32,
    aliases: &[&str],
) -> IngredientRule {
    IngredientRule {
        canonical_name: name.into(),
        category,
        dose: DoseRule::Ranged {
            min_dose_mg: min,
            max_dose_mg: max,
        },
        priority_weight: weight,
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

/// Internal function that actually builds the catalog
fn build_default_catalog_internal() -> Catalog {
    use IngredientCategory::{Base, Individual};

    Catalog::from_rules(vec![
        // ====================================================================
        // Base ingredients
        // ====================================================================
        ranged("Omega-3", Base, 500.0, 2000.0, 95, &["fish oil", "omega 3"]),
        ranged("Magnesium Glycinate", Base, 200.0, 800.0, 90, &["magnesium", "magnesium bisglycinate"]),
        ranged("Vitamin C", Base, 250.0, 1000.0, 85, &["ascorbic acid"]),
        fixed("Zinc Picolinate", Base, 25.0, 80, &["zinc"]),
        // ====================================================================
        // Individual ingredients
        // ====================================================================
        fixed("Ashwagandha", Individual, 600.0, 40, &["ashwaganda", "withania somnifera"]),
        fixed("Camu Camu", Individual, 2500.0, 30, &["camu-camu"]),
        fixed("Lion's Mane", Individual, 1000.0, 25, &["lions mane", "hericium erinaceus"]),
        ranged("L-Theanine", Individual, 100.0, 400.0, 50, &["theanine"]),
        ranged("Rhodiola Rosea", Individual, 200.0, 600.0, 35, &["rhodiola"]),
        ranged("Turmeric Extract", Individual, 500.0, 1500.0, 20, &["turmeric", "curcumin"]),
        ranged("Coenzyme Q10", Individual, 100.0, 300.0, 45, &["coq10", "ubiquinone"]),
    ])
}
