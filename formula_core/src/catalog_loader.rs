//! Loading external catalogs from disk.
//!
//! Supported formats are picked by file extension:
//! - `.json`: an array of ingredient rules
//! - `.toml`: `[[ingredient]]` tables
//! - `.csv`: one flat row per ingredient, aliases separated by `;`

use crate::catalog::Catalog;
use crate::{DoseRule, Error, IngredientCategory, IngredientRule, Result};
use serde::Deserialize;
use std::path::Path;

/// TOML catalog file layout
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    ingredient: Vec<IngredientRule>,
}

/// Flat CSV row; converted into the tagged dose rule after reading
#[derive(Debug, Deserialize)]
struct CsvCatalogRow {
    canonical_name: String,
    category: IngredientCategory,
    dose_kind: String,
    fixed_dose_mg: Option<f64>,
    min_dose_mg: Option<f64>,
    max_dose_mg: Option<f64>,
    priority_weight: i32,
    #[serde(default)]
    aliases: String,
}

impl CsvCatalogRow {
    fn into_rule(self, line: usize) -> Result<IngredientRule> {
        let dose = match (
            self.dose_kind.trim().to_lowercase().as_str(),
            self.fixed_dose_mg,
            self.min_dose_mg,
            self.max_dose_mg,
        ) {
            ("fixed", Some(fixed_dose_mg), None, None) => DoseRule::Fixed { fixed_dose_mg },
            ("ranged", None, Some(min_dose_mg), Some(max_dose_mg)) => DoseRule::Ranged {
                min_dose_mg,
                max_dose_mg,
            },
            (kind, ..) => {
                return Err(Error::CatalogValidation(format!(
                    "row {} ('{}'): dose fields do not match dose kind '{}'",
                    line, self.canonical_name, kind
                )))
            }
        };

        let aliases = self
            .aliases
            .split(';')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();

        Ok(IngredientRule {
            canonical_name: self.canonical_name,
            category: self.category,
            dose,
            priority_weight: self.priority_weight,
            aliases,
        })
    }
}

/// Load a catalog from a file, choosing the format by extension
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let rules = match extension.as_str() {
        "json" => read_json_rules(path)?,
        "toml" => read_toml_rules(path)?,
        "csv" => read_csv_rules(path)?,
        other => {
            return Err(Error::CatalogValidation(format!(
                "Unsupported catalog format '{}' for {:?}",
                other, path
            )))
        }
    };

    tracing::info!("Loaded {} ingredient rules from {:?}", rules.len(), path);
    Ok(Catalog::from_rules(rules))
}

fn read_json_rules(path: &Path) -> Result<Vec<IngredientRule>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn read_toml_rules(path: &Path) -> Result<Vec<IngredientRule>> {
    let contents = std::fs::read_to_string(path)?;
    let file: TomlCatalogFile = toml::from_str(&contents)?;
    Ok(file.ingredient)
}

fn read_csv_rules(path: &Path) -> Result<Vec<IngredientRule>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;

    let mut rules = Vec::new();
    for (idx, row) in reader.deserialize::<CsvCatalogRow>().enumerate() {
        // Header is line 1
        rules.push(row?.into_rule(idx + 2)?);
    }
    Ok(rules)
}
