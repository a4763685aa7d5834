//! Parsing agent output into a `FormulaCandidate`.
//!
//! Shape problems are hard schema failures and never enter the
//! correction loop.

use crate::{Error, FormulaCandidate, Result};

/// Parse candidate JSON emitted by the agent
///
/// Unknown keys such as `totalMg` are dropped; the engine computes totals
/// itself.
pub fn parse_candidate(json: &str) -> Result<FormulaCandidate> {
    let candidate: FormulaCandidate =
        serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))?;
    check_shape(&candidate)?;
    Ok(candidate)
}

/// Shape rules serde cannot express
pub fn check_shape(candidate: &FormulaCandidate) -> Result<()> {
    if candidate.entries.is_empty() {
        return Err(Error::Schema("candidate has no entries".into()));
    }

    for (index, entry) in candidate.entries.iter().enumerate() {
        if !entry.amount_mg.is_finite() || entry.amount_mg < 0.0 {
            return Err(Error::Schema(format!(
                "entry {} ('{}'): amountMg must be a non-negative number",
                index, entry.raw_name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryRole;

    #[test]
    fn test_parses_candidate_and_ignores_total() {
        let json = r#"{
            "entries": [
                {"rawName": "ashwaganda", "amountMg": 600, "unit": "mg", "role": "addition", "purpose": "stress"}
            ],
            "rationale": "calm focus",
            "totalMg": 1
        }"#;

        let candidate = parse_candidate(json).unwrap();
        assert_eq!(candidate.entries.len(), 1);
        assert_eq!(candidate.entries[0].amount_mg, 600.0);
        assert_eq!(candidate.entries[0].role, EntryRole::Addition);
        assert!(candidate.warnings.is_empty());
    }

    #[test]
    fn test_non_numeric_amount_is_schema_error() {
        let json = r#"{"entries": [{"rawName": "zinc", "amountMg": "lots", "unit": "mg", "role": "base"}]}"#;
        assert!(matches!(parse_candidate(json), Err(Error::Schema(_))));
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        let json = r#"{"entries": [{"rawName": "zinc", "unit": "mg", "role": "base"}]}"#;
        assert!(matches!(parse_candidate(json), Err(Error::Schema(_))));
    }

    #[test]
    fn test_unknown_role_is_schema_error() {
        let json = r#"{"entries": [{"rawName": "zinc", "amountMg": 25, "unit": "mg", "role": "booster"}]}"#;
        assert!(matches!(parse_candidate(json), Err(Error::Schema(_))));
    }

    #[test]
    fn test_empty_and_negative_are_schema_errors() {
        assert!(matches!(parse_candidate(r#"{"entries": []}"#), Err(Error::Schema(_))));

        let json = r#"{"entries": [{"rawName": "zinc", "amountMg": -25, "unit": "mg", "role": "base"}]}"#;
        let err = parse_candidate(json).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }
}
