//! Per-ingredient dose checks.
//!
//! Fixed rules demand the exact dose with no tolerance; ranged rules an
//! amount inside the inclusive window.

use crate::budget::format_mg;
use crate::{DoseRule, EntryRef, ErrorCode, ResolvedEntry, ValidationError};

/// Output of the dosage stage
#[derive(Clone, Debug, Default)]
pub struct DoseChecked {
    pub valid: Vec<ResolvedEntry>,
    pub errors: Vec<ValidationError>,
}

/// Check every resolved entry against its catalog dose rule
pub fn validate(entries: Vec<ResolvedEntry>) -> DoseChecked {
    let mut out = DoseChecked::default();

    for entry in entries {
        match check_entry(&entry) {
            None => out.valid.push(entry),
            Some(error) => out.errors.push(error),
        }
    }

    out
}

fn check_entry(entry: &ResolvedEntry) -> Option<ValidationError> {
    if entry.dose.admits(entry.amount_mg) {
        return None;
    }

    let error = match entry.dose {
        DoseRule::Fixed { fixed_dose_mg } => ValidationError {
            code: ErrorCode::FixedDoseMismatch,
            entry_ref: EntryRef::Index(entry.index),
            detail: format!(
                "{} must be exactly {} mg, got {} mg",
                entry.canonical_name,
                format_mg(fixed_dose_mg),
                format_mg(entry.amount_mg)
            ),
            suggested_fix: Some(fixed_dose_mg),
        },
        DoseRule::Ranged {
            min_dose_mg,
            max_dose_mg,
        } => {
            let nearer = if entry.amount_mg < min_dose_mg {
                min_dose_mg
            } else {
                max_dose_mg
            };
            ValidationError {
                code: ErrorCode::DoseOutOfRange,
                entry_ref: EntryRef::Index(entry.index),
                detail: format!(
                    "{} must be between {} and {} mg, got {} mg",
                    entry.canonical_name,
                    format_mg(min_dose_mg),
                    format_mg(max_dose_mg),
                    format_mg(entry.amount_mg)
                ),
                suggested_fix: Some(nearer),
            }
        }
    };

    Some(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IngredientCategory, EntryRole};

    fn resolved(name: &str, amount: f64, dose: DoseRule) -> ResolvedEntry {
        ResolvedEntry {
            index: 0,
            raw_name: name.into(),
            canonical_name: name.into(),
            amount_mg: amount,
            role: EntryRole::Addition,
            purpose: String::new(),
            category: IngredientCategory::Individual,
            dose,
            priority_weight: 10,
        }
    }

    const CAMU: DoseRule = DoseRule::Fixed {
        fixed_dose_mg: 2500.0,
    };
    const THEANINE: DoseRule = DoseRule::Ranged {
        min_dose_mg: 100.0,
        max_dose_mg: 400.0,
    };

    #[test]
    fn test_fixed_dose_must_match_exactly() {
        let out = validate(vec![
            resolved("Camu Camu", 2500.0, CAMU),
            resolved("Camu Camu", 2500.5, CAMU),
        ]);

        assert_eq!(out.valid.len(), 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].code, ErrorCode::FixedDoseMismatch);
        assert_eq!(out.errors[0].suggested_fix, Some(2500.0));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let out = validate(vec![
            resolved("L-Theanine", 100.0, THEANINE),
            resolved("L-Theanine", 400.0, THEANINE),
        ]);
        assert_eq!(out.valid.len(), 2);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_out_of_range_suggests_nearer_bound() {
        let out = validate(vec![
            resolved("L-Theanine", 50.0, THEANINE),
            resolved("L-Theanine", 900.0, THEANINE),
        ]);

        assert!(out.valid.is_empty());
        let fixes: Vec<_> = out.errors.iter().map(|e| e.suggested_fix).collect();
        assert_eq!(fixes, vec![Some(100.0), Some(400.0)]);
        assert!(out.errors.iter().all(|e| e.code == ErrorCode::DoseOutOfRange));
    }
}
