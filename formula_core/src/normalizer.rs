//! Candidate normalization against the catalog.
//!
//! Every entry either binds to a catalog rule or produces an error. Entries
//! that fail here never reach the later stages.

use crate::catalog::Catalog;
use crate::{
    EntryRef, ErrorCode, FormulaCandidate, ResolvedEntry, ValidationError, MILLIGRAM_UNIT,
};

/// Output of the normalization stage
#[derive(Clone, Debug, Default)]
pub struct Normalized {
    pub resolved: Vec<ResolvedEntry>,
    pub errors: Vec<ValidationError>,
}

/// Bind each candidate entry to its catalog rule
pub fn normalize(catalog: &Catalog, candidate: &FormulaCandidate) -> Normalized {
    let mut out = Normalized::default();

    for (index, entry) in candidate.entries.iter().enumerate() {
        if !entry.unit.trim().eq_ignore_ascii_case(MILLIGRAM_UNIT) {
            out.errors.push(ValidationError {
                code: ErrorCode::UnsupportedUnit,
                entry_ref: EntryRef::Index(index),
                detail: format!(
                    "'{}' is given in '{}'; amounts must be in {}",
                    entry.raw_name, entry.unit, MILLIGRAM_UNIT
                ),
                suggested_fix: None,
            });
            continue;
        }

        match catalog.resolve(&entry.raw_name) {
            Some(rule) => out.resolved.push(ResolvedEntry::new(index, entry, rule)),
            None => out.errors.push(ValidationError {
                code: ErrorCode::UnknownIngredient,
                entry_ref: EntryRef::Index(index),
                detail: format!("'{}' is not an approved catalog ingredient", entry.raw_name),
                suggested_fix: None,
            }),
        }
    }

    out
}
