//! Correction-loop coordinator.
//!
//! Runs normalization, dose validation and budget enforcement over one
//! candidate and either builds an accepted formula or returns every error
//! found, so the agent can fix them all in a single resubmission.
//!
//! The engine holds no state between calls. Attempt numbers, version
//! history and the clock all come from the caller.

use crate::budget::{self, TrimPolicy, DEFAULT_MINOR_OVERAGE_FRACTION};
use crate::candidate::check_shape;
use crate::catalog::Catalog;
use crate::{builder, dosage, normalizer};
use crate::{FormulaCandidate, Outcome, Result, ValidationReport, VersionStamp};
use serde::{Deserialize, Serialize};

/// Plain numeric limits injected by the caller
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineLimits {
    pub ceiling_mg: f64,
    pub minor_overage_fraction: f64,
    pub capsule_capacity_mg: f64,
    #[serde(default)]
    pub trim_policy: TrimPolicy,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            ceiling_mg: 5500.0,
            minor_overage_fraction: DEFAULT_MINOR_OVERAGE_FRACTION,
            capsule_capacity_mg: 500.0,
            trim_policy: TrimPolicy::default(),
        }
    }
}

/// Stateless validator bound to a loaded catalog
#[derive(Clone, Copy, Debug)]
pub struct FormulaEngine<'a> {
    catalog: &'a Catalog,
    limits: EngineLimits,
}

impl<'a> FormulaEngine<'a> {
    pub fn new(catalog: &'a Catalog, limits: EngineLimits) -> Self {
        Self { catalog, limits }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Check one candidate
    ///
    /// Returns `Err(Error::Schema)` only for malformed candidates. Every
    /// business-rule failure is reported through `Outcome::Report`.
    pub fn coordinate(
        &self,
        candidate: &FormulaCandidate,
        attempt_number: u32,
        stamp: &VersionStamp,
    ) -> Result<Outcome> {
        check_shape(candidate)?;

        let normalized = normalizer::normalize(self.catalog, candidate);
        let checked = dosage::validate(normalized.resolved);
        let budgeted = budget::enforce(
            checked.valid,
            self.limits.ceiling_mg,
            self.limits.minor_overage_fraction,
            self.limits.trim_policy,
        );

        let errors: Vec<_> = normalized
            .errors
            .into_iter()
            .chain(checked.errors)
            .chain(budgeted.errors)
            .collect();

        if !errors.is_empty() {
            return Ok(Outcome::Report(ValidationReport {
                attempt_number,
                errors,
            }));
        }

        let mut formula = builder::build(
            budgeted.entries,
            budgeted.notes,
            self.limits.capsule_capacity_mg,
            stamp,
        );
        formula.rationale = candidate.rationale.clone();
        formula.warnings = candidate.warnings.clone();
        formula.disclaimers = candidate.disclaimers.clone();

        Ok(Outcome::Accepted(formula))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, CandidateEntry, EntryRole, ErrorCode, Error};

    fn entry(name: &str, amount: f64, role: EntryRole) -> CandidateEntry {
        CandidateEntry {
            raw_name: name.into(),
            amount_mg: amount,
            unit: "mg".into(),
            role,
            purpose: String::new(),
        }
    }

    fn candidate(entries: Vec<CandidateEntry>) -> FormulaCandidate {
        FormulaCandidate {
            entries,
            rationale: "test".into(),
            warnings: vec!["take with food".into()],
            disclaimers: vec![],
        }
    }

    #[test]
    fn test_accepts_valid_candidate() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());

        let outcome = engine
            .coordinate(
                &candidate(vec![
                    entry("Omega-3", 1000.0, EntryRole::Base),
                    entry("Ashwagandha", 600.0, EntryRole::Addition),
                ]),
                1,
                &VersionStamp::next(None),
            )
            .unwrap();

        let formula = outcome.as_accepted().unwrap();
        assert_eq!(formula.total_mg, 1600.0);
        assert_eq!(formula.capsule_count, 4);
        assert_eq!(formula.rationale, "test");
        assert_eq!(formula.warnings, vec!["take with food".to_string()]);
    }

    #[test]
    fn test_reports_union_of_errors_across_stages() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());

        let outcome = engine
            .coordinate(
                &candidate(vec![
                    entry("Mystery Root", 100.0, EntryRole::Addition),
                    entry("Camu Camu", 1500.0, EntryRole::Addition),
                    entry("L-Theanine", 900.0, EntryRole::Addition),
                    entry("Omega-3", 2000.0, EntryRole::Base),
                    entry("Vitamin C", 1000.0, EntryRole::Base),
                    entry("Magnesium Glycinate", 800.0, EntryRole::Base),
                    entry("Turmeric", 1500.0, EntryRole::Addition),
                    entry("Lion's Mane", 1000.0, EntryRole::Addition),
                    entry("Rhodiola", 600.0, EntryRole::Addition),
                ]),
                2,
                &VersionStamp::next(None),
            )
            .unwrap();

        let report = outcome.as_report().unwrap();
        assert_eq!(report.attempt_number, 2);
        assert_eq!(
            report.codes(),
            vec![
                ErrorCode::UnknownIngredient,
                ErrorCode::FixedDoseMismatch,
                ErrorCode::DoseOutOfRange,
                ErrorCode::BudgetExceeded,
            ]
        );
    }

    #[test]
    fn test_minor_overage_with_other_errors_is_still_a_report() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());

        let outcome = engine
            .coordinate(
                &candidate(vec![
                    entry("zinc", 30.0, EntryRole::Base),
                    entry("Omega-3", 2000.0, EntryRole::Base),
                    entry("Camu Camu", 2500.0, EntryRole::Addition),
                    entry("Turmeric", 1500.0, EntryRole::Addition),
                ]),
                1,
                &VersionStamp::next(None),
            )
            .unwrap();

        let report = outcome.as_report().unwrap();
        assert_eq!(report.codes(), vec![ErrorCode::FixedDoseMismatch]);
    }

    #[test]
    fn test_dose_rejected_entry_does_not_count_toward_budget() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());

        // 5400 mg of valid entries; counting the bad Camu Camu would be 25% over
        let outcome = engine
            .coordinate(
                &candidate(vec![
                    entry("Omega-3", 2000.0, EntryRole::Base),
                    entry("Vitamin C", 1000.0, EntryRole::Base),
                    entry("Magnesium Glycinate", 800.0, EntryRole::Base),
                    entry("Lion's Mane", 1000.0, EntryRole::Addition),
                    entry("Ashwagandha", 600.0, EntryRole::Addition),
                    entry("Camu Camu", 1500.0, EntryRole::Addition),
                ]),
                1,
                &VersionStamp::next(None),
            )
            .unwrap();

        let report = outcome.as_report().unwrap();
        assert_eq!(report.codes(), vec![ErrorCode::FixedDoseMismatch]);
        assert_eq!(report.errors[0].entry_ref, crate::EntryRef::Index(5));
    }

    #[test]
    fn test_empty_candidate_is_schema_error() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());

        let result = engine.coordinate(&candidate(vec![]), 1, &VersionStamp::next(None));
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
