//! Rendering validation reports into transcript messages.
//!
//! This sits on the conversation side of the boundary. Each error code has
//! one fixed template so the agent sees a stable phrasing across attempts.

use crate::budget::format_mg;
use crate::{EntryRef, ErrorCode, ValidationError, ValidationReport};
use std::fmt::Write;

/// Message shown to the human once the attempt cap is reached
pub const FALLBACK_APOLOGY: &str = "Sorry, we couldn't finalize your formula automatically. \
     Please try again or adjust your request.";

fn describe_ref(entry_ref: &EntryRef) -> String {
    match entry_ref {
        EntryRef::Index(i) => format!("entry #{}", i + 1),
        EntryRef::Name(name) => name.clone(),
    }
}

fn fix_mg(error: &ValidationError) -> String {
    error
        .suggested_fix
        .map(|mg| format!("{} mg", format_mg(mg)))
        .unwrap_or_else(|| "an allowed amount".into())
}

/// Render one error with its code's template
pub fn render_error(error: &ValidationError) -> String {
    let at = describe_ref(&error.entry_ref);
    match error.code {
        ErrorCode::UnknownIngredient => format!(
            "[UNKNOWN_INGREDIENT] {}: {}. Replace it with an ingredient from the approved catalog or remove it.",
            at, error.detail
        ),
        ErrorCode::UnsupportedUnit => format!(
            "[UNSUPPORTED_UNIT] {}: {}. Restate the amount in mg.",
            at, error.detail
        ),
        ErrorCode::FixedDoseMismatch => format!(
            "[FIXED_DOSE_MISMATCH] {}: {}. Use exactly {}.",
            at,
            error.detail,
            fix_mg(error)
        ),
        ErrorCode::DoseOutOfRange => format!(
            "[DOSE_OUT_OF_RANGE] {}: {}. The nearest allowed dose is {}.",
            at,
            error.detail,
            fix_mg(error)
        ),
        ErrorCode::BudgetExceeded => format!(
            "[BUDGET_EXCEEDED] {}: {}. Resubmit a smaller formula totalling at most {}.",
            at,
            error.detail,
            fix_mg(error)
        ),
    }
}

/// Render a whole report as a single system message
pub fn render_report(report: &ValidationReport) -> String {
    let mut message = format!(
        "Formula attempt {} was rejected with {} problem(s). Fix all of them and resubmit the complete formula JSON.\n",
        report.attempt_number,
        report.errors.len()
    );
    for error in &report.errors {
        // Writing to a String cannot fail
        let _ = writeln!(message, "- {}", render_error(error));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fixed_dose_mismatch() {
        let error = ValidationError {
            code: ErrorCode::FixedDoseMismatch,
            entry_ref: EntryRef::Index(1),
            detail: "Camu Camu must be exactly 2500 mg, got 1500 mg".into(),
            suggested_fix: Some(2500.0),
        };
        let text = render_error(&error);
        assert!(text.starts_with("[FIXED_DOSE_MISMATCH] entry #2"));
        assert!(text.ends_with("Use exactly 2500 mg."));
    }

    #[test]
    fn test_render_report_lists_every_error() {
        let report = ValidationReport {
            attempt_number: 2,
            errors: vec![
                ValidationError {
                    code: ErrorCode::UnknownIngredient,
                    entry_ref: EntryRef::Index(0),
                    detail: "'Mystery Root' is not an approved catalog ingredient".into(),
                    suggested_fix: None,
                },
                ValidationError {
                    code: ErrorCode::BudgetExceeded,
                    entry_ref: EntryRef::total(),
                    detail: "Total 7000 mg exceeds the 5500 mg ceiling by 1500 mg".into(),
                    suggested_fix: Some(5500.0),
                },
            ],
        };

        let text = render_report(&report);
        assert!(text.starts_with("Formula attempt 2 was rejected with 2 problem(s)"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("[BUDGET_EXCEEDED] totalMg"));
        assert!(text.contains("at most 5500 mg"));
    }
}
