//! Core domain types for the formula validation engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Catalog ingredient rules and their dose constraints
//! - Candidate formulas as emitted by the conversational agent
//! - Validation errors and reports fed back into the conversation
//! - Accepted formulas and the correction-attempt record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Catalog Types
// ============================================================================

/// Catalog category of an ingredient
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IngredientCategory {
    Base,
    Individual,
}

/// Dose constraint for a catalog ingredient.
///
/// Exactly one shape is ever populated: a fixed ingredient has a single
/// exact dose, a ranged one an inclusive `[min, max]` window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "doseKind",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum DoseRule {
    Fixed { fixed_dose_mg: f64 },
    Ranged { min_dose_mg: f64, max_dose_mg: f64 },
}

impl DoseRule {
    /// Check whether an amount satisfies this rule
    pub fn admits(&self, amount_mg: f64) -> bool {
        match self {
            DoseRule::Fixed { fixed_dose_mg } => amount_mg == *fixed_dose_mg,
            DoseRule::Ranged {
                min_dose_mg,
                max_dose_mg,
            } => amount_mg >= *min_dose_mg && amount_mg <= *max_dose_mg,
        }
    }
}

/// An approved catalog ingredient with its dosage rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRule {
    pub canonical_name: String,
    pub category: IngredientCategory,
    #[serde(flatten)]
    pub dose: DoseRule,
    /// Lower weights are trimmed first
    pub priority_weight: i32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

// ============================================================================
// Candidate Types
// ============================================================================

/// Role an entry plays in the proposed formula
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    Base,
    Addition,
}

/// The only unit the engine accepts
pub const MILLIGRAM_UNIT: &str = "mg";

/// A single ingredient line proposed by the agent
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntry {
    pub raw_name: String,
    pub amount_mg: f64,
    pub unit: String,
    pub role: EntryRole,
    /// Advisory only, never checked
    #[serde(default)]
    pub purpose: String,
}

/// An unvalidated formula proposal.
///
/// There is no total field: any `totalMg` key in the incoming
/// JSON is dropped during deserialization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormulaCandidate {
    pub entries: Vec<CandidateEntry>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub disclaimers: Vec<String>,
}

/// A candidate entry bound to the catalog rule it resolved to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntry {
    /// Position of the entry in the submitted candidate
    pub index: usize,
    pub raw_name: String,
    pub canonical_name: String,
    pub amount_mg: f64,
    pub role: EntryRole,
    pub purpose: String,
    pub category: IngredientCategory,
    pub dose: DoseRule,
    pub priority_weight: i32,
}

impl ResolvedEntry {
    pub fn new(index: usize, entry: &CandidateEntry, rule: &IngredientRule) -> Self {
        Self {
            index,
            raw_name: entry.raw_name.clone(),
            canonical_name: rule.canonical_name.clone(),
            amount_mg: entry.amount_mg,
            role: entry.role,
            purpose: entry.purpose.clone(),
            category: rule.category,
            dose: rule.dose.clone(),
            priority_weight: rule.priority_weight,
        }
    }

    /// Re-wrap this entry as a candidate line under its canonical name
    pub fn to_candidate_entry(&self) -> CandidateEntry {
        CandidateEntry {
            raw_name: self.canonical_name.clone(),
            amount_mg: self.amount_mg,
            unit: MILLIGRAM_UNIT.to_string(),
            role: self.role,
            purpose: self.purpose.clone(),
        }
    }
}

// ============================================================================
// Validation Types
// ============================================================================

/// Machine-actionable error codes returned to the agent
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownIngredient,
    FixedDoseMismatch,
    DoseOutOfRange,
    BudgetExceeded,
    UnsupportedUnit,
}

/// Which part of the candidate an error points at
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EntryRef {
    /// Position of an entry in the candidate
    Index(usize),
    /// A named field or the formula as a whole
    Name(String),
}

impl EntryRef {
    /// Reference to the derived total, used for budget errors
    pub fn total() -> Self {
        EntryRef::Name("totalMg".to_string())
    }
}

/// A single business-rule failure
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub entry_ref: EntryRef,
    pub detail: String,
    /// Amount in mg the agent should use instead (dose or total)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<f64>,
}

/// The full set of failures for one attempt
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub attempt_number: u32,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

// ============================================================================
// Trim Notes
// ============================================================================

/// What the trimmer did to a single entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TrimAction {
    Reduced { from_mg: f64, to_mg: f64 },
    Removed { amount_mg: f64 },
}

/// Side-channel note describing an automatic trim
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrimNote {
    pub canonical_name: String,
    pub index: usize,
    #[serde(flatten)]
    pub action: TrimAction,
}

// ============================================================================
// Accepted Formula Types
// ============================================================================

/// Caller-owned state stamped onto an accepted formula
#[derive(Clone, Debug)]
pub struct VersionStamp {
    pub id: Uuid,
    /// Highest version previously accepted for this user, if any
    pub prior_version: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl VersionStamp {
    /// Stamp for a user with the given history, generated now
    pub fn next(prior_version: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prior_version,
            created_at: Utc::now(),
        }
    }
}

/// An immutable, engine-verified formula
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedFormula {
    pub id: Uuid,
    pub version: u32,
    pub bases: Vec<ResolvedEntry>,
    pub additions: Vec<ResolvedEntry>,
    pub total_mg: f64,
    pub capsule_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub adjustments: Vec<TrimNote>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub disclaimers: Vec<String>,
}

impl AcceptedFormula {
    /// All entries, bases first
    pub fn entries(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.bases.iter().chain(self.additions.iter())
    }

    /// Whether the engine trimmed the candidate to produce this formula
    pub fn trimmed(&self) -> bool {
        !self.adjustments.is_empty()
    }

    /// Re-wrap this formula as a fresh candidate
    pub fn to_candidate(&self) -> FormulaCandidate {
        FormulaCandidate {
            entries: self.entries().map(ResolvedEntry::to_candidate_entry).collect(),
            rationale: self.rationale.clone(),
            warnings: self.warnings.clone(),
            disclaimers: self.disclaimers.clone(),
        }
    }
}

/// Result of one pass through the engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Accepted(AcceptedFormula),
    Report(ValidationReport),
}

impl Outcome {
    pub fn as_accepted(&self) -> Option<&AcceptedFormula> {
        match self {
            Outcome::Accepted(formula) => Some(formula),
            Outcome::Report(_) => None,
        }
    }

    pub fn as_report(&self) -> Option<&ValidationReport> {
        match self {
            Outcome::Accepted(_) => None,
            Outcome::Report(report) => Some(report),
        }
    }
}

/// One submission in the caller's bounded correction sequence
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionAttempt {
    pub attempt_number: u32,
    pub candidate: FormulaCandidate,
    pub outcome: Outcome,
}
