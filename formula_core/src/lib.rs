#![forbid(unsafe_code)]

//! Core domain model and validation engine for agent-proposed supplement formulas.
//!
//! This crate provides:
//! - Domain types (ingredient rules, candidates, reports, accepted formulas)
//! - Catalog management and loading
//! - The validation pipeline (normalize, dose check, budget and trim, build)
//! - Caller-side helpers (feedback rendering, correction loop, formula ledger)

pub mod types;
pub mod error;
pub mod catalog;
pub mod catalog_loader;
pub mod config;
pub mod logging;
pub mod candidate;
pub mod normalizer;
pub mod dosage;
pub mod budget;
pub mod builder;
pub mod engine;
pub mod feedback;
pub mod correction;
pub mod ledger;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use catalog_loader::load_catalog;
pub use config::Config;
pub use candidate::parse_candidate;
pub use engine::{EngineLimits, FormulaEngine};
pub use feedback::{render_report, FALLBACK_APOLOGY};
pub use correction::{CorrectionLoop, LoopStep, RetryPolicy, TranscriptMessage, TranscriptRole};
pub use ledger::{latest_version, read_formulas, FormulaSink, JsonlLedger};
