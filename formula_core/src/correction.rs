//! Caller-side correction loop.
//!
//! The agent is an external actor reachable only through the transcript.
//! This module owns the attempt counter, the attempt cap and the
//! transcript; the engine it drives stays stateless.

use crate::engine::FormulaEngine;
use crate::feedback::{render_report, FALLBACK_APOLOGY};
use crate::{
    candidate::parse_candidate, AcceptedFormula, CorrectionAttempt, Error, Outcome, Result,
    ValidationReport, VersionStamp,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of agent submissions before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How many attempts the agent gets
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Author of a transcript message
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    System,
    Agent,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub content: String,
}

/// What the conversation should do after a submission
#[derive(Clone, Debug, PartialEq)]
pub enum LoopStep {
    /// Persist and show the formula
    Accepted(AcceptedFormula),
    /// Feedback was appended to the transcript; wait for the agent
    Retry {
        report: ValidationReport,
        message: String,
    },
    /// Attempt cap reached; `message` is for the human
    Exhausted {
        report: ValidationReport,
        message: String,
    },
    /// The session deadline passed before this submission
    TimedOut { message: String },
}

impl LoopStep {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopStep::Retry { .. })
    }
}

/// Bounded sequence of correction attempts for one conversation
#[derive(Clone, Debug, Default)]
pub struct CorrectionLoop {
    policy: RetryPolicy,
    attempts: Vec<CorrectionAttempt>,
    transcript: Vec<TranscriptMessage>,
    deadline: Option<DateTime<Utc>>,
    finished: bool,
}

impl CorrectionLoop {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Stop accepting submissions at or after `deadline`
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn attempts(&self) -> &[CorrectionAttempt] {
        &self.attempts
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one agent submission through the engine
    ///
    /// Malformed JSON ends the loop with `Error::Schema`; it is not counted
    /// as an attempt.
    pub fn submit(
        &mut self,
        engine: &FormulaEngine<'_>,
        raw_json: &str,
        stamp: &VersionStamp,
    ) -> Result<LoopStep> {
        if self.finished {
            return Err(Error::Other("correction loop already finished".into()));
        }

        if let Some(deadline) = self.deadline {
            if stamp.created_at >= deadline {
                self.finished = true;
                tracing::warn!(
                    "Correction loop timed out after {} attempt(s)",
                    self.attempts.len()
                );
                return Ok(LoopStep::TimedOut {
                    message: FALLBACK_APOLOGY.to_string(),
                });
            }
        }

        self.transcript.push(TranscriptMessage {
            role: TranscriptRole::Agent,
            content: raw_json.to_string(),
        });

        let candidate = match parse_candidate(raw_json) {
            Ok(candidate) => candidate,
            Err(e) => {
                self.finished = true;
                tracing::warn!("Agent submitted a malformed candidate: {}", e);
                return Err(e);
            }
        };

        let attempt_number = self.attempts.len() as u32 + 1;
        let outcome = engine.coordinate(&candidate, attempt_number, stamp)?;

        self.attempts.push(CorrectionAttempt {
            attempt_number,
            candidate,
            outcome: outcome.clone(),
        });

        match outcome {
            Outcome::Accepted(formula) => {
                self.finished = true;
                tracing::info!(
                    "Formula accepted on attempt {} (version {}, {} mg)",
                    attempt_number,
                    formula.version,
                    formula.total_mg
                );
                Ok(LoopStep::Accepted(formula))
            }
            Outcome::Report(report) if attempt_number >= self.policy.max_attempts => {
                self.finished = true;
                tracing::warn!(
                    "Giving up after {} attempt(s), last report had {} error(s)",
                    attempt_number,
                    report.errors.len()
                );
                Ok(LoopStep::Exhausted {
                    report,
                    message: FALLBACK_APOLOGY.to_string(),
                })
            }
            Outcome::Report(report) => {
                let message = render_report(&report);
                self.transcript.push(TranscriptMessage {
                    role: TranscriptRole::System,
                    content: message.clone(),
                });
                tracing::info!(
                    "Attempt {} rejected with {} error(s), asking agent to resubmit",
                    attempt_number,
                    report.errors.len()
                );
                Ok(LoopStep::Retry { report, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, EngineLimits, ErrorCode};
    use chrono::Duration;

    const BAD: &str = r#"{"entries": [{"rawName": "Camu Camu", "amountMg": 1500, "unit": "mg", "role": "addition"}]}"#;
    const GOOD: &str = r#"{"entries": [{"rawName": "Camu Camu", "amountMg": 2500, "unit": "mg", "role": "addition"}]}"#;

    #[test]
    fn test_retry_then_accept() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());
        let mut session = CorrectionLoop::new(RetryPolicy::default());

        let step = session.submit(&engine, BAD, &VersionStamp::next(None)).unwrap();
        match &step {
            LoopStep::Retry { report, message } => {
                assert_eq!(report.attempt_number, 1);
                assert_eq!(report.codes(), vec![ErrorCode::FixedDoseMismatch]);
                assert!(message.contains("Use exactly 2500 mg"));
            }
            other => panic!("expected retry, got {:?}", other),
        }
        assert!(!step.is_terminal());

        let step = session.submit(&engine, GOOD, &VersionStamp::next(None)).unwrap();
        assert!(matches!(step, LoopStep::Accepted(_)));
        assert!(session.is_finished());
        assert_eq!(session.attempts().len(), 2);

        let roles: Vec<_> = session.transcript().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![TranscriptRole::Agent, TranscriptRole::System, TranscriptRole::Agent]
        );
    }

    #[test]
    fn test_exhausts_after_cap() {
        crate::logging::init_test();
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());
        let mut session = CorrectionLoop::new(RetryPolicy { max_attempts: 2 });

        let first = session.submit(&engine, BAD, &VersionStamp::next(None)).unwrap();
        assert!(matches!(first, LoopStep::Retry { .. }));

        let second = session.submit(&engine, BAD, &VersionStamp::next(None)).unwrap();
        match second {
            LoopStep::Exhausted { report, message } => {
                assert_eq!(report.attempt_number, 2);
                assert_eq!(message, FALLBACK_APOLOGY);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }

        let third = session.submit(&engine, GOOD, &VersionStamp::next(None));
        assert!(matches!(third, Err(Error::Other(_))));
    }

    #[test]
    fn test_schema_error_is_not_an_attempt() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());
        let mut session = CorrectionLoop::new(RetryPolicy::default());

        let result = session.submit(&engine, "{not json", &VersionStamp::next(None));
        assert!(matches!(result, Err(Error::Schema(_))));
        assert!(session.attempts().is_empty());
        assert!(session.is_finished());
    }

    #[test]
    fn test_deadline_stops_loop_without_calling_engine() {
        let catalog = build_default_catalog();
        let engine = FormulaEngine::new(&catalog, EngineLimits::default());
        let stamp = VersionStamp::next(None);
        let mut session = CorrectionLoop::new(RetryPolicy::default())
            .with_deadline(stamp.created_at - Duration::seconds(1));

        let step = session.submit(&engine, GOOD, &stamp).unwrap();
        assert!(matches!(step, LoopStep::TimedOut { .. }));
        assert!(session.attempts().is_empty());
        assert!(session.transcript().is_empty());
    }
}
