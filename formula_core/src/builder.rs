//! Accepted formula record construction.

use crate::{AcceptedFormula, EntryRole, ResolvedEntry, TrimNote, VersionStamp};

/// Number of capsules needed to hold `total_mg`
pub fn capsule_count(total_mg: f64, capsule_capacity_mg: f64) -> u32 {
    if total_mg <= 0.0 || capsule_capacity_mg <= 0.0 {
        return 0;
    }
    (total_mg / capsule_capacity_mg).ceil() as u32
}

/// Build the immutable accepted record from surviving entries
///
/// The total is always recomputed here. The version is one past the
/// caller-supplied prior version, starting at 1.
pub fn build(
    entries: Vec<ResolvedEntry>,
    adjustments: Vec<TrimNote>,
    capsule_capacity_mg: f64,
    stamp: &VersionStamp,
) -> AcceptedFormula {
    let (bases, additions): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|e| e.role == EntryRole::Base);
    // Same order as `AcceptedFormula::entries`
    let total: f64 = bases.iter().chain(&additions).map(|e| e.amount_mg).sum();

    AcceptedFormula {
        id: stamp.id,
        version: stamp.prior_version.map_or(1, |v| v.saturating_add(1)),
        bases,
        additions,
        total_mg: total,
        capsule_count: capsule_count(total, capsule_capacity_mg),
        created_at: stamp.created_at,
        adjustments,
        rationale: String::new(),
        warnings: Vec::new(),
        disclaimers: Vec::new(),
    }
}
