//! Global mass budget enforcement with a bounded automatic trim.
//!
//! A candidate over the ceiling by less than the minor-overage fraction is
//! trimmed in place: entries are visited lowest priority first, ranged
//! entries give up mass down to their minimum dose, and anything that
//! still cannot cover the overage is dropped. Larger overages, and trims
//! that would drop every entry, are handed back to the agent as
//! `BUDGET_EXCEEDED` without touching the entries.

use crate::{
    DoseRule, EntryRef, EntryRole, ErrorCode, ResolvedEntry, TrimAction, TrimNote,
    ValidationError,
};
use serde::{Deserialize, Serialize};

/// Default share of the ceiling an overage may reach and still be trimmed
pub const DEFAULT_MINOR_OVERAGE_FRACTION: f64 = 0.15;

/// Ordering policy for the trimmer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrimPolicy {
    /// Visit additions before bases when priority weights tie
    pub additions_before_bases: bool,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            additions_before_bases: true,
        }
    }
}

impl TrimPolicy {
    fn role_rank(&self, role: EntryRole) -> u8 {
        match (role, self.additions_before_bases) {
            (EntryRole::Addition, true) | (EntryRole::Base, false) => 0,
            _ => 1,
        }
    }
}

/// Output of the budget stage
#[derive(Clone, Debug, Default)]
pub struct BudgetChecked {
    pub entries: Vec<ResolvedEntry>,
    pub trimmed: bool,
    pub notes: Vec<TrimNote>,
    pub errors: Vec<ValidationError>,
}

/// Sum of entry amounts in mg, bases first.
///
/// Accepted formulas store bases ahead of additions and every consumer sums
/// them in that order, so the budget uses the same order to get the
/// identical float result.
pub fn total_mg(entries: &[ResolvedEntry]) -> f64 {
    stored_order_sum(entries.iter())
}

fn stored_order_sum<'a, I>(entries: I) -> f64
where
    I: Iterator<Item = &'a ResolvedEntry> + Clone,
{
    entries
        .clone()
        .filter(|e| e.role == EntryRole::Base)
        .chain(entries.filter(|e| e.role == EntryRole::Addition))
        .map(|e| e.amount_mg)
        .sum()
}

/// Render an mg figure for agent-facing text, at most three decimals
pub fn format_mg(mg: f64) -> String {
    let fixed = format!("{:.3}", mg);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn budget_exceeded(total: f64, ceiling_mg: f64) -> ValidationError {
    ValidationError {
        code: ErrorCode::BudgetExceeded,
        entry_ref: EntryRef::total(),
        detail: format!(
            "Total {} mg exceeds the {} mg ceiling by {} mg",
            format_mg(total),
            format_mg(ceiling_mg),
            format_mg(total - ceiling_mg)
        ),
        suggested_fix: Some(ceiling_mg),
    }
}

/// Enforce the mass ceiling over dose-valid entries
pub fn enforce(
    entries: Vec<ResolvedEntry>,
    ceiling_mg: f64,
    minor_overage_fraction: f64,
    policy: TrimPolicy,
) -> BudgetChecked {
    let total = total_mg(&entries);

    if total <= ceiling_mg {
        return BudgetChecked {
            entries,
            ..Default::default()
        };
    }

    let overage = total - ceiling_mg;
    let minor = ceiling_mg > 0.0 && overage / ceiling_mg < minor_overage_fraction;

    if !minor {
        return BudgetChecked {
            entries,
            errors: vec![budget_exceeded(total, ceiling_mg)],
            ..Default::default()
        };
    }

    let (kept, notes) = trim(entries.clone(), ceiling_mg, policy);

    // Trimming must leave at least one entry
    if kept.is_empty() {
        return BudgetChecked {
            entries,
            errors: vec![budget_exceeded(total, ceiling_mg)],
            ..Default::default()
        };
    }

    BudgetChecked {
        entries: kept,
        trimmed: true,
        notes,
        errors: Vec::new(),
    }
}

/// Indices of `entries` in the order the trimmer visits them
fn trim_order(entries: &[ResolvedEntry], policy: TrimPolicy) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    // Stable: equal keys keep submission order
    order.sort_by_key(|&i| (entries[i].priority_weight, policy.role_rank(entries[i].role)));
    order
}

fn kept_total(entries: &[ResolvedEntry], removed: &[bool]) -> f64 {
    stored_order_sum(
        entries
            .iter()
            .zip(removed)
            .filter(|(_, gone)| !**gone)
            .map(|(e, _)| e),
    )
}

/// Largest float strictly below a positive `mg`
fn next_below(mg: f64) -> f64 {
    if mg > 0.0 {
        f64::from_bits(mg.to_bits() - 1)
    } else {
        mg
    }
}

/// Settle entry `i` at or below `target` so the kept total fits the ceiling.
///
/// Subtraction can leave the recomputed total a few ulps over, so the amount
/// is lowered until the total fits. Returns `None` if that would take the
/// entry below `floor_mg`; the entry is then restored.
fn reduce_to_fit(
    entries: &mut [ResolvedEntry],
    removed: &[bool],
    i: usize,
    target: f64,
    floor_mg: f64,
    ceiling_mg: f64,
) -> Option<f64> {
    let from_mg = entries[i].amount_mg;
    let mut to_mg = target.max(floor_mg);

    loop {
        entries[i].amount_mg = to_mg;
        let excess = kept_total(entries, removed) - ceiling_mg;
        if excess <= 0.0 {
            return Some(to_mg);
        }
        if to_mg <= floor_mg {
            entries[i].amount_mg = from_mg;
            return None;
        }
        to_mg = (to_mg - excess).min(next_below(to_mg)).max(floor_mg);
    }
}

fn trim(
    mut entries: Vec<ResolvedEntry>,
    ceiling_mg: f64,
    policy: TrimPolicy,
) -> (Vec<ResolvedEntry>, Vec<TrimNote>) {
    let mut removed = vec![false; entries.len()];
    let mut notes = Vec::new();

    for i in trim_order(&entries, policy) {
        let remaining = kept_total(&entries, &removed) - ceiling_mg;
        if remaining <= 0.0 {
            break;
        }

        if let DoseRule::Ranged { min_dose_mg, .. } = entries[i].dose {
            let from_mg = entries[i].amount_mg;
            if from_mg - min_dose_mg >= remaining {
                let reduced = reduce_to_fit(
                    &mut entries,
                    &removed,
                    i,
                    from_mg - remaining,
                    min_dose_mg,
                    ceiling_mg,
                );
                if let Some(to_mg) = reduced {
                    notes.push(TrimNote {
                        canonical_name: entries[i].canonical_name.clone(),
                        index: entries[i].index,
                        action: TrimAction::Reduced { from_mg, to_mg },
                    });
                    break;
                }
            }
        }

        // Fixed doses cannot be partially reduced; ranged ones without
        // enough slack go entirely
        let entry = &entries[i];
        notes.push(TrimNote {
            canonical_name: entry.canonical_name.clone(),
            index: entry.index,
            action: TrimAction::Removed {
                amount_mg: entry.amount_mg,
            },
        });
        removed[i] = true;
    }

    let kept = entries
        .into_iter()
        .zip(removed)
        .filter(|(_, gone)| !gone)
        .map(|(e, _)| e)
        .collect();

    (kept, notes)
}
