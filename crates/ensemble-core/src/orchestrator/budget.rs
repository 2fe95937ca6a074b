//! Pre-step budget enforcement
//!
//! The check runs before money is committed: a step (or a whole parallel
//! group) executes only when the current spend plus its estimate fits the
//! conversation budget. Estimates come from the primary candidate's
//! pricing; the authoritative figure recorded after the call may differ,
//! so actual spend can overshoot the budget by at most one step.

use super::types::FailureReason;
use tracing::debug;

/// Check whether the next unit fits the remaining budget.
///
/// Returns the halt reason when it does not. `step` is the 1-based index
/// of the first step that would not execute.
pub(super) fn check_step_budget(
    spent_cents: u32,
    estimate_cents: u32,
    budget_cents: u32,
    step: u32,
) -> Option<FailureReason> {
    if spent_cents.saturating_add(estimate_cents) <= budget_cents {
        debug!(
            step,
            spent_cents, estimate_cents, budget_cents, "budget check passed"
        );
        return None;
    }
    Some(FailureReason::BudgetExceeded {
        spent_cents,
        budget_cents,
        step,
    })
}
