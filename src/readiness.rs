//! Readiness gate: which selection records may go to drafting.

use crate::config::run::RunSize;
use crate::store::SelectionRecord;

/// Set `ready_for_write` on a run's records (bucket order preserved).
///
/// * constrained: only the winner with the strictly highest final score
///   (earliest bucket wins a tie);
/// * unconstrained: every winner;
/// * backups are never ready.
pub fn apply_readiness(records: &mut [SelectionRecord], mode: RunSize) {
    for r in records.iter_mut() {
        r.ready_for_write = false;
    }

    if !mode.is_constrained() {
        for r in records.iter_mut().filter(|r| r.is_winner()) {
            r.ready_for_write = true;
        }
        return;
    }

    let mut best: Option<usize> = None;
    for (i, r) in records.iter().enumerate().filter(|(_, r)| r.is_winner()) {
        match best {
            Some(b) if records[b].final_score >= r.final_score => {}
            _ => best = Some(i),
        }
    }
    if let Some(i) = best {
        records[i].ready_for_write = true;
    }
}
