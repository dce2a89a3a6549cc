//! Append-only cost accounting against a per-job budget ceiling.
//!
//! Reservations are advisory and prevent dispatching work that is already
//! known to blow the budget; commits are the authoritative, append-only
//! update to the running total. A reservation expires when its TaskRun
//! reaches any terminal state, so skipped tasks never lock budget headroom.

use crate::{JobId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Comparison slack for accumulated floating-point amounts.
const EPSILON: f64 = 1e-9;

/// Append-only record of one committed amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Owning job identity.
    pub job_id: JobId,

    /// TaskRun this amount was committed for.
    pub run_id: RunId,

    /// Committed amount, rounded to 4 decimal places.
    pub amount: f64,

    /// Running total after this entry.
    pub total_after: f64,
}

/// Outcome of a budget reservation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Headroom exists; the estimate is held until commit or release.
    Ok,
    /// Committing the estimate would exceed the budget ceiling.
    WouldExceed,
}

/// Per-job cost ledger.
///
/// Not internally synchronized: callers must uphold single-writer
/// discipline per job.
#[derive(Debug)]
pub struct CostLedger {
    job_id: JobId,
    limit: f64,
    committed: f64,
    reserved: HashMap<RunId, f64>,
    entries: Vec<LedgerEntry>,
}

impl CostLedger {
    /// Create a fresh ledger for a job.
    pub fn new(job_id: JobId, limit: f64) -> Self {
        Self::resume(job_id, limit, 0.0)
    }

    /// Create a ledger that carries spend committed in a prior execution
    /// pass (job retry). The carried amount counts against the ceiling but
    /// produces no entries in this ledger.
    pub fn resume(job_id: JobId, limit: f64, already_committed: f64) -> Self {
        Self {
            job_id,
            limit: limit.max(0.0),
            committed: already_committed.max(0.0),
            reserved: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Reserve headroom for an estimated amount before dispatch.
    pub fn reserve(&mut self, run_id: RunId, estimate: f64) -> Reservation {
        let estimate = estimate.max(0.0);
        let projected = self.committed + self.reserved_total() + estimate;
        if projected > self.limit + EPSILON {
            return Reservation::WouldExceed;
        }
        self.reserved.insert(run_id, estimate);
        Reservation::Ok
    }

    /// Release a reservation without committing (the run reached a
    /// terminal state without an authoritative amount).
    pub fn release(&mut self, run_id: &RunId) {
        self.reserved.remove(run_id);
    }

    /// Commit the actual amount for a run, consuming its reservation.
    ///
    /// The running total is monotonically non-decreasing: amounts are
    /// clamped non-negative and rounded to 4 decimal places.
    pub fn commit(&mut self, run_id: &RunId, amount: f64) -> LedgerEntry {
        self.reserved.remove(run_id);
        let amount = round4(amount.max(0.0));
        self.committed = round4(self.committed + amount);
        let entry = LedgerEntry {
            job_id: self.job_id.clone(),
            run_id: run_id.clone(),
            amount,
            total_after: self.committed,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Authoritative running total of committed spend.
    pub fn total(&self) -> f64 {
        self.committed
    }

    /// Remaining headroom under the ceiling, ignoring reservations.
    pub fn remaining(&self) -> f64 {
        (self.limit - self.committed).max(0.0)
    }

    /// All committed entries, in commit order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    fn reserved_total(&self) -> f64 {
        self.reserved.values().sum()
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
