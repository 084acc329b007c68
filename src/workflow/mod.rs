//! Asynchronous business workflows.
//!
//! Both workflows are pure decision functions plus simulated latency: they
//! never touch a store, and no store lock is ever held across their delay
//! windows. Persisting the outcome is the orchestration layer's job.

pub mod settlement;
pub mod underwriting;

pub use settlement::{PaymentSettlement, SettlementOutcome, SettlementRequest};
pub use underwriting::{ApplicationDecision, LoanUnderwriting, UnderwritingRequest};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Simulated latency windows for the workflows.
#[derive(Debug, Clone)]
pub struct WorkflowTiming {
    /// Intake latency between submission and the start of review.
    pub submission_delay: Duration,
    /// Review window; actual delay is drawn uniformly from the range.
    pub review_delay_min: Duration,
    pub review_delay_max: Duration,
    /// Latency before a payment moves from PENDING to PROCESSING.
    pub pending_delay: Duration,
    /// Gateway window; actual delay is drawn uniformly from the range.
    pub gateway_delay_min: Duration,
    pub gateway_delay_max: Duration,
}

impl Default for WorkflowTiming {
    fn default() -> Self {
        Self {
            submission_delay: Duration::from_millis(1_000),
            review_delay_min: Duration::from_millis(2_000),
            review_delay_max: Duration::from_millis(5_000),
            pending_delay: Duration::from_millis(500),
            gateway_delay_min: Duration::from_millis(3_000),
            gateway_delay_max: Duration::from_millis(10_000),
        }
    }
}

impl WorkflowTiming {
    /// Zero-latency timing for tests and demos.
    pub fn instant() -> Self {
        Self {
            submission_delay: Duration::ZERO,
            review_delay_min: Duration::ZERO,
            review_delay_max: Duration::ZERO,
            pending_delay: Duration::ZERO,
            gateway_delay_min: Duration::ZERO,
            gateway_delay_max: Duration::ZERO,
        }
    }

    pub(crate) fn pick_in_window(
        min: Duration,
        max: Duration,
        decisions: &dyn DecisionSource,
    ) -> Duration {
        if max <= min {
            return min;
        }
        let spread = max - min;
        min + spread.mul_f64(f64::from(decisions.pick(1_000) as u32) / 1_000.0)
    }
}

/// Source of the workflows' randomized decisions.
///
/// Isolated behind a trait so tests can force deterministic approve / reject /
/// success / fail outcomes instead of sampling probabilities.
pub trait DecisionSource: Send + Sync {
    /// Uniform roll in `0..=100`, compared against the approval thresholds.
    fn roll(&self) -> u8;

    /// Uniform index in `0..bound` (reason selection, delay jitter).
    fn pick(&self, bound: usize) -> usize;
}

/// Seedable pseudo-random decision source; the production default.
pub struct RandomDecisions {
    rng: Mutex<StdRng>,
}

impl RandomDecisions {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for RandomDecisions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionSource for RandomDecisions {
    fn roll(&self) -> u8 {
        self.rng().gen_range(0..=100)
    }

    fn pick(&self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.rng().gen_range(0..bound)
    }
}

/// Fixed-outcome decision source for tests.
pub struct FixedDecisions {
    roll: u8,
}

impl FixedDecisions {
    pub fn new(roll: u8) -> Self {
        Self { roll }
    }

    /// Roll that clears every approval threshold.
    pub fn always_approve() -> Self {
        Self::new(100)
    }

    /// Roll that fails every approval threshold.
    pub fn always_reject() -> Self {
        Self::new(0)
    }
}

impl DecisionSource for FixedDecisions {
    fn roll(&self) -> u8 {
        self.roll
    }

    fn pick(&self, _bound: usize) -> usize {
        0
    }
}
