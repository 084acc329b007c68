//! Payment settlement: PENDING -> PROCESSING -> SUCCESSFUL | FAILED.
//!
//! Settlement succeeds on a uniform roll > 10 (~90%), independent of amount
//! and method. References and receipts are uuid-derived so concurrent
//! settlements can never collide.

use super::{DecisionSource, WorkflowTiming};
use crate::core::{entropy_ref, now_millis};
use crate::domain::PaymentStatus;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

const SUCCESS_THRESHOLD: u8 = 10;

/// Cosmetic failure reasons; selection is uniformly random.
const FAILURE_REASONS: [&str; 5] = [
    "Insufficient funds in account",
    "Payment timeout - please try again",
    "Transaction declined by provider",
    "Network error occurred",
    "Invalid phone number format",
];

#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub payment_id: String,
    pub amount: f64,
    pub phone_number: String,
    pub method: String,
}

/// Terminal outcome of one settlement run.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub transaction_reference: Option<String>,
    pub receipt_number: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_at: i64,
}

impl SettlementOutcome {
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Successful
    }
}

pub struct PaymentSettlement {
    timing: WorkflowTiming,
    decisions: Arc<dyn DecisionSource>,
}

impl PaymentSettlement {
    pub fn new(timing: WorkflowTiming, decisions: Arc<dyn DecisionSource>) -> Self {
        Self { timing, decisions }
    }

    /// Simulated latency before the payment enters PROCESSING.
    pub async fn intake_delay(&self) {
        sleep(self.timing.pending_delay).await;
    }

    /// Simulated gateway latency followed by the settlement outcome.
    pub async fn settle(&self, request: &SettlementRequest) -> SettlementOutcome {
        let delay = WorkflowTiming::pick_in_window(
            self.timing.gateway_delay_min,
            self.timing.gateway_delay_max,
            self.decisions.as_ref(),
        );
        sleep(delay).await;

        let outcome = if self.decisions.roll() > SUCCESS_THRESHOLD {
            SettlementOutcome {
                payment_id: request.payment_id.clone(),
                status: PaymentStatus::Successful,
                transaction_reference: Some(entropy_ref("TXN", 8)),
                receipt_number: Some(entropy_ref("RCP", 10)),
                failure_reason: None,
                processed_at: now_millis(),
            }
        } else {
            let reason = FAILURE_REASONS[self.decisions.pick(FAILURE_REASONS.len())];
            SettlementOutcome {
                payment_id: request.payment_id.clone(),
                status: PaymentStatus::Failed,
                transaction_reference: None,
                receipt_number: None,
                failure_reason: Some(reason.to_string()),
                processed_at: now_millis(),
            }
        };
        debug!(
            payment_id = %outcome.payment_id,
            status = %outcome.status,
            "settlement outcome"
        );
        outcome
    }

    /// Full run: intake latency, gateway latency, outcome.
    pub async fn process(&self, request: &SettlementRequest) -> SettlementOutcome {
        self.intake_delay().await;
        self.settle(request).await
    }
}
