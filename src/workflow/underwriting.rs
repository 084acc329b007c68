//! Loan underwriting: SUBMITTED -> UNDER_REVIEW -> APPROVED | REJECTED.
//!
//! An unverified applicant is rejected unconditionally. Verified applicants
//! are approved by a uniform roll in `0..=100` against an amount-dependent
//! threshold: large cash loans clear at roll > 30 (~70%), large pay-as-you-go
//! at roll > 20 (~80%), everything else at roll > 10 (~90%).

use super::{DecisionSource, WorkflowTiming};
use crate::core::now_millis;
use crate::domain::{ApplicationStatus, LoanType, VerificationStatus};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

const REASON_UNVERIFIED: &str = "Profile verification incomplete";
const REASON_OVER_LIMIT: &str = "Requested amount exceeds maximum limit for your profile";
const REASON_GENERIC: &str = "Unable to approve at this time. Please contact support.";

#[derive(Debug, Clone)]
pub struct UnderwritingRequest {
    pub application_id: String,
    pub loan_type: LoanType,
    pub amount: f64,
    pub verification_status: VerificationStatus,
}

/// Terminal outcome of one underwriting run.
#[derive(Debug, Clone)]
pub struct ApplicationDecision {
    pub application_id: String,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub decided_at: i64,
}

impl ApplicationDecision {
    pub fn is_approved(&self) -> bool {
        self.status == ApplicationStatus::Approved
    }
}

pub struct LoanUnderwriting {
    timing: WorkflowTiming,
    decisions: Arc<dyn DecisionSource>,
}

impl LoanUnderwriting {
    pub fn new(timing: WorkflowTiming, decisions: Arc<dyn DecisionSource>) -> Self {
        Self { timing, decisions }
    }

    /// Simulated intake latency between submission and the start of review.
    pub async fn intake_delay(&self) {
        sleep(self.timing.submission_delay).await;
    }

    /// Simulated review latency followed by the underwriting decision.
    pub async fn review(&self, request: &UnderwritingRequest) -> ApplicationDecision {
        let delay = WorkflowTiming::pick_in_window(
            self.timing.review_delay_min,
            self.timing.review_delay_max,
            self.decisions.as_ref(),
        );
        sleep(delay).await;
        self.decide(request)
    }

    /// Full run: intake latency, review latency, decision.
    pub async fn process(&self, request: &UnderwritingRequest) -> ApplicationDecision {
        self.intake_delay().await;
        self.review(request).await
    }

    fn decide(&self, request: &UnderwritingRequest) -> ApplicationDecision {
        let approved = self.determine_approval(request);
        let decision = if approved {
            ApplicationDecision {
                application_id: request.application_id.clone(),
                status: ApplicationStatus::Approved,
                rejection_reason: None,
                decided_at: now_millis(),
            }
        } else {
            ApplicationDecision {
                application_id: request.application_id.clone(),
                status: ApplicationStatus::Rejected,
                rejection_reason: Some(rejection_reason(
                    request.amount,
                    request.verification_status,
                )),
                decided_at: now_millis(),
            }
        };
        debug!(
            application_id = %decision.application_id,
            status = %decision.status,
            "underwriting decision"
        );
        decision
    }

    fn determine_approval(&self, request: &UnderwritingRequest) -> bool {
        if request.verification_status != VerificationStatus::Verified {
            return false;
        }
        let threshold = match request.loan_type {
            LoanType::Cash if request.amount > 50_000.0 => 30,
            LoanType::Paygo if request.amount > 100_000.0 => 20,
            _ => 10,
        };
        self.decisions.roll() > threshold
    }
}

fn rejection_reason(amount: f64, verification_status: VerificationStatus) -> String {
    if verification_status != VerificationStatus::Verified {
        REASON_UNVERIFIED.to_string()
    } else if amount > 100_000.0 {
        REASON_OVER_LIMIT.to_string()
    } else {
        REASON_GENERIC.to_string()
    }
}
