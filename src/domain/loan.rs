//! Loans and loan applications: records, guarded status transitions, interest
//! tiering, and balance amortization.
//!
//! Applications and loans share one aggregate document, so a decision landing
//! on an application and a balance decrement landing on a loan are serialized
//! by the same document lock.

use crate::core::{CoreError, Result, now_millis};
use crate::store::{EntityStore, StorageBackend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const COLLECTION: &str = "loans";

/// Thirty days of epoch milliseconds; the mock repayment cadence.
const PAYMENT_INTERVAL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

// ============================================================================
// Status machines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// Transitions are monotonic and one-directional.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (*self, next),
            (Submitted, UnderReview)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
                | (UnderReview, Cancelled)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Active,
    Completed,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanType {
    Cash,
    Paygo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentPeriod {
    #[serde(rename = "3_MONTHS")]
    Months3,
    #[serde(rename = "6_MONTHS")]
    Months6,
    #[serde(rename = "12_MONTHS")]
    Months12,
    #[serde(rename = "18_MONTHS")]
    Months18,
    #[serde(rename = "24_MONTHS")]
    Months24,
}

impl RepaymentPeriod {
    pub fn installments(&self) -> u32 {
        match self {
            Self::Months3 => 3,
            Self::Months6 => 6,
            Self::Months12 => 12,
            Self::Months18 => 18,
            Self::Months24 => 24,
        }
    }
}

// ============================================================================
// Business rules
// ============================================================================

/// Interest tiering: amount-based for cash loans, flat for pay-as-you-go.
pub fn interest_rate(loan_type: LoanType, amount: f64) -> f64 {
    match loan_type {
        LoanType::Cash => {
            if amount < 10_000.0 {
                0.15
            } else if amount < 50_000.0 {
                0.12
            } else {
                0.10
            }
        }
        LoanType::Paygo => 0.18,
    }
}

/// Repayment terms for a prospective loan; pure over its inputs.
#[derive(Debug, Clone, Serialize)]
pub struct LoanQuote {
    pub loan_type: LoanType,
    pub amount: f64,
    pub repayment_period: RepaymentPeriod,
    pub interest_rate: f64,
    pub total_amount: f64,
    pub total_interest: f64,
    pub total_payments: u32,
    pub monthly_payment: f64,
}

pub fn quote(loan_type: LoanType, amount: f64, repayment_period: RepaymentPeriod) -> LoanQuote {
    let rate = interest_rate(loan_type, amount);
    let total_amount = amount * (1.0 + rate);
    let total_payments = repayment_period.installments();
    LoanQuote {
        loan_type,
        amount,
        repayment_period,
        interest_rate: rate,
        total_amount,
        total_interest: total_amount - amount,
        total_payments,
        monthly_payment: total_amount / f64::from(total_payments),
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: String,
    pub user_id: String,
    pub loan_type: LoanType,
    pub loan_amount: f64,
    pub repayment_period: RepaymentPeriod,
    pub status: ApplicationStatus,
    pub submitted_at: Option<i64>,
    pub review_started_at: Option<i64>,
    pub review_completed_at: Option<i64>,
    pub approved_at: Option<i64>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub loan_purpose: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub user_id: String,
    pub application_id: String,
    pub loan_type: LoanType,
    pub original_amount: f64,
    pub total_amount: f64,
    pub remaining_balance: f64,
    pub interest_rate: f64,
    pub repayment_period: RepaymentPeriod,
    pub disbursement_date: i64,
    pub maturity_date: i64,
    pub status: LoanStatus,
    pub next_payment_date: Option<i64>,
    pub next_payment_amount: Option<f64>,
    pub payments_completed: u32,
    pub total_payments: u32,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub loan_purpose: Option<String>,
    #[serde(default)]
    pub installation_date: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a loan's repayment schedule.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub due_date: i64,
    pub amount: f64,
    pub principal: f64,
    pub interest: f64,
    pub is_paid: bool,
}

impl Loan {
    /// Fixed 30-day schedule derived from the loan terms.
    pub fn payment_schedule(&self) -> Vec<ScheduledPayment> {
        let monthly = self
            .next_payment_amount
            .unwrap_or(self.total_amount / f64::from(self.total_payments.max(1)));
        (1..=self.total_payments)
            .map(|n| ScheduledPayment {
                payment_number: n,
                due_date: self.disbursement_date + i64::from(n) * PAYMENT_INTERVAL_MS,
                amount: monthly,
                principal: monthly * 0.85,
                interest: monthly * 0.15,
                is_paid: n <= self.payments_completed,
            })
            .collect()
    }
}

fn default_next_id() -> u64 {
    1
}

/// Aggregate document: loans and applications share one file and one lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanBook {
    #[serde(default)]
    pub loans: HashMap<String, Loan>,
    #[serde(default)]
    pub applications: HashMap<String, LoanApplication>,
    #[serde(default = "default_next_id")]
    pub next_loan_id: u64,
    #[serde(default = "default_next_id")]
    pub next_application_id: u64,
}

impl Default for LoanBook {
    fn default() -> Self {
        Self {
            loans: HashMap::new(),
            applications: HashMap::new(),
            next_loan_id: 1,
            next_application_id: 1,
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

pub struct LoanCollection {
    store: EntityStore<LoanBook>,
}

impl LoanCollection {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            store: EntityStore::new(backend),
        }
    }

    pub async fn create_application(
        &self,
        user_id: &str,
        loan_type: LoanType,
        loan_amount: f64,
        repayment_period: RepaymentPeriod,
        loan_purpose: Option<String>,
        product_name: Option<String>,
    ) -> Result<LoanApplication> {
        let now = Utc::now();
        self.store
            .update(move |book| {
                let id = format!("APP{}", book.next_application_id);
                book.next_application_id += 1;
                let application = LoanApplication {
                    id: id.clone(),
                    user_id: user_id.to_string(),
                    loan_type,
                    loan_amount,
                    repayment_period,
                    status: ApplicationStatus::Submitted,
                    submitted_at: Some(now.timestamp_millis()),
                    review_started_at: None,
                    review_completed_at: None,
                    approved_at: None,
                    rejection_reason: None,
                    loan_purpose,
                    product_name,
                    created_at: now,
                    updated_at: now,
                };
                book.applications.insert(id, application.clone());
                application
            })
            .await
    }

    /// Guarded status transition for a single application.
    ///
    /// Transitions from a terminal status, or outside the state machine's
    /// arrows, are rejected with `InvalidTransition` rather than silently
    /// applied. Each workflow timestamp is set at most once.
    pub async fn update_application_status(
        &self,
        application_id: &str,
        next: ApplicationStatus,
        rejection_reason: Option<String>,
    ) -> Result<LoanApplication> {
        self.store
            .update(move |book| {
                let Some(application) = book.applications.get_mut(application_id) else {
                    return Err(CoreError::RecordNotFound(
                        COLLECTION.to_string(),
                        application_id.to_string(),
                    ));
                };

                if !application.status.can_transition_to(next) {
                    return Err(CoreError::InvalidTransition(
                        application.status.to_string(),
                        next.to_string(),
                    ));
                }

                let now = now_millis();
                match next {
                    ApplicationStatus::UnderReview => {
                        application.review_started_at.get_or_insert(now);
                    }
                    ApplicationStatus::Approved => {
                        application.review_completed_at.get_or_insert(now);
                        application.approved_at.get_or_insert(now);
                    }
                    ApplicationStatus::Rejected => {
                        application.review_completed_at.get_or_insert(now);
                    }
                    ApplicationStatus::Submitted | ApplicationStatus::Cancelled => {}
                }

                application.status = next;
                if rejection_reason.is_some() {
                    application.rejection_reason = rejection_reason;
                }
                application.updated_at = Utc::now();
                Ok(application.clone())
            })
            .await?
    }

    /// Materialize a loan from an approved application.
    pub async fn create_loan_from_application(
        &self,
        application: &LoanApplication,
    ) -> Result<Loan> {
        if application.status != ApplicationStatus::Approved {
            return Err(CoreError::InvalidTransition(
                application.status.to_string(),
                LoanStatus::Active.to_string(),
            ));
        }

        let now = Utc::now();
        let disbursed_at = now.timestamp_millis();
        let terms = quote(
            application.loan_type,
            application.loan_amount,
            application.repayment_period,
        );
        let months = i64::from(terms.total_payments);

        self.store
            .update(move |book| {
                let id = format!("LOAN{}", book.next_loan_id);
                book.next_loan_id += 1;
                let loan = Loan {
                    id: id.clone(),
                    user_id: application.user_id.clone(),
                    application_id: application.id.clone(),
                    loan_type: application.loan_type,
                    original_amount: application.loan_amount,
                    total_amount: terms.total_amount,
                    remaining_balance: terms.total_amount,
                    interest_rate: terms.interest_rate,
                    repayment_period: application.repayment_period,
                    disbursement_date: disbursed_at,
                    maturity_date: disbursed_at + months * PAYMENT_INTERVAL_MS,
                    status: LoanStatus::Active,
                    next_payment_date: Some(disbursed_at + PAYMENT_INTERVAL_MS),
                    next_payment_amount: Some(terms.monthly_payment),
                    payments_completed: 0,
                    total_payments: terms.total_payments,
                    product_name: application.product_name.clone(),
                    loan_purpose: application.loan_purpose.clone(),
                    installation_date: match application.loan_type {
                        LoanType::Paygo => Some(disbursed_at),
                        LoanType::Cash => None,
                    },
                    created_at: now,
                    updated_at: now,
                };
                book.loans.insert(id, loan.clone());
                loan
            })
            .await
    }

    /// Apply exactly one settled payment to the loan balance.
    ///
    /// The balance is monotonically non-increasing and floored at zero; the
    /// loan flips to COMPLETED exactly when the balance reaches zero and never
    /// reopens.
    pub async fn apply_payment(&self, loan_id: &str, amount: f64) -> Result<Loan> {
        self.store
            .update(move |book| {
                let Some(loan) = book.loans.get_mut(loan_id) else {
                    return Err(CoreError::RecordNotFound(
                        COLLECTION.to_string(),
                        loan_id.to_string(),
                    ));
                };

                let new_balance = loan.remaining_balance - amount;
                loan.remaining_balance = new_balance.max(0.0);
                loan.payments_completed += 1;
                if new_balance <= 0.0 {
                    loan.status = LoanStatus::Completed;
                    loan.next_payment_date = None;
                } else {
                    loan.next_payment_date = Some(now_millis() + PAYMENT_INTERVAL_MS);
                }
                loan.updated_at = Utc::now();
                Ok(loan.clone())
            })
            .await?
    }

    pub async fn find_loan_by_id(&self, loan_id: &str) -> Result<Option<Loan>> {
        Ok(self.store.read().await?.loans.get(loan_id).cloned())
    }

    pub async fn find_application_by_id(
        &self,
        application_id: &str,
    ) -> Result<Option<LoanApplication>> {
        Ok(self
            .store
            .read()
            .await?
            .applications
            .get(application_id)
            .cloned())
    }

    /// Linear scan; fine at mock scale.
    pub async fn loans_by_user(&self, user_id: &str) -> Result<Vec<Loan>> {
        let book = self.store.read().await?;
        Ok(book
            .loans
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    pub async fn applications_by_user(&self, user_id: &str) -> Result<Vec<LoanApplication>> {
        let book = self.store.read().await?;
        Ok(book
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}
