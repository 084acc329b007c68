//! Orchestration boundary: the process-wide service facade.
//!
//! A [`LendingService`] is constructed once at startup, passed explicitly to
//! whatever consumes it, and shut down explicitly. Foreground operations
//! create records and return immediately; each loan application and payment
//! enqueues exactly one background job whose worker drives the workflow and
//! persists the outcome through the collections' guarded status updates.
//!
//! Domain-rule violations (ineligible applicant, PIN mismatch, wrong state
//! for withdrawal) are typed outcomes here, not errors: a rejected loan or a
//! failed payment is a successful workflow completion.

pub mod jobs;

pub use jobs::Job;

use crate::config::ServiceConfig;
use crate::core::{CoreError, Result};
use crate::domain::{
    ApplicationStatus, Client, ClientCollection, Loan, LoanApplication, LoanCollection, LoanQuote,
    LoanStatus, LoanType, Payment, PaymentCollection, ProfileUpdate, RepaymentPeriod,
    TokenCollection, VerificationStatus, quote,
};
use crate::store::FileBackend;
use crate::workflow::{
    DecisionSource, LoanUnderwriting, PaymentSettlement, RandomDecisions, SettlementRequest,
    UnderwritingRequest,
};
use jobs::{WorkerContext, WorkerPool};
use std::sync::Arc;

const INELIGIBLE_MESSAGE: &str =
    "Profile incomplete or not verified. Please complete your profile and upload required documents.";

// ============================================================================
// Requests and typed outcomes
// ============================================================================

#[derive(Debug, Clone)]
pub struct CashLoanRequest {
    pub amount: f64,
    pub repayment_period: RepaymentPeriod,
    pub purpose: String,
}

#[derive(Debug, Clone)]
pub struct PaygoRequest {
    pub product_name: String,
    pub product_price: f64,
    pub repayment_period: RepaymentPeriod,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub loan_id: String,
    pub amount: f64,
    pub method: String,
    pub phone_number: String,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Registered(Client),
    MobileTaken,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(Client),
    UnknownMobile,
    PinMismatch,
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Submitted(LoanApplication),
    ClientNotFound,
    Ineligible { message: String },
}

#[derive(Debug)]
pub enum WithdrawOutcome {
    Withdrawn(LoanApplication),
    NotFound,
    NotWithdrawable { status: ApplicationStatus },
}

#[derive(Debug)]
pub enum PaymentOutcome {
    Accepted(Payment),
    LoanNotFound,
    LoanNotActive { status: LoanStatus },
}

// ============================================================================
// Service
// ============================================================================

pub struct LendingService {
    clients: Arc<ClientCollection>,
    loans: Arc<LoanCollection>,
    payments: Arc<PaymentCollection>,
    tokens: Arc<TokenCollection>,
    pool: WorkerPool,
}

impl LendingService {
    /// Open the service against a data directory, with the configured
    /// decision source (seeded if `decision_seed` is set).
    ///
    /// Must be called from within a tokio runtime; the worker pool is
    /// spawned immediately.
    pub fn open(config: ServiceConfig) -> Result<Self> {
        let decisions: Arc<dyn DecisionSource> = match config.decision_seed {
            Some(seed) => Arc::new(RandomDecisions::with_seed(seed)),
            None => Arc::new(RandomDecisions::new()),
        };
        Self::open_with_decisions(config, decisions)
    }

    /// Open with an explicit decision source; tests use this to force
    /// deterministic approve / reject / success / fail outcomes.
    pub fn open_with_decisions(
        config: ServiceConfig,
        decisions: Arc<dyn DecisionSource>,
    ) -> Result<Self> {
        let clients = Arc::new(ClientCollection::new(FileBackend::new(
            &config.data_dir,
            "clients.json",
        )?));
        let loans = Arc::new(LoanCollection::new(FileBackend::new(
            &config.data_dir,
            "loans.json",
        )?));
        let payments = Arc::new(PaymentCollection::new(FileBackend::new(
            &config.data_dir,
            "payments.json",
        )?));
        let tokens = Arc::new(TokenCollection::new(FileBackend::new(
            &config.data_dir,
            "tokens.json",
        )?));

        let ctx = Arc::new(WorkerContext {
            loans: loans.clone(),
            payments: payments.clone(),
            underwriting: LoanUnderwriting::new(config.timing.clone(), decisions.clone()),
            settlement: PaymentSettlement::new(config.timing.clone(), decisions),
        });
        let pool = WorkerPool::spawn(config.workers, ctx);

        Ok(Self {
            clients,
            loans,
            payments,
            tokens,
            pool,
        })
    }

    /// Close the job queue, drain in-flight workflow runs, and join the
    /// workers. Every record they touch is already persisted by then.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Clients and sessions
    // ------------------------------------------------------------------

    pub async fn register_client(
        &self,
        first_name: &str,
        last_name: &str,
        mobile: &str,
        pin: &str,
    ) -> Result<RegisterOutcome> {
        if self.clients.find_by_mobile(mobile).await?.is_some() {
            return Ok(RegisterOutcome::MobileTaken);
        }
        let client = self.clients.create(first_name, last_name, mobile, pin).await?;
        Ok(RegisterOutcome::Registered(client))
    }

    pub async fn login(&self, mobile: &str, pin: &str) -> Result<LoginOutcome> {
        let Some(client) = self.clients.find_by_mobile(mobile).await? else {
            return Ok(LoginOutcome::UnknownMobile);
        };
        if !client.verify_pin(pin) {
            return Ok(LoginOutcome::PinMismatch);
        }
        Ok(LoginOutcome::Authenticated(client))
    }

    pub async fn register_session_token(&self, device_id: &str, token_id: &str) -> Result<()> {
        self.tokens.register_device_token(device_id, token_id).await
    }

    /// Logout is irreversible for the token.
    pub async fn logout(&self, token_id: &str, device_id: Option<&str>) -> Result<()> {
        self.tokens.blacklist_token(token_id, device_id).await
    }

    /// Revoke every token registered to the device; returns how many.
    pub async fn logout_device(&self, device_id: &str) -> Result<usize> {
        self.tokens.blacklist_device_tokens(device_id).await
    }

    pub async fn is_token_revoked(&self, token_id: &str) -> Result<bool> {
        self.tokens.is_blacklisted(token_id).await
    }

    pub async fn client(&self, client_id: &str) -> Result<Option<Client>> {
        self.clients.find_by_id(client_id).await
    }

    pub async fn update_profile(&self, client_id: &str, patch: ProfileUpdate) -> Result<Client> {
        self.clients.update_profile(client_id, patch).await
    }

    pub async fn set_verification_status(
        &self,
        client_id: &str,
        status: VerificationStatus,
    ) -> Result<Client> {
        self.clients.set_verification_status(client_id, status).await
    }

    // ------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------

    pub fn quote_cash_loan(&self, amount: f64, repayment_period: RepaymentPeriod) -> LoanQuote {
        quote(LoanType::Cash, amount, repayment_period)
    }

    pub fn quote_paygo(&self, product_price: f64, repayment_period: RepaymentPeriod) -> LoanQuote {
        quote(LoanType::Paygo, product_price, repayment_period)
    }

    pub async fn apply_for_cash_loan(
        &self,
        user_id: &str,
        request: CashLoanRequest,
    ) -> Result<ApplyOutcome> {
        self.submit_application(
            user_id,
            LoanType::Cash,
            request.amount,
            request.repayment_period,
            Some(request.purpose),
            None,
        )
        .await
    }

    pub async fn apply_for_paygo(
        &self,
        user_id: &str,
        request: PaygoRequest,
    ) -> Result<ApplyOutcome> {
        self.submit_application(
            user_id,
            LoanType::Paygo,
            request.product_price,
            request.repayment_period,
            Some("PRODUCT_PURCHASE".to_string()),
            Some(request.product_name),
        )
        .await
    }

    async fn submit_application(
        &self,
        user_id: &str,
        loan_type: LoanType,
        amount: f64,
        repayment_period: RepaymentPeriod,
        purpose: Option<String>,
        product_name: Option<String>,
    ) -> Result<ApplyOutcome> {
        let Some(client) = self.clients.find_by_id(user_id).await? else {
            return Ok(ApplyOutcome::ClientNotFound);
        };
        if !client.can_apply_for_loan {
            return Ok(ApplyOutcome::Ineligible {
                message: INELIGIBLE_MESSAGE.to_string(),
            });
        }

        let application = self
            .loans
            .create_application(user_id, loan_type, amount, repayment_period, purpose, product_name)
            .await?;

        self.pool.enqueue(Job::Underwrite(UnderwritingRequest {
            application_id: application.id.clone(),
            loan_type,
            amount: application.loan_amount,
            verification_status: client.verification_status,
        }))?;

        Ok(ApplyOutcome::Submitted(application))
    }

    /// Withdraw a pre-decision application.
    ///
    /// Races an in-flight underwriting run benignly: whichever guarded
    /// transition lands first wins, and the loser observes the record's
    /// terminal state.
    pub async fn withdraw_application(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> Result<WithdrawOutcome> {
        let Some(application) = self.loans.find_application_by_id(application_id).await? else {
            return Ok(WithdrawOutcome::NotFound);
        };
        if application.user_id != user_id {
            return Ok(WithdrawOutcome::NotFound);
        }
        if application.status.is_terminal() {
            return Ok(WithdrawOutcome::NotWithdrawable {
                status: application.status,
            });
        }

        match self
            .loans
            .update_application_status(application_id, ApplicationStatus::Cancelled, None)
            .await
        {
            Ok(withdrawn) => Ok(WithdrawOutcome::Withdrawn(withdrawn)),
            Err(CoreError::InvalidTransition(_, _)) => {
                let status = self
                    .loans
                    .find_application_by_id(application_id)
                    .await?
                    .map(|a| a.status)
                    .unwrap_or(application.status);
                Ok(WithdrawOutcome::NotWithdrawable { status })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn application(&self, application_id: &str) -> Result<Option<LoanApplication>> {
        self.loans.find_application_by_id(application_id).await
    }

    pub async fn applications_of(&self, user_id: &str) -> Result<Vec<LoanApplication>> {
        self.loans.applications_by_user(user_id).await
    }

    pub async fn loan(&self, loan_id: &str) -> Result<Option<Loan>> {
        self.loans.find_loan_by_id(loan_id).await
    }

    pub async fn loans_of(&self, user_id: &str) -> Result<Vec<Loan>> {
        self.loans.loans_by_user(user_id).await
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub async fn make_payment(
        &self,
        user_id: &str,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome> {
        let Some(loan) = self.loans.find_loan_by_id(&request.loan_id).await? else {
            return Ok(PaymentOutcome::LoanNotFound);
        };
        if loan.user_id != user_id {
            return Ok(PaymentOutcome::LoanNotFound);
        }
        if loan.status != LoanStatus::Active {
            return Ok(PaymentOutcome::LoanNotActive { status: loan.status });
        }

        let payment = self
            .payments
            .create_payment(
                user_id,
                &request.loan_id,
                request.amount,
                &request.method,
                &request.phone_number,
            )
            .await?;

        // Exactly one settlement run per payment, tied to its creation.
        self.pool.enqueue(Job::Settle {
            request: SettlementRequest {
                payment_id: payment.id.clone(),
                amount: payment.amount,
                phone_number: payment.phone_number.clone(),
                method: payment.method.clone(),
            },
            loan_id: loan.id.clone(),
        })?;

        Ok(PaymentOutcome::Accepted(payment))
    }

    pub async fn payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        self.payments.find_by_id(payment_id).await
    }

    pub async fn payments_of(&self, user_id: &str) -> Result<Vec<Payment>> {
        self.payments.payments_by_user(user_id).await
    }

    pub async fn payments_for_loan(&self, loan_id: &str) -> Result<Vec<Payment>> {
        self.payments.payments_by_loan(loan_id).await
    }

    // ------------------------------------------------------------------
    // Direct collection access for advanced callers
    // ------------------------------------------------------------------

    pub fn clients(&self) -> &ClientCollection {
        &self.clients
    }

    pub fn loans(&self) -> &LoanCollection {
        &self.loans
    }

    pub fn payments(&self) -> &PaymentCollection {
        &self.payments
    }

    pub fn tokens(&self) -> &TokenCollection {
        &self.tokens
    }
}
