//! Background worker pool for detached workflow runs.
//!
//! Every loan application and payment enqueues exactly one job at creation
//! time, which makes the at-most-once settlement guarantee structural: no
//! other code path ever starts a workflow run. Workers drain the queue on
//! shutdown before the pool joins them.

use crate::core::{CoreError, Result};
use crate::domain::{
    ApplicationStatus, LoanCollection, PaymentCollection, PaymentStatus, SettlementUpdate,
};
use crate::workflow::{
    LoanUnderwriting, PaymentSettlement, SettlementRequest, UnderwritingRequest,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One detached workflow run.
pub enum Job {
    Underwrite(UnderwritingRequest),
    Settle {
        request: SettlementRequest,
        loan_id: String,
    },
}

/// Collections and workflows shared by every worker.
pub(crate) struct WorkerContext {
    pub loans: Arc<LoanCollection>,
    pub payments: Arc<PaymentCollection>,
    pub underwriting: LoanUnderwriting,
    pub settlement: PaymentSettlement,
}

impl WorkerContext {
    async fn run(&self, job: Job) {
        let result = match job {
            Job::Underwrite(request) => self.underwrite(request).await,
            Job::Settle { request, loan_id } => self.settle(request, loan_id).await,
        };
        if let Err(err) = result {
            warn!("workflow run failed: {}", err);
        }
    }

    async fn underwrite(&self, request: UnderwritingRequest) -> Result<()> {
        self.underwriting.intake_delay().await;

        // The application may have been withdrawn during intake; the losing
        // side of that race sees InvalidTransition and the run simply ends.
        match self
            .loans
            .update_application_status(
                &request.application_id,
                ApplicationStatus::UnderReview,
                None,
            )
            .await
        {
            Ok(_) => {}
            Err(CoreError::InvalidTransition(from, to)) => {
                debug!(
                    application_id = %request.application_id,
                    %from, %to,
                    "review pre-empted"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let decision = self.underwriting.review(&request).await;

        match self
            .loans
            .update_application_status(
                &request.application_id,
                decision.status,
                decision.rejection_reason.clone(),
            )
            .await
        {
            Ok(application) => {
                if decision.is_approved() {
                    let loan = self.loans.create_loan_from_application(&application).await?;
                    info!(
                        application_id = %application.id,
                        loan_id = %loan.id,
                        "loan disbursed"
                    );
                }
            }
            Err(CoreError::InvalidTransition(from, to)) => {
                debug!(
                    application_id = %request.application_id,
                    %from, %to,
                    "decision pre-empted"
                );
            }
            Err(err) => return Err(err),
        }

        Ok(())
    }

    async fn settle(&self, request: SettlementRequest, loan_id: String) -> Result<()> {
        self.settlement.intake_delay().await;
        self.payments
            .update_payment_status(
                &request.payment_id,
                PaymentStatus::Processing,
                SettlementUpdate::default(),
            )
            .await?;

        let outcome = self.settlement.settle(&request).await;
        self.payments
            .update_payment_status(
                &request.payment_id,
                outcome.status,
                SettlementUpdate {
                    transaction_reference: outcome.transaction_reference.clone(),
                    receipt_number: outcome.receipt_number.clone(),
                    failure_reason: outcome.failure_reason.clone(),
                },
            )
            .await?;

        if outcome.is_successful() {
            let loan = self.loans.apply_payment(&loan_id, request.amount).await?;
            info!(
                payment_id = %request.payment_id,
                loan_id = %loan.id,
                remaining_balance = loan.remaining_balance,
                "payment applied"
            );
        }

        Ok(())
    }
}

/// Fixed-size pool of workflow workers fed by an unbounded queue.
pub(crate) struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(workers: usize, ctx: Arc<WorkerContext>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = rx.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    ctx.run(job).await;
                }
                debug!(worker_id, "workflow worker drained");
            }));
        }

        Self { tx, handles }
    }

    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.tx.send(job).map_err(|_| {
            CoreError::ConcurrencyViolation("worker pool is shut down".to_string())
        })
    }

    /// Close the queue, let the workers drain it, and join them all.
    pub async fn shutdown(self) {
        drop(self.tx);
        for result in futures::future::join_all(self.handles).await {
            if let Err(err) = result {
                warn!("workflow worker join failed: {}", err);
            }
        }
    }
}
