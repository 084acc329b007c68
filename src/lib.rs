// ============================================================================
// lendsim Library
// ============================================================================

//! Simulated lending backend.
//!
//! Clients register, apply for loans (cash or pay-as-you-go), and make
//! payments. Each collection lives in one JSON aggregate document behind a
//! per-document lock; loan underwriting and payment settlement run as
//! detached background workflows that converge records to terminal states.
//!
//! ```no_run
//! use lendsim::{LendingService, ServiceConfig};
//! use lendsim::domain::RepaymentPeriod;
//! use lendsim::service::CashLoanRequest;
//!
//! # async fn demo() -> lendsim::Result<()> {
//! let service = LendingService::open(ServiceConfig::new("./data"))?;
//!
//! let outcome = service
//!     .apply_for_cash_loan(
//!         "1",
//!         CashLoanRequest {
//!             amount: 20_000.0,
//!             repayment_period: RepaymentPeriod::Months12,
//!             purpose: "SCHOOL_FEES".to_string(),
//!         },
//!     )
//!     .await?;
//! println!("{:?}", outcome);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod domain;
pub mod service;
pub mod store;
pub mod workflow;

// Re-export main types for convenience
pub use config::ServiceConfig;
pub use core::{CoreError, Result};
pub use service::{
    ApplyOutcome, LendingService, LoginOutcome, PaymentOutcome, RegisterOutcome, WithdrawOutcome,
};
pub use store::{EntityStore, FileBackend, MemoryBackend, StorageBackend};
pub use workflow::{DecisionSource, FixedDecisions, RandomDecisions, WorkflowTiming};
