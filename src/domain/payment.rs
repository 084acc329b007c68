//! Payment records and the guarded settlement status machine.

use crate::core::{CoreError, Result, entropy_ref, now_millis};
use crate::store::{EntityStore, StorageBackend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const COLLECTION: &str = "payments";

/// Share of each repayment attributed to principal; the rest is interest.
const PRINCIPAL_SHARE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Successful)
                | (Pending, Failed)
                | (Processing, Successful)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub loan_id: String,
    /// Creation-time reference handed back to the caller immediately.
    pub payment_id: String,
    pub amount: f64,
    pub method: String,
    pub phone_number: String,
    #[serde(default)]
    pub receipt_number: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub processed_at: Option<i64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub principal: f64,
    pub interest: f64,
    pub penalties: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Settlement fields to merge into a payment record; `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default)]
pub struct SettlementUpdate {
    pub transaction_reference: Option<String>,
    pub receipt_number: Option<String>,
    pub failure_reason: Option<String>,
}

fn default_next_id() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentBook {
    #[serde(default)]
    pub payments: HashMap<String, Payment>,
    #[serde(default = "default_next_id")]
    pub next_payment_id: u64,
}

impl Default for PaymentBook {
    fn default() -> Self {
        Self {
            payments: HashMap::new(),
            next_payment_id: 1,
        }
    }
}

pub struct PaymentCollection {
    store: EntityStore<PaymentBook>,
}

impl PaymentCollection {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            store: EntityStore::new(backend),
        }
    }

    pub async fn create_payment(
        &self,
        user_id: &str,
        loan_id: &str,
        amount: f64,
        method: &str,
        phone_number: &str,
    ) -> Result<Payment> {
        let now = Utc::now();
        let reference = entropy_ref("TXN", 8);
        self.store
            .update(move |book| {
                let id = format!("PAY{}", book.next_payment_id);
                book.next_payment_id += 1;
                let payment = Payment {
                    id: id.clone(),
                    user_id: user_id.to_string(),
                    loan_id: loan_id.to_string(),
                    payment_id: reference,
                    amount,
                    method: method.to_string(),
                    phone_number: phone_number.to_string(),
                    receipt_number: None,
                    status: PaymentStatus::Pending,
                    transaction_reference: None,
                    processed_at: None,
                    failure_reason: None,
                    principal: amount * PRINCIPAL_SHARE,
                    interest: amount * (1.0 - PRINCIPAL_SHARE),
                    penalties: 0.0,
                    created_at: now,
                    updated_at: now,
                };
                book.payments.insert(id, payment.clone());
                payment
            })
            .await
    }

    /// Guarded settlement transition; terminal payments admit no update.
    pub async fn update_payment_status(
        &self,
        payment_id: &str,
        next: PaymentStatus,
        update: SettlementUpdate,
    ) -> Result<Payment> {
        self.store
            .update(move |book| {
                let Some(payment) = book.payments.get_mut(payment_id) else {
                    return Err(CoreError::RecordNotFound(
                        COLLECTION.to_string(),
                        payment_id.to_string(),
                    ));
                };

                if !payment.status.can_transition_to(next) {
                    return Err(CoreError::InvalidTransition(
                        payment.status.to_string(),
                        next.to_string(),
                    ));
                }

                if update.transaction_reference.is_some() {
                    payment.transaction_reference = update.transaction_reference;
                }
                if update.receipt_number.is_some() {
                    payment.receipt_number = update.receipt_number;
                }
                payment.failure_reason = update.failure_reason;
                if next.is_terminal() {
                    payment.processed_at.get_or_insert(now_millis());
                }
                payment.status = next;
                payment.updated_at = Utc::now();
                Ok(payment.clone())
            })
            .await?
    }

    pub async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>> {
        Ok(self.store.read().await?.payments.get(payment_id).cloned())
    }

    /// Linear scan; fine at mock scale.
    pub async fn payments_by_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        let book = self.store.read().await?;
        Ok(book
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    pub async fn payments_by_loan(&self, loan_id: &str) -> Result<Vec<Payment>> {
        let book = self.store.read().await?;
        Ok(book
            .payments
            .values()
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }
}
