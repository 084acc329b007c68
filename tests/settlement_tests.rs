/// Payment settlement tests
///
/// Exactly-once balance application and serialization of concurrent
/// settlements against one loan document
/// Run with: cargo test --test settlement_tests

use lendsim::domain::{
    Address, Documents, Loan, NextOfKin, PaymentStatus, PersonalDetails, ProfileUpdate,
    RepaymentPeriod, UploadedDocument, VerificationStatus,
};
use lendsim::service::{ApplyOutcome, CashLoanRequest, PaymentOutcome, PaymentRequest, RegisterOutcome};
use lendsim::workflow::DecisionSource;
use lendsim::{FixedDecisions, LendingService, ServiceConfig, WorkflowTiming};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Scripted decision source: consumes rolls in order, then repeats the last.
/// Lets one test approve the loan while failing every settlement.
struct SequenceDecisions {
    rolls: Mutex<VecDeque<u8>>,
    fallback: u8,
}

impl SequenceDecisions {
    fn new(rolls: &[u8], fallback: u8) -> Self {
        Self {
            rolls: Mutex::new(rolls.iter().copied().collect()),
            fallback,
        }
    }
}

impl DecisionSource for SequenceDecisions {
    fn roll(&self) -> u8 {
        let mut rolls = self.rolls.lock().unwrap();
        rolls.pop_front().unwrap_or(self.fallback)
    }

    fn pick(&self, _bound: usize) -> usize {
        0
    }
}

fn complete_profile() -> ProfileUpdate {
    let address = Address {
        street_address: "12 Samora Machel Ave".to_string(),
        suburb: "Avondale".to_string(),
        city: "Harare".to_string(),
        province: "Harare".to_string(),
        postal_code: "00263".to_string(),
        residence_type: "RENTED".to_string(),
    };
    let document = |name: &str| UploadedDocument {
        id: format!("doc-{}", name),
        file_name: format!("{}.pdf", name),
        url: format!("https://files.example/{}", name),
        document_type: name.to_uppercase(),
        uploaded_at: 0,
    };
    ProfileUpdate {
        personal_details: Some(PersonalDetails {
            first_name: "Tariro".to_string(),
            last_name: "Moyo".to_string(),
            date_of_birth: "1990-04-12".to_string(),
            gender: "F".to_string(),
            nationality: "Zimbabwean".to_string(),
            occupation: "Nurse".to_string(),
            monthly_income: 1_200.0,
        }),
        address: Some(address.clone()),
        profile_picture: None,
        documents: Some(Documents {
            national_id: Some(document("national_id")),
            proof_of_residence: Some(document("proof_of_residence")),
        }),
        next_of_kin: Some(NextOfKin {
            full_name: "Rudo Moyo".to_string(),
            relationship: "SISTER".to_string(),
            phone_number: "+263771000000".to_string(),
            address,
        }),
    }
}

/// Register a verified client and drive one application through to an
/// active loan. The decision source must approve the first roll.
async fn active_loan(service: &LendingService) -> (String, Loan) {
    let client = match service
        .register_client("Tariro", "Moyo", "+263771234567", "1234")
        .await
        .unwrap()
    {
        RegisterOutcome::Registered(client) => client,
        other => panic!("expected registration, got {:?}", other),
    };
    service
        .update_profile(&client.id, complete_profile())
        .await
        .unwrap();
    service
        .set_verification_status(&client.id, VerificationStatus::Verified)
        .await
        .unwrap();

    let application = match service
        .apply_for_cash_loan(
            &client.id,
            CashLoanRequest {
                amount: 20_000.0,
                repayment_period: RepaymentPeriod::Months12,
                purpose: "SCHOOL_FEES".to_string(),
            },
        )
        .await
        .unwrap()
    {
        ApplyOutcome::Submitted(application) => application,
        other => panic!("expected submission, got {:?}", other),
    };

    for _ in 0..500 {
        if let Some(loan) = service
            .loans_of(&client.id)
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.application_id == application.id)
        {
            return (client.id, loan);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("loan was never materialized");
}

async fn wait_for_settlement(service: &LendingService, payment_id: &str) -> PaymentStatus {
    for _ in 0..500 {
        if let Some(payment) = service.payment(payment_id).await.unwrap() {
            if payment.status.is_terminal() {
                return payment.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("payment {} never reached a terminal status", payment_id);
}

#[tokio::test]
async fn test_successful_settlement_applies_exactly_once() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let (user_id, loan) = active_loan(&service).await;
    let amount = 1_866.67;

    let payment = match service
        .make_payment(
            &user_id,
            PaymentRequest {
                loan_id: loan.id.clone(),
                amount,
                method: "ECOCASH".to_string(),
                phone_number: "+263771234567".to_string(),
            },
        )
        .await
        .unwrap()
    {
        PaymentOutcome::Accepted(payment) => payment,
        other => panic!("expected acceptance, got {:?}", other),
    };

    let status = wait_for_settlement(&service, &payment.id).await;
    assert_eq!(status, PaymentStatus::Successful);

    let settled = service.payment(&payment.id).await.unwrap().unwrap();
    assert!(settled.transaction_reference.unwrap().starts_with("TXN"));
    assert!(settled.receipt_number.unwrap().starts_with("RCP"));

    let after = service.loan(&loan.id).await.unwrap().unwrap();
    assert!((after.remaining_balance - (loan.remaining_balance - amount)).abs() < 1e-6);
    assert_eq!(after.payments_completed, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_settlements_serialize_on_the_loan() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(
        LendingService::open_with_decisions(
            ServiceConfig::new(dir.path())
                .timing(WorkflowTiming::instant())
                .workers(4),
            Arc::new(FixedDecisions::always_approve()),
        )
        .unwrap(),
    );

    let (user_id, loan) = active_loan(&service).await;
    let amount = 1_000.0;
    let num_payments = 5;

    let mut payment_ids = vec![];
    let mut handles = vec![];
    for _ in 0..num_payments {
        let service = Arc::clone(&service);
        let user_id = user_id.clone();
        let loan_id = loan.id.clone();
        handles.push(tokio::spawn(async move {
            match service
                .make_payment(
                    &user_id,
                    PaymentRequest {
                        loan_id,
                        amount,
                        method: "ECOCASH".to_string(),
                        phone_number: "+263771234567".to_string(),
                    },
                )
                .await
                .unwrap()
            {
                PaymentOutcome::Accepted(payment) => payment.id,
                other => panic!("expected acceptance, got {:?}", other),
            }
        }));
    }
    for handle in handles {
        payment_ids.push(handle.await.unwrap());
    }

    for payment_id in &payment_ids {
        let status = wait_for_settlement(&service, payment_id).await;
        assert_eq!(status, PaymentStatus::Successful);
    }

    // Every settlement landed exactly once: no lost decrement, no double.
    let after = service.loan(&loan.id).await.unwrap().unwrap();
    assert_eq!(after.payments_completed, num_payments as u32);
    let expected = loan.remaining_balance - amount * num_payments as f64;
    assert!((after.remaining_balance - expected).abs() < 1e-6);

    // Receipts stay unique under concurrent settlement.
    let mut receipts = std::collections::HashSet::new();
    for payment_id in &payment_ids {
        let payment = service.payment(payment_id).await.unwrap().unwrap();
        assert!(receipts.insert(payment.receipt_number.unwrap()));
    }

    match Arc::try_unwrap(service) {
        Ok(service) => service.shutdown().await,
        Err(_) => panic!("service still shared at shutdown"),
    }
}

#[tokio::test]
async fn test_failed_settlement_leaves_loan_untouched() {
    let dir = TempDir::new().unwrap();
    // First roll approves the application; every later roll fails settlement.
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(SequenceDecisions::new(&[100], 0)),
    )
    .unwrap();

    let (user_id, loan) = active_loan(&service).await;

    let payment = match service
        .make_payment(
            &user_id,
            PaymentRequest {
                loan_id: loan.id.clone(),
                amount: 1_866.67,
                method: "ECOCASH".to_string(),
                phone_number: "+263771234567".to_string(),
            },
        )
        .await
        .unwrap()
    {
        PaymentOutcome::Accepted(payment) => payment,
        other => panic!("expected acceptance, got {:?}", other),
    };

    let status = wait_for_settlement(&service, &payment.id).await;
    assert_eq!(status, PaymentStatus::Failed);

    let failed = service.payment(&payment.id).await.unwrap().unwrap();
    assert!(failed.failure_reason.is_some());
    assert!(failed.receipt_number.is_none());

    let after = service.loan(&loan.id).await.unwrap().unwrap();
    assert_eq!(after.payments_completed, 0);
    assert_eq!(after.remaining_balance, loan.remaining_balance);

    service.shutdown().await;
}

#[tokio::test]
async fn test_payment_against_unknown_loan() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let outcome = service
        .make_payment(
            "1",
            PaymentRequest {
                loan_id: "LOAN404".to_string(),
                amount: 100.0,
                method: "ECOCASH".to_string(),
                phone_number: "+263771234567".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, PaymentOutcome::LoanNotFound));

    service.shutdown().await;
}
