/// End-to-end loan lifecycle tests
///
/// Application submission, asynchronous underwriting, loan materialization,
/// and repayment until completion, driven through the service facade
/// Run with: cargo test --test loan_lifecycle_tests

use lendsim::domain::{
    Address, ApplicationStatus, Documents, LoanApplication, LoanStatus, NextOfKin,
    PersonalDetails, ProfileUpdate, RepaymentPeriod, UploadedDocument, VerificationStatus,
};
use lendsim::service::{ApplyOutcome, CashLoanRequest, PaymentOutcome, PaymentRequest, RegisterOutcome};
use lendsim::{FixedDecisions, LendingService, ServiceConfig, WorkflowTiming};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

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

async fn eligible_client(service: &LendingService) -> String {
    let client = match service
        .register_client("Tariro", "Moyo", "+263771234567", "1234")
        .await
        .unwrap()
    {
        RegisterOutcome::Registered(client) => client,
        RegisterOutcome::MobileTaken => panic!("fresh data dir should have no clients"),
    };
    service
        .update_profile(&client.id, complete_profile())
        .await
        .unwrap();
    service
        .set_verification_status(&client.id, VerificationStatus::Verified)
        .await
        .unwrap();
    client.id
}

async fn wait_for_decision(service: &LendingService, application_id: &str) -> LoanApplication {
    for _ in 0..500 {
        if let Some(app) = service.application(application_id).await.unwrap() {
            if app.status.is_terminal() {
                return app;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("application {} never reached a terminal status", application_id);
}

async fn wait_for_settlement(service: &LendingService, payment_id: &str) {
    for _ in 0..500 {
        if let Some(payment) = service.payment(payment_id).await.unwrap() {
            if payment.status.is_terminal() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("payment {} never reached a terminal status", payment_id);
}

#[tokio::test]
async fn test_cash_loan_scenario_to_completion() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let user_id = eligible_client(&service).await;

    let application = match service
        .apply_for_cash_loan(
            &user_id,
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
    assert_eq!(application.status, ApplicationStatus::Submitted);

    let decided = wait_for_decision(&service, &application.id).await;
    assert_eq!(decided.status, ApplicationStatus::Approved);
    assert!(decided.approved_at.is_some());

    let loan = service
        .loans_of(&user_id)
        .await
        .unwrap()
        .into_iter()
        .find(|l| l.application_id == application.id)
        .expect("approved application must materialize a loan");
    assert!((loan.total_amount - 22_400.0).abs() < 1e-9);
    assert_eq!(loan.total_payments, 12);
    let monthly = loan.next_payment_amount.unwrap();
    assert!((monthly - 1_866.666_666_666_666_7).abs() < 1e-6);

    // First installment: balance drops by exactly the payment amount.
    let payment = match service
        .make_payment(
            &user_id,
            PaymentRequest {
                loan_id: loan.id.clone(),
                amount: monthly,
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
    wait_for_settlement(&service, &payment.id).await;

    let after_one = service.loan(&loan.id).await.unwrap().unwrap();
    assert!((after_one.remaining_balance - 20_533.333_333_333_332).abs() < 1e-6);
    assert_eq!(after_one.status, LoanStatus::Active);
    assert_eq!(after_one.payments_completed, 1);

    // Pay the remaining installments; the balance clamps at zero and the
    // loan completes without ever going negative.
    for _ in 0..11 {
        let current = service.loan(&loan.id).await.unwrap().unwrap();
        if current.status == LoanStatus::Completed {
            break;
        }
        let payment = match service
            .make_payment(
                &user_id,
                PaymentRequest {
                    loan_id: loan.id.clone(),
                    amount: monthly,
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
        wait_for_settlement(&service, &payment.id).await;
    }

    let settled = service.loan(&loan.id).await.unwrap().unwrap();
    assert_eq!(settled.status, LoanStatus::Completed);
    assert_eq!(settled.remaining_balance, 0.0);
    assert!(settled.remaining_balance >= 0.0);
    assert_eq!(settled.payments_completed, 12);

    // A completed loan accepts no further payments.
    let outcome = service
        .make_payment(
            &user_id,
            PaymentRequest {
                loan_id: loan.id.clone(),
                amount: monthly,
                method: "ECOCASH".to_string(),
                phone_number: "+263771234567".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        PaymentOutcome::LoanNotActive {
            status: LoanStatus::Completed
        }
    ));

    service.shutdown().await;
}

#[tokio::test]
async fn test_rejected_application_records_reason_and_no_loan() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_reject()),
    )
    .unwrap();

    let user_id = eligible_client(&service).await;
    let application = match service
        .apply_for_cash_loan(
            &user_id,
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

    let decided = wait_for_decision(&service, &application.id).await;
    assert_eq!(decided.status, ApplicationStatus::Rejected);
    assert_eq!(
        decided.rejection_reason.as_deref(),
        Some("Unable to approve at this time. Please contact support.")
    );
    assert!(decided.approved_at.is_none());
    assert!(service.loans_of(&user_id).await.unwrap().is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_incomplete_profile_is_ineligible() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let client = match service
        .register_client("Rudo", "Moyo", "+263772222222", "0000")
        .await
        .unwrap()
    {
        RegisterOutcome::Registered(client) => client,
        other => panic!("expected registration, got {:?}", other),
    };

    let outcome = service
        .apply_for_cash_loan(
            &client.id,
            CashLoanRequest {
                amount: 5_000.0,
                repayment_period: RepaymentPeriod::Months6,
                purpose: "RENT".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::Ineligible { .. }));
    assert!(service.applications_of(&client.id).await.unwrap().is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_paygo_loan_carries_product_terms() {
    let dir = TempDir::new().unwrap();
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(WorkflowTiming::instant()),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let user_id = eligible_client(&service).await;
    let application = match service
        .apply_for_paygo(
            &user_id,
            lendsim::service::PaygoRequest {
                product_name: "Solar Home Kit".to_string(),
                product_price: 1_500.0,
                repayment_period: RepaymentPeriod::Months6,
            },
        )
        .await
        .unwrap()
    {
        ApplyOutcome::Submitted(application) => application,
        other => panic!("expected submission, got {:?}", other),
    };
    assert_eq!(application.loan_purpose.as_deref(), Some("PRODUCT_PURCHASE"));

    let decided = wait_for_decision(&service, &application.id).await;
    assert_eq!(decided.status, ApplicationStatus::Approved);

    let loan = service
        .loans_of(&user_id)
        .await
        .unwrap()
        .into_iter()
        .find(|l| l.application_id == application.id)
        .expect("approved paygo application must materialize a loan");
    assert_eq!(loan.interest_rate, 0.18);
    assert!((loan.total_amount - 1_500.0 * 1.18).abs() < 1e-9);
    assert_eq!(loan.total_payments, 6);
    assert_eq!(loan.product_name.as_deref(), Some("Solar Home Kit"));
    assert!(loan.installation_date.is_some());

    service.shutdown().await;
}

#[tokio::test]
async fn test_withdraw_before_review_cancels_application() {
    let dir = TempDir::new().unwrap();
    // Keep intake slow enough to withdraw first; everything else instant.
    let timing = WorkflowTiming {
        submission_delay: Duration::from_millis(300),
        ..WorkflowTiming::instant()
    };
    let service = LendingService::open_with_decisions(
        ServiceConfig::new(dir.path()).timing(timing),
        Arc::new(FixedDecisions::always_approve()),
    )
    .unwrap();

    let user_id = eligible_client(&service).await;
    let application = match service
        .apply_for_cash_loan(
            &user_id,
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

    let withdrawn = service
        .withdraw_application(&user_id, &application.id)
        .await
        .unwrap();
    assert!(matches!(
        withdrawn,
        lendsim::WithdrawOutcome::Withdrawn(_)
    ));

    // Give the pre-empted underwriting run time to hit the guard and yield.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let current = service.application(&application.id).await.unwrap().unwrap();
    assert_eq!(current.status, ApplicationStatus::Cancelled);
    assert!(service.loans_of(&user_id).await.unwrap().is_empty());

    // A second withdrawal of a terminal application is a typed outcome.
    let again = service
        .withdraw_application(&user_id, &application.id)
        .await
        .unwrap();
    assert!(matches!(
        again,
        lendsim::WithdrawOutcome::NotWithdrawable {
            status: ApplicationStatus::Cancelled
        }
    ));

    service.shutdown().await;
}
