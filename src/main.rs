//! Scripted demo scenario against the simulated lending backend: register a
//! client, complete and verify the profile, apply for a cash loan, and if the
//! underwriting approves it, settle one installment.

use anyhow::Context;
use clap::Parser;
use lendsim::domain::{
    Address, Documents, NextOfKin, PersonalDetails, ProfileUpdate, RepaymentPeriod,
    UploadedDocument, VerificationStatus,
};
use lendsim::service::{
    ApplyOutcome, CashLoanRequest, PaymentOutcome, PaymentRequest, RegisterOutcome,
};
use lendsim::{LendingService, ServiceConfig, WorkflowTiming};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "lendsim",
    about = "Run a scripted lending scenario against the simulated backend"
)]
struct Args {
    /// Data directory for the JSON collection documents
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Seed the decision source for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the simulated latency windows
    #[arg(long)]
    fast: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServiceConfig::new(&args.data_dir);
    if let Some(seed) = args.seed {
        config = config.decision_seed(seed);
    }
    if args.fast {
        config = config.timing(WorkflowTiming::instant());
    }

    let service = LendingService::open(config)?;

    let mobile = "+263771234567";
    let client = match service
        .register_client("Tariro", "Moyo", mobile, "1234")
        .await?
    {
        RegisterOutcome::Registered(client) => client,
        RegisterOutcome::MobileTaken => service
            .clients()
            .find_by_mobile(mobile)
            .await?
            .context("mobile registered but client not found")?,
    };
    info!(client_id = %client.id, "client ready");

    service
        .update_profile(&client.id, complete_profile())
        .await?;
    service
        .set_verification_status(&client.id, VerificationStatus::Verified)
        .await?;

    let quote = service.quote_cash_loan(20_000.0, RepaymentPeriod::Months12);
    info!(
        total = quote.total_amount,
        monthly = quote.monthly_payment,
        rate = quote.interest_rate,
        "cash loan quote"
    );

    let application = match service
        .apply_for_cash_loan(
            &client.id,
            CashLoanRequest {
                amount: 20_000.0,
                repayment_period: RepaymentPeriod::Months12,
                purpose: "SCHOOL_FEES".to_string(),
            },
        )
        .await?
    {
        ApplyOutcome::Submitted(application) => application,
        other => anyhow::bail!("application not accepted: {:?}", other),
    };
    info!(application_id = %application.id, "application submitted, underwriting in progress");

    let decided = loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let current = service
            .application(&application.id)
            .await?
            .context("application vanished")?;
        if current.status.is_terminal() {
            break current;
        }
    };
    info!(status = %decided.status, reason = ?decided.rejection_reason, "underwriting complete");

    if let Some(loan) = service
        .loans_of(&client.id)
        .await?
        .into_iter()
        .find(|l| l.application_id == decided.id)
    {
        let installment = loan.next_payment_amount.unwrap_or(loan.total_amount);
        let payment = match service
            .make_payment(
                &client.id,
                PaymentRequest {
                    loan_id: loan.id.clone(),
                    amount: installment,
                    method: "ECOCASH".to_string(),
                    phone_number: mobile.to_string(),
                },
            )
            .await?
        {
            PaymentOutcome::Accepted(payment) => payment,
            other => anyhow::bail!("payment not accepted: {:?}", other),
        };
        info!(payment_id = %payment.id, amount = payment.amount, "payment submitted");

        let settled = loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let current = service
                .payment(&payment.id)
                .await?
                .context("payment vanished")?;
            if current.status.is_terminal() {
                break current;
            }
        };
        let balance = service
            .loan(&loan.id)
            .await?
            .context("loan vanished")?
            .remaining_balance;
        info!(
            status = %settled.status,
            receipt = ?settled.receipt_number,
            reason = ?settled.failure_reason,
            remaining_balance = balance,
            "settlement complete"
        );
    }

    service.shutdown().await;
    Ok(())
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
