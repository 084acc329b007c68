pub mod client;
pub mod loan;
pub mod payment;
pub mod token;

pub use client::{
    AccountStatus, Address, Client, ClientBook, ClientCollection, Documents, NextOfKin,
    PersonalDetails, ProfileUpdate, UploadedDocument, VerificationStatus,
};
pub use loan::{
    ApplicationStatus, Loan, LoanApplication, LoanBook, LoanCollection, LoanQuote, LoanStatus,
    LoanType, RepaymentPeriod, ScheduledPayment, interest_rate, quote,
};
pub use payment::{Payment, PaymentBook, PaymentCollection, PaymentStatus, SettlementUpdate};
pub use token::{TokenBook, TokenCollection};
