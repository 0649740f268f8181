//! Billing ledger: append-only events, the per-patient cap, dedup rules,
//! derived summaries, billing periods, and payer-facing projections.

pub mod domain;
pub mod ledger;
pub mod report;

pub use domain::{
    BillableService, BillingEvent, BillingPeriod, BillingPeriodStatus, EventReference,
    PatientBillingSummary, BILLING_CAP,
};
pub use ledger::{BillingError, BillingLedger};
pub use report::{BillingReport, PatientStatement, StatementLine, CSV_HEADER};
