use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::domain::{PatientId, Principal};

/// Auditable actions recorded by the billing ledger and reporting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BillingAccepted,
    BillingRejected,
    BillingSuperseded,
    PeriodOpened,
    PeriodAdvanced,
    ReportGenerated,
    CsvExported,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BillingAccepted => "billing_accepted",
            Self::BillingRejected => "billing_rejected",
            Self::BillingSuperseded => "billing_superseded",
            Self::PeriodOpened => "period_opened",
            Self::PeriodAdvanced => "period_advanced",
            Self::ReportGenerated => "report_generated",
            Self::CsvExported => "csv_exported",
        }
    }
}

/// Append-only audit record. Entries are never mutated or deleted; rejected
/// billing attempts are recorded with the same weight as accepted ones.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub principal: Principal,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Audit sink error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit sink.
pub trait AuditTrail: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
}
