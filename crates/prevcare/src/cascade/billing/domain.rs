use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cascade::domain::{
    AssessmentId, ArtPatientId, BillingEventId, BillingPeriodId, PatientId, TestResultId,
};

/// Per-patient program cap, in currency units. The three fixed service
/// amounts are the only values by which the cap can be approached.
pub const BILLING_CAP: u32 = 850;

/// Billable program services with their fixed amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillableService {
    QuestionnaireDelivered,
    TestResultLogged,
    ArtStarted,
}

impl BillableService {
    pub const fn amount(self) -> u32 {
        match self {
            Self::QuestionnaireDelivered => 150,
            Self::TestResultLogged => 200,
            Self::ArtStarted => 500,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::QuestionnaireDelivered => "questionnaire_delivered",
            Self::TestResultLogged => "test_result_logged",
            Self::ArtStarted => "art_started",
        }
    }

    pub const fn all() -> [Self; 3] {
        [
            Self::QuestionnaireDelivered,
            Self::TestResultLogged,
            Self::ArtStarted,
        ]
    }
}

impl fmt::Display for BillableService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed reference to the clinical entity that triggered a billing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "table", content = "id")]
pub enum EventReference {
    Assessments(AssessmentId),
    TestResults(TestResultId),
    ArtPatients(ArtPatientId),
}

impl EventReference {
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Assessments(_) => "assessments",
            Self::TestResults(_) => "test_results",
            Self::ArtPatients(_) => "art_patients",
        }
    }

    pub fn reference_id(&self) -> &str {
        match self {
            Self::Assessments(id) => &id.0,
            Self::TestResults(id) => &id.0,
            Self::ArtPatients(id) => &id.0,
        }
    }
}

/// Append-only ledger event. The amount is fixed at creation and never
/// mutates; only the processed/period/superseded fields change later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: BillingEventId,
    pub patient_id: PatientId,
    pub service: BillableService,
    pub amount: u32,
    pub reference: EventReference,
    pub processed: bool,
    pub superseded: bool,
    pub created_at: DateTime<Utc>,
    pub period_id: Option<BillingPeriodId>,
}

/// Derived per-patient rollup. Recomputed from events, never hand-edited;
/// this is the authoritative surface for the cap check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientBillingSummary {
    pub patient_id: PatientId,
    pub period_id: Option<BillingPeriodId>,
    pub total: u32,
    pub questionnaire_billed: bool,
    pub test_result_billed: bool,
    pub art_billed: bool,
    pub cap_reached: bool,
}

impl PatientBillingSummary {
    pub fn from_events(
        patient_id: PatientId,
        period_id: Option<BillingPeriodId>,
        events: &[BillingEvent],
    ) -> Self {
        let accepted: Vec<&BillingEvent> = events
            .iter()
            .filter(|event| !event.superseded && event.patient_id == patient_id)
            .collect();

        let total: u32 = accepted.iter().map(|event| event.amount).sum();
        let billed = |service: BillableService| {
            accepted.iter().any(|event| event.service == service)
        };

        Self {
            patient_id,
            period_id,
            total,
            questionnaire_billed: billed(BillableService::QuestionnaireDelivered),
            test_result_billed: billed(BillableService::TestResultLogged),
            art_billed: billed(BillableService::ArtStarted),
            cap_reached: total >= BILLING_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriodStatus {
    Draft,
    Approved,
    Paid,
    Disputed,
    Cancelled,
}

impl BillingPeriodStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Forward-only lifecycle; no regression out of `Paid`.
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Draft, Self::Approved | Self::Cancelled) => true,
            (Self::Approved, Self::Paid | Self::Disputed | Self::Cancelled) => true,
            (Self::Disputed, Self::Paid | Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// Administrative billing window accumulating events for the payer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub id: BillingPeriodId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub status: BillingPeriodStatus,
    pub total_billed: u32,
    pub event_count: u32,
}
