use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cascade::domain::{PatientId, ReferralId, TestOutcome, TestResultId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    RapidAntibody,
    Elisa,
    WesternBlot,
    SelfTest,
}

impl TestKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::RapidAntibody => "rapid_antibody",
            Self::Elisa => "elisa",
            Self::WesternBlot => "western_blot",
            Self::SelfTest => "self_test",
        }
    }
}

/// The single terminal result of a referral. Immutable after creation except
/// for the confirmation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: TestResultId,
    pub referral_id: ReferralId,
    pub patient_id: PatientId,
    pub outcome: TestOutcome,
    pub kind: TestKind,
    pub test_date: NaiveDate,
    pub confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

impl TestResult {
    /// Negative and indeterminate results auto-confirm; a positive result
    /// waits for an explicit confirmation step.
    pub fn requires_confirmation(&self) -> bool {
        self.outcome == TestOutcome::Positive && !self.confirmed
    }
}
