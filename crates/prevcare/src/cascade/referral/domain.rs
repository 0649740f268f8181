use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cascade::domain::{AssessmentId, PatientId, ReferralId, TestCenterId};

pub const REFERRAL_CODE_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Sent,
    Received,
    Scheduled,
    Tested,
    NoShow,
    Cancelled,
}

impl ReferralStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Scheduled => "scheduled",
            Self::Tested => "tested",
            Self::NoShow => "no_show",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are frozen: no further progress, ever.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Tested | Self::NoShow | Self::Cancelled)
    }

    /// Transition table for the referral lifecycle. `Tested` is reachable
    /// only through the result recorder, never through this table.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Sent | Self::Cancelled) => true,
            (Self::Sent, Self::Received | Self::NoShow | Self::Cancelled) => true,
            (Self::Received, Self::Scheduled | Self::NoShow | Self::Cancelled) => true,
            (Self::Scheduled, Self::NoShow | Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// A test referral opened for a moderate/high risk assessment.
///
/// The human-readable code is a permanent namespace: codes are never reused,
/// even after the referral expires or is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: ReferralId,
    pub code: String,
    pub patient_id: PatientId,
    pub assessment_id: AssessmentId,
    pub test_center_id: Option<TestCenterId>,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Referral {
    /// Expiry is computed at creation and enforced lazily: a pending
    /// referral past its deadline reads as unusable without any sweep.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReferralStatus::Pending && now >= self.expires_at
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && !self.is_expired(now)
    }

    /// Status as reported to callers, with lazy expiry folded in.
    pub fn effective_status_label(&self, now: DateTime<Utc>) -> &'static str {
        if self.is_expired(now) {
            "expired"
        } else {
            self.status.label()
        }
    }
}
