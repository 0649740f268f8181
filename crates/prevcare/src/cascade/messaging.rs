use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{PatientId, RiskTier, TestOutcome};

/// Message templates the downstream messaging collaborator can select from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    RiskResult,
    ReferralCreated,
    ReferralScheduled,
    TestResultNegative,
    TestResultPositive,
    TestResultIndeterminate,
    AdherenceFollowUp,
}

impl TemplateCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::RiskResult => "risk_result",
            Self::ReferralCreated => "referral_created",
            Self::ReferralScheduled => "referral_scheduled",
            Self::TestResultNegative => "test_result_negative",
            Self::TestResultPositive => "test_result_positive",
            Self::TestResultIndeterminate => "test_result_indeterminate",
            Self::AdherenceFollowUp => "adherence_follow_up",
        }
    }
}

/// Structured notification request handed to the messaging collaborator.
///
/// The core never renders message text: template selection, localization, and
/// transport belong to the consumer of this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub patient_id: PatientId,
    pub category: TemplateCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TestOutcome>,
    pub variables: BTreeMap<String, String>,
}

impl NotificationIntent {
    pub fn new(patient_id: PatientId, category: TemplateCategory) -> Self {
        Self {
            patient_id,
            category,
            risk_tier: None,
            outcome: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_risk_tier(mut self, tier: RiskTier) -> Self {
        self.risk_tier = Some(tier);
        self
    }

    pub fn with_outcome(mut self, outcome: TestOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Dispatch error from the messaging collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound notification hook. Dispatch is fire-and-forget relative to the
/// cascade: a failed dispatch never rolls back a state transition.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, intent: NotificationIntent) -> Result<(), DispatchError>;
}
