use serde::{Deserialize, Serialize};

/// Identifier wrapper for program patients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(pub String);

/// Identifier wrapper for risk assessments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

/// Identifier wrapper for test referrals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferralId(pub String);

/// Identifier wrapper for recorded test results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestResultId(pub String);

/// Identifier wrapper for ART enrollment records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtPatientId(pub String);

/// Identifier wrapper for billing ledger events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingEventId(pub String);

/// Identifier wrapper for billing periods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriodId(pub String);

/// Identifier wrapper for partner test centers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCenterId(pub String);

/// Risk tier assigned by the scoring engine when an assessment completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }

    /// Moderate and high tiers route the patient to a test referral.
    pub const fn requires_referral(self) -> bool {
        !matches!(self, Self::Low)
    }
}

/// Terminal value of an HIV test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Positive,
    Negative,
    Indeterminate,
}

impl TestOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Indeterminate => "indeterminate",
        }
    }
}

/// Role resolved by the identity collaborator before a mutating call reaches
/// the core. The core never authenticates; it records the caller for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramRole {
    Counselor,
    Clinician,
    BillingOfficer,
    ProgramAdmin,
    System,
}

impl ProgramRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Counselor => "counselor",
            Self::Clinician => "clinician",
            Self::BillingOfficer => "billing_officer",
            Self::ProgramAdmin => "program_admin",
            Self::System => "system",
        }
    }
}

/// Acting principal attached to audited operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor: String,
    pub role: ProgramRole,
}

impl Principal {
    pub fn new(actor: impl Into<String>, role: ProgramRole) -> Self {
        Self {
            actor: actor.into(),
            role,
        }
    }

    pub fn system() -> Self {
        Self::new("system", ProgramRole::System)
    }
}
