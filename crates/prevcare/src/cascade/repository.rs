use super::art::ArtPatient;
use super::assessment::Assessment;
use super::billing::{BillingEvent, BillingPeriod};
use super::domain::{
    AssessmentId, BillingEventId, BillingPeriodId, PatientId, ReferralId, TestResultId,
};
use super::referral::Referral;
use super::results::TestResult;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for assessments.
pub trait AssessmentStore: Send + Sync {
    fn insert_assessment(&self, assessment: Assessment) -> Result<Assessment, RepositoryError>;
    fn update_assessment(&self, assessment: Assessment) -> Result<(), RepositoryError>;
    fn fetch_assessment(&self, id: &AssessmentId) -> Result<Option<Assessment>, RepositoryError>;
    /// The pending/in-progress assessment for a patient, if any. The
    /// lifecycle invariant keeps this at most one.
    fn open_assessment_for_patient(
        &self,
        patient: &PatientId,
    ) -> Result<Option<Assessment>, RepositoryError>;
}

/// Storage abstraction for referrals. Codes live in a permanent namespace:
/// `code_exists` must answer across expired and cancelled referrals too.
pub trait ReferralStore: Send + Sync {
    fn insert_referral(&self, referral: Referral) -> Result<Referral, RepositoryError>;
    fn update_referral(&self, referral: Referral) -> Result<(), RepositoryError>;
    fn fetch_referral(&self, id: &ReferralId) -> Result<Option<Referral>, RepositoryError>;
    fn fetch_referral_by_code(&self, code: &str) -> Result<Option<Referral>, RepositoryError>;
    fn code_exists(&self, code: &str) -> Result<bool, RepositoryError>;
}

/// Storage abstraction for test results. `insert_result` must reject a
/// second result for the same referral with `Conflict`.
pub trait ResultStore: Send + Sync {
    fn insert_result(&self, result: TestResult) -> Result<TestResult, RepositoryError>;
    fn update_result(&self, result: TestResult) -> Result<(), RepositoryError>;
    fn fetch_result(&self, id: &TestResultId) -> Result<Option<TestResult>, RepositoryError>;
    fn result_for_referral(
        &self,
        referral: &ReferralId,
    ) -> Result<Option<TestResult>, RepositoryError>;
}

/// Storage abstraction for ART enrollment. `insert_art_patient` must reject
/// a second record for the same patient with `Conflict`.
pub trait ArtStore: Send + Sync {
    fn insert_art_patient(&self, record: ArtPatient) -> Result<ArtPatient, RepositoryError>;
    fn update_art_patient(&self, record: ArtPatient) -> Result<(), RepositoryError>;
    fn art_patient_for(&self, patient: &PatientId) -> Result<Option<ArtPatient>, RepositoryError>;
}

/// Storage abstraction for the billing ledger.
///
/// `append_event` carries the mandatory storage-level backstop: a second
/// non-superseded event for the same (patient, service) pair must be
/// rejected with `Conflict` regardless of what the application layer
/// checked first.
pub trait BillingStore: Send + Sync {
    fn append_event(&self, event: BillingEvent) -> Result<BillingEvent, RepositoryError>;
    fn update_event(&self, event: BillingEvent) -> Result<(), RepositoryError>;
    fn fetch_event(&self, id: &BillingEventId) -> Result<Option<BillingEvent>, RepositoryError>;
    fn events_for_patient(&self, patient: &PatientId)
        -> Result<Vec<BillingEvent>, RepositoryError>;
    fn all_events(&self) -> Result<Vec<BillingEvent>, RepositoryError>;
    fn insert_period(&self, period: BillingPeriod) -> Result<BillingPeriod, RepositoryError>;
    fn update_period(&self, period: BillingPeriod) -> Result<(), RepositoryError>;
    fn fetch_period(&self, id: &BillingPeriodId)
        -> Result<Option<BillingPeriod>, RepositoryError>;
    /// The period currently accumulating events (draft status), if any.
    fn open_period(&self) -> Result<Option<BillingPeriod>, RepositoryError>;
}

/// Patient demographics lookup used by billing exports. A missing name is
/// not an error; projections fall back to the raw identifier.
pub trait PatientRegistry: Send + Sync {
    fn patient_name(&self, patient: &PatientId) -> Result<Option<String>, RepositoryError>;
}
