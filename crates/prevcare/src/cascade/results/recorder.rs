use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use super::domain::{TestKind, TestResult};
use crate::cascade::art::{ArtPatient, ArtStatus};
use crate::cascade::audit::AuditTrail;
use crate::cascade::billing::{BillableService, BillingLedger, EventReference};
use crate::cascade::domain::{
    ArtPatientId, PatientId, ReferralId, Principal, TestOutcome, TestResultId,
};
use crate::cascade::messaging::{NotificationDispatcher, NotificationIntent, TemplateCategory};
use crate::cascade::referral::ReferralStatus;
use crate::cascade::repository::{
    ArtStore, BillingStore, ReferralStore, RepositoryError, ResultStore,
};

/// Error raised by the test-result recorder.
#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error("referral not found")]
    ReferralNotFound,
    #[error("referral is not open for testing (status {status})")]
    ReferralNotOpen { status: &'static str },
    #[error("referral already has a recorded result")]
    Duplicate,
    #[error("result not found")]
    NotFound,
    #[error("result is already confirmed")]
    AlreadyConfirmed,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What a successful recording produced: the result, the closed referral,
/// and the ART enrollment when the outcome was positive.
#[derive(Debug, Clone)]
pub struct RecordedOutcome {
    pub result: TestResult,
    pub referral_status: ReferralStatus,
    pub enrollment: Option<ArtPatient>,
}

static RESULT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static ART_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_result_id() -> TestResultId {
    let id = RESULT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TestResultId(format!("tst-{id:06}"))
}

fn next_art_id() -> ArtPatientId {
    let id = ART_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ArtPatientId(format!("art-{id:06}"))
}

/// Records the single terminal result of a referral.
///
/// This is the only path to a `tested` referral, and the boundary where the
/// `test_result_logged` and `art_started` billing events originate. Billing
/// failure never rolls back the clinical record.
pub struct ResultRecorder<S, B, A, N> {
    store: Arc<S>,
    ledger: Arc<BillingLedger<B, A>>,
    notifier: Arc<N>,
}

impl<S, B, A, N> ResultRecorder<S, B, A, N>
where
    S: ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<BillingLedger<B, A>>, notifier: Arc<N>) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    pub fn record(
        &self,
        referral_id: &ReferralId,
        outcome: TestOutcome,
        kind: TestKind,
        test_date: NaiveDate,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<RecordedOutcome, ResultError> {
        let mut referral = self
            .store
            .fetch_referral(referral_id)?
            .ok_or(ResultError::ReferralNotFound)?;

        if self.store.result_for_referral(referral_id)?.is_some() {
            return Err(ResultError::Duplicate);
        }
        if !referral.is_open(now) {
            return Err(ResultError::ReferralNotOpen {
                status: referral.effective_status_label(now),
            });
        }

        let confirmed = outcome != TestOutcome::Positive;
        let result = TestResult {
            id: next_result_id(),
            referral_id: referral_id.clone(),
            patient_id: referral.patient_id.clone(),
            outcome,
            kind,
            test_date,
            confirmed,
            confirmed_at: confirmed.then_some(now),
            recorded_at: now,
        };
        let result = match self.store.insert_result(result) {
            Ok(result) => result,
            Err(RepositoryError::Conflict) => return Err(ResultError::Duplicate),
            Err(other) => return Err(other.into()),
        };

        referral.status = ReferralStatus::Tested;
        self.store.update_referral(referral.clone())?;

        if let Err(cause) = self.ledger.record_event(
            &referral.patient_id,
            BillableService::TestResultLogged,
            EventReference::TestResults(result.id.clone()),
            principal,
            now,
        ) {
            warn!(%cause, patient = %referral.patient_id.0, "test-result billing attempt rejected");
        }

        let enrollment = if outcome == TestOutcome::Positive {
            self.enroll_once(&referral.patient_id, &result.id, principal, now)?
        } else {
            None
        };

        self.notify(&referral.patient_id, &referral.code, &result);

        Ok(RecordedOutcome {
            result,
            referral_status: referral.status,
            enrollment,
        })
    }

    /// Explicit confirmation step for a positive result.
    pub fn confirm(
        &self,
        result_id: &TestResultId,
        now: DateTime<Utc>,
    ) -> Result<TestResult, ResultError> {
        let mut result = self
            .store
            .fetch_result(result_id)?
            .ok_or(ResultError::NotFound)?;
        if result.confirmed {
            return Err(ResultError::AlreadyConfirmed);
        }

        result.confirmed = true;
        result.confirmed_at = Some(now);
        self.store.update_result(result.clone())?;
        Ok(result)
    }

    pub fn get(&self, result_id: &TestResultId) -> Result<TestResult, ResultError> {
        self.store.fetch_result(result_id)?.ok_or(ResultError::NotFound)
    }

    /// Create the patient's single ART record, or return the existing one
    /// untouched. `art_started` is billed only for a fresh enrollment; an
    /// already-enrolled patient generates no second attempt.
    fn enroll_once(
        &self,
        patient_id: &PatientId,
        origin_result_id: &TestResultId,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Option<ArtPatient>, ResultError> {
        if let Some(existing) = self.store.art_patient_for(patient_id)? {
            return Ok(Some(existing));
        }

        let record = ArtPatient {
            id: next_art_id(),
            patient_id: patient_id.clone(),
            origin_result_id: origin_result_id.clone(),
            status: ArtStatus::NotStarted,
            enrolled_on: now.date_naive(),
            started_on: None,
            regimen: None,
            next_appointment: None,
            adherence: Vec::new(),
        };
        let record = match self.store.insert_art_patient(record) {
            Ok(record) => record,
            // Unique-per-patient backstop fired; someone else enrolled first.
            Err(RepositoryError::Conflict) => {
                return Ok(self.store.art_patient_for(patient_id)?)
            }
            Err(other) => return Err(other.into()),
        };

        if let Err(cause) = self.ledger.record_event(
            patient_id,
            BillableService::ArtStarted,
            EventReference::ArtPatients(record.id.clone()),
            principal,
            now,
        ) {
            warn!(%cause, patient = %patient_id.0, "ART billing attempt rejected");
        }

        Ok(Some(record))
    }

    fn notify(&self, patient_id: &PatientId, referral_code: &str, result: &TestResult) {
        let category = match result.outcome {
            TestOutcome::Positive => TemplateCategory::TestResultPositive,
            TestOutcome::Negative => TemplateCategory::TestResultNegative,
            TestOutcome::Indeterminate => TemplateCategory::TestResultIndeterminate,
        };
        let intent = NotificationIntent::new(patient_id.clone(), category)
            .with_outcome(result.outcome)
            .with_variable("referral_code", referral_code.to_string())
            .with_variable("test_date", result.test_date.to_string())
            .with_variable("test_kind", result.kind.label().to_string());
        if let Err(error) = self.notifier.dispatch(intent) {
            warn!(%error, "test-result notification could not be dispatched");
        }
    }
}
