use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::cascade::art::ArtPatient;
use crate::cascade::assessment::{
    Assessment, AssessmentStatus, Questionnaire, ScoringEngine, ScoringRules, SubmissionOutcome,
};
use crate::cascade::audit::{AuditEntry, AuditError, AuditTrail};
use crate::cascade::billing::{BillingEvent, BillingPeriod, BillingPeriodStatus};
use crate::cascade::directory::{TestCenter, TestCenterDirectory};
use crate::cascade::domain::{
    AssessmentId, BillingEventId, BillingPeriodId, PatientId, Principal, ProgramRole,
    ReferralId, TestCenterId, TestResultId,
};
use crate::cascade::messaging::{DispatchError, NotificationDispatcher, NotificationIntent};
use crate::cascade::referral::Referral;
use crate::cascade::repository::{
    ArtStore, AssessmentStore, BillingStore, PatientRegistry, ReferralStore, RepositoryError,
    ResultStore,
};
use crate::cascade::results::TestResult;
use crate::cascade::CascadeServices;
use crate::config::ProgramConfig;

pub(super) type Services =
    CascadeServices<MemoryCascadeStore, MemoryBillingStore, MemoryAuditTrail, MemoryDispatcher>;

#[derive(Default)]
pub(super) struct MemoryCascadeStore {
    assessments: Mutex<HashMap<AssessmentId, Assessment>>,
    referrals: Mutex<HashMap<ReferralId, Referral>>,
    results: Mutex<HashMap<TestResultId, TestResult>>,
    art: Mutex<HashMap<PatientId, ArtPatient>>,
}

impl AssessmentStore for MemoryCascadeStore {
    fn insert_assessment(&self, assessment: Assessment) -> Result<Assessment, RepositoryError> {
        let mut guard = self.assessments.lock().expect("assessment mutex poisoned");
        if guard.contains_key(&assessment.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(assessment.id.clone(), assessment.clone());
        Ok(assessment)
    }

    fn update_assessment(&self, assessment: Assessment) -> Result<(), RepositoryError> {
        let mut guard = self.assessments.lock().expect("assessment mutex poisoned");
        if !guard.contains_key(&assessment.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(assessment.id.clone(), assessment);
        Ok(())
    }

    fn fetch_assessment(&self, id: &AssessmentId) -> Result<Option<Assessment>, RepositoryError> {
        let guard = self.assessments.lock().expect("assessment mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn open_assessment_for_patient(
        &self,
        patient: &PatientId,
    ) -> Result<Option<Assessment>, RepositoryError> {
        let guard = self.assessments.lock().expect("assessment mutex poisoned");
        Ok(guard
            .values()
            .find(|assessment| {
                assessment.patient_id == *patient
                    && matches!(
                        assessment.status,
                        AssessmentStatus::Pending | AssessmentStatus::InProgress
                    )
            })
            .cloned())
    }
}

impl ReferralStore for MemoryCascadeStore {
    fn insert_referral(&self, referral: Referral) -> Result<Referral, RepositoryError> {
        let mut guard = self.referrals.lock().expect("referral mutex poisoned");
        if guard.contains_key(&referral.id)
            || guard.values().any(|existing| existing.code == referral.code)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(referral.id.clone(), referral.clone());
        Ok(referral)
    }

    fn update_referral(&self, referral: Referral) -> Result<(), RepositoryError> {
        let mut guard = self.referrals.lock().expect("referral mutex poisoned");
        if !guard.contains_key(&referral.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(referral.id.clone(), referral);
        Ok(())
    }

    fn fetch_referral(&self, id: &ReferralId) -> Result<Option<Referral>, RepositoryError> {
        let guard = self.referrals.lock().expect("referral mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_referral_by_code(&self, code: &str) -> Result<Option<Referral>, RepositoryError> {
        let guard = self.referrals.lock().expect("referral mutex poisoned");
        Ok(guard.values().find(|referral| referral.code == code).cloned())
    }

    fn code_exists(&self, code: &str) -> Result<bool, RepositoryError> {
        let guard = self.referrals.lock().expect("referral mutex poisoned");
        Ok(guard.values().any(|referral| referral.code == code))
    }
}

impl ResultStore for MemoryCascadeStore {
    fn insert_result(&self, result: TestResult) -> Result<TestResult, RepositoryError> {
        let mut guard = self.results.lock().expect("result mutex poisoned");
        if guard
            .values()
            .any(|existing| existing.referral_id == result.referral_id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(result.id.clone(), result.clone());
        Ok(result)
    }

    fn update_result(&self, result: TestResult) -> Result<(), RepositoryError> {
        let mut guard = self.results.lock().expect("result mutex poisoned");
        if !guard.contains_key(&result.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(result.id.clone(), result);
        Ok(())
    }

    fn fetch_result(&self, id: &TestResultId) -> Result<Option<TestResult>, RepositoryError> {
        let guard = self.results.lock().expect("result mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn result_for_referral(
        &self,
        referral: &ReferralId,
    ) -> Result<Option<TestResult>, RepositoryError> {
        let guard = self.results.lock().expect("result mutex poisoned");
        Ok(guard
            .values()
            .find(|result| result.referral_id == *referral)
            .cloned())
    }
}

impl ArtStore for MemoryCascadeStore {
    fn insert_art_patient(&self, record: ArtPatient) -> Result<ArtPatient, RepositoryError> {
        let mut guard = self.art.lock().expect("art mutex poisoned");
        if guard.contains_key(&record.patient_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.patient_id.clone(), record.clone());
        Ok(record)
    }

    fn update_art_patient(&self, record: ArtPatient) -> Result<(), RepositoryError> {
        let mut guard = self.art.lock().expect("art mutex poisoned");
        if !guard.contains_key(&record.patient_id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.patient_id.clone(), record);
        Ok(())
    }

    fn art_patient_for(&self, patient: &PatientId) -> Result<Option<ArtPatient>, RepositoryError> {
        let guard = self.art.lock().expect("art mutex poisoned");
        Ok(guard.get(patient).cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryBillingStore {
    events: Mutex<Vec<BillingEvent>>,
    periods: Mutex<HashMap<BillingPeriodId, BillingPeriod>>,
    patients: Mutex<HashMap<PatientId, String>>,
}

impl MemoryBillingStore {
    pub(super) fn register_patient(&self, patient: PatientId, name: impl Into<String>) {
        self.patients
            .lock()
            .expect("patient mutex poisoned")
            .insert(patient, name.into());
    }

    pub(super) fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl BillingStore for MemoryBillingStore {
    fn append_event(&self, event: BillingEvent) -> Result<BillingEvent, RepositoryError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        let duplicate = guard.iter().any(|existing| {
            !existing.superseded
                && existing.patient_id == event.patient_id
                && existing.service == event.service
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.push(event.clone());
        Ok(event)
    }

    fn update_event(&self, event: BillingEvent) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == event.id) {
            Some(existing) => {
                *existing = event;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_event(&self, id: &BillingEventId) -> Result<Option<BillingEvent>, RepositoryError> {
        let guard = self.events.lock().expect("event mutex poisoned");
        Ok(guard.iter().find(|event| event.id == *id).cloned())
    }

    fn events_for_patient(
        &self,
        patient: &PatientId,
    ) -> Result<Vec<BillingEvent>, RepositoryError> {
        let guard = self.events.lock().expect("event mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| event.patient_id == *patient)
            .cloned()
            .collect())
    }

    fn all_events(&self) -> Result<Vec<BillingEvent>, RepositoryError> {
        Ok(self.events())
    }

    fn insert_period(&self, period: BillingPeriod) -> Result<BillingPeriod, RepositoryError> {
        let mut guard = self.periods.lock().expect("period mutex poisoned");
        if guard.contains_key(&period.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(period.id.clone(), period.clone());
        Ok(period)
    }

    fn update_period(&self, period: BillingPeriod) -> Result<(), RepositoryError> {
        let mut guard = self.periods.lock().expect("period mutex poisoned");
        if !guard.contains_key(&period.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(period.id.clone(), period);
        Ok(())
    }

    fn fetch_period(
        &self,
        id: &BillingPeriodId,
    ) -> Result<Option<BillingPeriod>, RepositoryError> {
        let guard = self.periods.lock().expect("period mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn open_period(&self) -> Result<Option<BillingPeriod>, RepositoryError> {
        let guard = self.periods.lock().expect("period mutex poisoned");
        Ok(guard
            .values()
            .find(|period| period.status == BillingPeriodStatus::Draft)
            .cloned())
    }
}

impl PatientRegistry for MemoryBillingStore {
    fn patient_name(&self, patient: &PatientId) -> Result<Option<String>, RepositoryError> {
        let guard = self.patients.lock().expect("patient mutex poisoned");
        Ok(guard.get(patient).cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryAuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditTrail {
    pub(super) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditTrail for MemoryAuditTrail {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryDispatcher {
    intents: Mutex<Vec<NotificationIntent>>,
}

impl MemoryDispatcher {
    pub(super) fn intents(&self) -> Vec<NotificationIntent> {
        self.intents.lock().expect("intent mutex poisoned").clone()
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn dispatch(&self, intent: NotificationIntent) -> Result<(), DispatchError> {
        self.intents.lock().expect("intent mutex poisoned").push(intent);
        Ok(())
    }
}

/// Dispatcher that always fails, for fire-and-forget coverage.
pub(super) struct RefusingDispatcher;

impl NotificationDispatcher for RefusingDispatcher {
    fn dispatch(&self, _intent: NotificationIntent) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("gateway offline".to_string()))
    }
}

pub(super) struct StaticDirectory {
    centers: HashMap<TestCenterId, TestCenter>,
}

impl Default for StaticDirectory {
    fn default() -> Self {
        let mut centers = HashMap::new();
        centers.insert(
            TestCenterId("tc-001".to_string()),
            TestCenter {
                id: TestCenterId("tc-001".to_string()),
                name: "Harborview Community Clinic".to_string(),
                address: "14 Quay Street".to_string(),
                hours: "Mon-Fri 08:00-17:00".to_string(),
                phone: "+1-555-0142".to_string(),
            },
        );
        Self { centers }
    }
}

impl TestCenterDirectory for StaticDirectory {
    fn lookup_center(&self, id: &TestCenterId) -> Option<TestCenter> {
        self.centers.get(id).cloned()
    }
}

pub(super) fn program_config() -> ProgramConfig {
    ProgramConfig {
        assessment_expiry_days: 14,
        referral_expiry_days: 30,
        adherence_window_days: 30,
    }
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn patient(id: &str) -> PatientId {
    PatientId(id.to_string())
}

pub(super) fn counselor() -> Principal {
    Principal::new("n-mokoena", ProgramRole::Counselor)
}

pub(super) fn billing_officer() -> Principal {
    Principal::new("d-okafor", ProgramRole::BillingOfficer)
}

pub(super) fn build_services() -> (
    Arc<Services>,
    Arc<MemoryCascadeStore>,
    Arc<MemoryBillingStore>,
    Arc<MemoryAuditTrail>,
    Arc<MemoryDispatcher>,
) {
    let store = Arc::new(MemoryCascadeStore::default());
    let billing = Arc::new(MemoryBillingStore::default());
    let audit = Arc::new(MemoryAuditTrail::default());
    let dispatcher = Arc::new(MemoryDispatcher::default());

    let services = Arc::new(CascadeServices::new(
        store.clone(),
        billing.clone(),
        audit.clone(),
        dispatcher.clone(),
        Arc::new(StaticDirectory::default()),
        ScoringEngine::new(ScoringRules::standard()),
        Questionnaire::standard(),
        &program_config(),
    ));

    (services, store, billing, audit, dispatcher)
}

/// Answer every question "yes" except the risk-reducing one: total 110,
/// tier high under the standard table.
pub(super) fn high_risk_answers() -> Vec<(&'static str, bool)> {
    vec![
        ("shared_needles", true),
        ("partner_positive", true),
        ("unprotected_sex", true),
        ("multiple_partners", true),
        ("transactional_sex", true),
        ("sti_history", true),
        ("tested_before", false),
    ]
}

/// Total 30 under the standard table: moderate.
pub(super) fn moderate_risk_answers() -> Vec<(&'static str, bool)> {
    vec![
        ("shared_needles", false),
        ("partner_positive", false),
        ("unprotected_sex", true),
        ("multiple_partners", false),
        ("transactional_sex", false),
        ("sti_history", true),
        ("tested_before", false),
    ]
}

/// Total -10 under the standard table: low.
pub(super) fn low_risk_answers() -> Vec<(&'static str, bool)> {
    vec![
        ("shared_needles", false),
        ("partner_positive", false),
        ("unprotected_sex", false),
        ("multiple_partners", false),
        ("transactional_sex", false),
        ("sti_history", false),
        ("tested_before", true),
    ]
}

/// Start an assessment and answer the whole questionnaire; returns the final
/// (completing) submission outcome.
pub(super) fn run_assessment(
    services: &Services,
    patient_id: &PatientId,
    answers: &[(&str, bool)],
) -> SubmissionOutcome {
    let assessment = services
        .assessments
        .start(patient_id, now())
        .expect("assessment starts");

    let mut outcome = None;
    for (question, answer) in answers {
        outcome = Some(
            services
                .assessments
                .submit_response(&assessment.id, question, *answer, &counselor(), now())
                .expect("response accepted"),
        );
    }
    outcome.expect("questionnaire is not empty")
}

/// High-risk assessment through to a scheduled referral, ready for a result.
pub(super) fn scheduled_referral(services: &Services, patient_id: &PatientId) -> Referral {
    let outcome = run_assessment(services, patient_id, &high_risk_answers());
    let referral = outcome.referral.expect("high risk opens a referral");

    services
        .referrals
        .mark_sent(&referral.id, now())
        .expect("sent");
    services
        .referrals
        .mark_received(&referral.id, now())
        .expect("received");
    services
        .referrals
        .schedule(&referral.id, TestCenterId("tc-001".to_string()), now())
        .expect("scheduled")
}
