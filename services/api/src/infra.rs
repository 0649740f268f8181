use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use prevcare::cascade::art::ArtPatient;
use prevcare::cascade::assessment::{
    Assessment, AssessmentStatus, Questionnaire, ScoringEngine, ScoringRules,
};
use prevcare::cascade::audit::{AuditEntry, AuditError, AuditTrail};
use prevcare::cascade::billing::{BillingEvent, BillingPeriod, BillingPeriodStatus};
use prevcare::cascade::directory::{TestCenter, TestCenterDirectory};
use prevcare::cascade::domain::{
    AssessmentId, BillingEventId, BillingPeriodId, PatientId, ReferralId, TestCenterId,
    TestResultId,
};
use prevcare::cascade::messaging::{DispatchError, NotificationDispatcher, NotificationIntent};
use prevcare::cascade::referral::Referral;
use prevcare::cascade::repository::{
    ArtStore, AssessmentStore, BillingStore, PatientRegistry, ReferralStore, RepositoryError,
    ResultStore,
};
use prevcare::cascade::results::TestResult;
use prevcare::cascade::CascadeServices;
use prevcare::config::ProgramConfig;

pub(crate) type Services = CascadeServices<
    InMemoryCascadeStore,
    InMemoryBillingStore,
    InMemoryAuditLog,
    LoggingDispatcher,
>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything the server and the CLI demo need to drive one cascade.
pub(crate) struct CascadeHandles {
    pub(crate) services: Arc<Services>,
    pub(crate) billing: Arc<InMemoryBillingStore>,
    pub(crate) audit: Arc<InMemoryAuditLog>,
    pub(crate) dispatcher: Arc<LoggingDispatcher>,
}

pub(crate) fn build_cascade(program: &ProgramConfig) -> CascadeHandles {
    let store = Arc::new(InMemoryCascadeStore::default());
    let billing = Arc::new(InMemoryBillingStore::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let dispatcher = Arc::new(LoggingDispatcher::default());

    let services = Arc::new(CascadeServices::new(
        store,
        billing.clone(),
        audit.clone(),
        dispatcher.clone(),
        Arc::new(StaticTestCenterDirectory::default()),
        ScoringEngine::new(ScoringRules::standard()),
        Questionnaire::standard(),
        program,
    ));

    CascadeHandles {
        services,
        billing,
        audit,
        dispatcher,
    }
}

#[derive(Default)]
pub(crate) struct InMemoryCascadeStore {
    assessments: Mutex<HashMap<AssessmentId, Assessment>>,
    referrals: Mutex<HashMap<ReferralId, Referral>>,
    results: Mutex<HashMap<TestResultId, TestResult>>,
    art: Mutex<HashMap<PatientId, ArtPatient>>,
}

impl AssessmentStore for InMemoryCascadeStore {
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

impl ReferralStore for InMemoryCascadeStore {
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

impl ResultStore for InMemoryCascadeStore {
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

impl ArtStore for InMemoryCascadeStore {
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
pub(crate) struct InMemoryBillingStore {
    events: Mutex<Vec<BillingEvent>>,
    periods: Mutex<HashMap<BillingPeriodId, BillingPeriod>>,
    patients: Mutex<HashMap<PatientId, String>>,
}

impl InMemoryBillingStore {
    pub(crate) fn register_patient(&self, patient: PatientId, name: impl Into<String>) {
        self.patients
            .lock()
            .expect("patient mutex poisoned")
            .insert(patient, name.into());
    }
}

impl BillingStore for InMemoryBillingStore {
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
        let guard = self.events.lock().expect("event mutex poisoned");
        Ok(guard.clone())
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

impl PatientRegistry for InMemoryBillingStore {
    fn patient_name(&self, patient: &PatientId) -> Result<Option<String>, RepositoryError> {
        let guard = self.patients.lock().expect("patient mutex poisoned");
        Ok(guard.get(patient).cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub(crate) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditTrail for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }
}

/// Dispatcher standing in for the SMS collaborator: intents are logged and
/// retained so the demo can show what would have gone out.
#[derive(Default)]
pub(crate) struct LoggingDispatcher {
    intents: Mutex<Vec<NotificationIntent>>,
}

impl LoggingDispatcher {
    pub(crate) fn intents(&self) -> Vec<NotificationIntent> {
        self.intents.lock().expect("intent mutex poisoned").clone()
    }
}

impl NotificationDispatcher for LoggingDispatcher {
    fn dispatch(&self, intent: NotificationIntent) -> Result<(), DispatchError> {
        info!(
            patient = %intent.patient_id.0,
            template = intent.category.label(),
            "notification intent emitted"
        );
        self.intents.lock().expect("intent mutex poisoned").push(intent);
        Ok(())
    }
}

pub(crate) struct StaticTestCenterDirectory {
    centers: HashMap<TestCenterId, TestCenter>,
}

impl Default for StaticTestCenterDirectory {
    fn default() -> Self {
        let mut centers = HashMap::new();
        for (id, name, address, hours, phone) in [
            (
                "tc-001",
                "Harborview Community Clinic",
                "14 Quay Street",
                "Mon-Fri 08:00-17:00",
                "+1-555-0142",
            ),
            (
                "tc-002",
                "Eastgate Testing Center",
                "220 Meridian Avenue",
                "Mon-Sat 09:00-18:00",
                "+1-555-0188",
            ),
        ] {
            centers.insert(
                TestCenterId(id.to_string()),
                TestCenter {
                    id: TestCenterId(id.to_string()),
                    name: name.to_string(),
                    address: address.to_string(),
                    hours: hours.to_string(),
                    phone: phone.to_string(),
                },
            );
        }
        Self { centers }
    }
}

impl TestCenterDirectory for StaticTestCenterDirectory {
    fn lookup_center(&self, id: &TestCenterId) -> Option<TestCenter> {
        self.centers.get(id).cloned()
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
