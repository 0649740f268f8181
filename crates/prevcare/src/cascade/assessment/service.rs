use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, warn};

use super::domain::{Assessment, AssessmentStatus, Questionnaire, RecordedResponse};
use super::scoring::{ScoringConfigurationError, ScoringEngine};
use crate::cascade::billing::{BillableService, BillingLedger, EventReference};
use crate::cascade::audit::AuditTrail;
use crate::cascade::domain::{AssessmentId, PatientId, Principal};
use crate::cascade::locks::PatientLocks;
use crate::cascade::messaging::{NotificationDispatcher, NotificationIntent, TemplateCategory};
use crate::cascade::referral::{Referral, ReferralError, ReferralService};
use crate::cascade::repository::{AssessmentStore, BillingStore, ReferralStore, RepositoryError};

/// Error raised by the assessment lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("patient already has an open assessment")]
    DuplicateAssessment,
    #[error("assessment not found")]
    NotFound,
    #[error("assessment is closed (status {status})")]
    Closed { status: &'static str },
    #[error("unknown question '{key}'")]
    UnknownQuestion { key: String },
    #[error("question '{key}' already answered")]
    AlreadyAnswered { key: String },
    #[error(transparent)]
    Scoring(#[from] ScoringConfigurationError),
    #[error(transparent)]
    Referral(#[from] ReferralError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a response submission. `referral` is set on the completing
/// submission when the risk tier routed the patient onward.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub assessment: Assessment,
    pub referral: Option<Referral>,
}

static ASSESSMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_assessment_id() -> AssessmentId {
    let id = ASSESSMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AssessmentId(format!("asm-{id:06}"))
}

/// Drives one assessment from start through completion or expiry, invoking
/// the scoring engine exactly once, at completion.
pub struct AssessmentService<S, B, A, N> {
    store: Arc<S>,
    referrals: Arc<ReferralService<S, N>>,
    ledger: Arc<BillingLedger<B, A>>,
    notifier: Arc<N>,
    engine: ScoringEngine,
    questionnaire: Questionnaire,
    expiry_days: u32,
    locks: PatientLocks,
}

impl<S, B, A, N> AssessmentService<S, B, A, N>
where
    S: AssessmentStore + ReferralStore + 'static,
    B: BillingStore + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        referrals: Arc<ReferralService<S, N>>,
        ledger: Arc<BillingLedger<B, A>>,
        notifier: Arc<N>,
        engine: ScoringEngine,
        questionnaire: Questionnaire,
        expiry_days: u32,
    ) -> Self {
        Self {
            store,
            referrals,
            ledger,
            notifier,
            engine,
            questionnaire,
            expiry_days,
            locks: PatientLocks::default(),
        }
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    /// Start an assessment. A patient with a live (non-expired pending or
    /// in-progress) assessment is rejected; a stale one is expired in place.
    pub fn start(
        &self,
        patient_id: &PatientId,
        now: DateTime<Utc>,
    ) -> Result<Assessment, AssessmentError> {
        let slot = self.locks.slot(patient_id);
        let _serialized = slot.lock().expect("patient assessment lock poisoned");

        if let Some(mut existing) = self.store.open_assessment_for_patient(patient_id)? {
            if existing.is_expired(now) {
                existing.status = AssessmentStatus::Expired;
                self.store.update_assessment(existing)?;
            } else {
                return Err(AssessmentError::DuplicateAssessment);
            }
        }

        let assessment = Assessment {
            id: next_assessment_id(),
            patient_id: patient_id.clone(),
            responses: Vec::new(),
            status: AssessmentStatus::Pending,
            total_score: None,
            risk_tier: None,
            created_at: now,
            expires_at: now + Duration::days(i64::from(self.expiry_days)),
        };
        Ok(self.store.insert_assessment(assessment)?)
    }

    /// Record one answer. The first answer moves the assessment to
    /// in-progress; the final answer completes it: score and tier are
    /// persisted atomically with the status flip, the risk-result intent is
    /// emitted, the questionnaire service is billed, and a referral opens
    /// when the tier calls for one.
    pub fn submit_response(
        &self,
        assessment_id: &AssessmentId,
        question_key: &str,
        answered_yes: bool,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, AssessmentError> {
        let patient_id = self
            .store
            .fetch_assessment(assessment_id)?
            .ok_or(AssessmentError::NotFound)?
            .patient_id;

        let slot = self.locks.slot(&patient_id);
        let _serialized = slot.lock().expect("patient assessment lock poisoned");

        // Re-read under the lock so concurrent submissions for the same
        // patient cannot interleave.
        let mut assessment = self
            .store
            .fetch_assessment(assessment_id)?
            .ok_or(AssessmentError::NotFound)?;

        if !assessment.is_open(now) {
            return Err(AssessmentError::Closed {
                status: if assessment.is_expired(now) {
                    AssessmentStatus::Expired.label()
                } else {
                    assessment.status.label()
                },
            });
        }

        let question = self
            .questionnaire
            .question(question_key)
            .ok_or_else(|| AssessmentError::UnknownQuestion {
                key: question_key.to_string(),
            })?;
        if assessment.has_answered(question_key) {
            return Err(AssessmentError::AlreadyAnswered {
                key: question_key.to_string(),
            });
        }

        assessment
            .responses
            .push(RecordedResponse::new(question, answered_yes));
        if assessment.status == AssessmentStatus::Pending {
            assessment.status = AssessmentStatus::InProgress;
        }

        if assessment.responses.len() < self.questionnaire.len() {
            self.store.update_assessment(assessment.clone())?;
            return Ok(SubmissionOutcome {
                assessment,
                referral: None,
            });
        }

        self.complete(assessment, principal, now)
    }

    pub fn get(&self, id: &AssessmentId) -> Result<Assessment, AssessmentError> {
        self.store.fetch_assessment(id)?.ok_or(AssessmentError::NotFound)
    }

    fn complete(
        &self,
        mut assessment: Assessment,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, AssessmentError> {
        let score = match self.engine.evaluate(&assessment.responses) {
            Ok(score) => score,
            Err(cause) => {
                // Misconfigured rule table: an operational fault, not a
                // patient-facing outcome. Surface loudly and stop.
                error!(%cause, assessment = %assessment.id.0, "scoring rule table rejected a completed assessment");
                return Err(cause.into());
            }
        };

        // Status, score, and tier land in one update: a completed assessment
        // with a null tier must never be observable.
        assessment.status = AssessmentStatus::Completed;
        assessment.total_score = Some(score.total);
        assessment.risk_tier = Some(score.tier);
        self.store.update_assessment(assessment.clone())?;

        let intent =
            NotificationIntent::new(assessment.patient_id.clone(), TemplateCategory::RiskResult)
                .with_risk_tier(score.tier)
                .with_variable("total_score", score.total.to_string());
        if let Err(cause) = self.notifier.dispatch(intent) {
            warn!(%cause, "risk-result notification could not be dispatched");
        }

        // Billing failure is logged, never fatal to care delivery; the
        // ledger audits the rejection on its own.
        if let Err(cause) = self.ledger.record_event(
            &assessment.patient_id,
            BillableService::QuestionnaireDelivered,
            EventReference::Assessments(assessment.id.clone()),
            principal,
            now,
        ) {
            warn!(%cause, patient = %assessment.patient_id.0, "questionnaire billing attempt rejected");
        }

        let referral = if score.tier.requires_referral() {
            Some(
                self.referrals
                    .open(&assessment.patient_id, &assessment.id, score.tier, now)?,
            )
        } else {
            None
        };

        Ok(SubmissionOutcome {
            assessment,
            referral,
        })
    }
}
