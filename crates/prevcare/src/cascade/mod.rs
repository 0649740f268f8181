//! The care cascade: assessment → referral → test result → ART enrollment,
//! with the billing ledger underneath every transition point.

pub mod art;
pub mod assessment;
pub mod audit;
pub mod billing;
pub mod directory;
pub mod domain;
pub mod messaging;
pub mod referral;
pub mod repository;
pub mod results;
pub mod router;

pub(crate) mod locks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use art::ArtService;
use assessment::{AssessmentService, Questionnaire, ScoringEngine};
use audit::AuditTrail;
use billing::BillingLedger;
use directory::TestCenterDirectory;
use messaging::NotificationDispatcher;
use referral::ReferralService;
use repository::{
    ArtStore, AssessmentStore, BillingStore, PatientRegistry, ReferralStore, ResultStore,
};
use results::ResultRecorder;

use crate::config::ProgramConfig;

pub use domain::{
    ArtPatientId, AssessmentId, BillingEventId, BillingPeriodId, PatientId, Principal,
    ProgramRole, ReferralId, RiskTier, TestCenterId, TestOutcome, TestResultId,
};
pub use router::cascade_router;

/// Umbrella error for cascade operations crossing the API/CLI boundary.
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error(transparent)]
    Assessment(#[from] assessment::AssessmentError),
    #[error(transparent)]
    Referral(#[from] referral::ReferralError),
    #[error(transparent)]
    Recorder(#[from] results::ResultError),
    #[error(transparent)]
    Art(#[from] art::ArtError),
    #[error(transparent)]
    Billing(#[from] billing::BillingError),
}

/// The wired cascade: every service sharing one clinical store, one billing
/// store, one audit sink, and one notification boundary.
pub struct CascadeServices<S, B, A, N> {
    pub assessments: Arc<AssessmentService<S, B, A, N>>,
    pub referrals: Arc<ReferralService<S, N>>,
    pub recorder: Arc<ResultRecorder<S, B, A, N>>,
    pub art: Arc<ArtService<S, N>>,
    pub ledger: Arc<BillingLedger<B, A>>,
}

impl<S, B, A, N> CascadeServices<S, B, A, N>
where
    S: AssessmentStore + ReferralStore + ResultStore + ArtStore + 'static,
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
    N: NotificationDispatcher + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        billing: Arc<B>,
        audit: Arc<A>,
        notifier: Arc<N>,
        directory: Arc<dyn TestCenterDirectory>,
        engine: ScoringEngine,
        questionnaire: Questionnaire,
        program: &ProgramConfig,
    ) -> Self {
        let ledger = Arc::new(BillingLedger::new(billing, audit));
        let referrals = Arc::new(ReferralService::new(
            store.clone(),
            notifier.clone(),
            directory,
            program.referral_expiry_days,
        ));
        let assessments = Arc::new(AssessmentService::new(
            store.clone(),
            referrals.clone(),
            ledger.clone(),
            notifier.clone(),
            engine,
            questionnaire,
            program.assessment_expiry_days,
        ));
        let recorder = Arc::new(ResultRecorder::new(
            store.clone(),
            ledger.clone(),
            notifier.clone(),
        ));
        let art = Arc::new(ArtService::new(
            store,
            notifier,
            program.adherence_window_days,
        ));

        Self {
            assessments,
            referrals,
            recorder,
            art,
            ledger,
        }
    }
}
