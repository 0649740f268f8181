use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::domain::{Referral, ReferralStatus, REFERRAL_CODE_LENGTH};
use crate::cascade::directory::TestCenterDirectory;
use crate::cascade::domain::{AssessmentId, PatientId, ReferralId, RiskTier, TestCenterId};
use crate::cascade::messaging::{NotificationDispatcher, NotificationIntent, TemplateCategory};
use crate::cascade::repository::{ReferralStore, RepositoryError};

/// Error raised by the referral lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("referral not found")]
    NotFound,
    #[error("referral is not open (status {status})")]
    NotOpen { status: &'static str },
    #[error("referral cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("referral code namespace exhausted")]
    CodeSpaceExhausted,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

static REFERRAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static CODE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

// No ambiguous glyphs (0/O, 1/I/L); codes are read back over the phone.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ23456789";
const CODE_ATTEMPTS: u32 = 64;

fn next_referral_id() -> ReferralId {
    let id = REFERRAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ReferralId(format!("ref-{id:06}"))
}

fn candidate_code(seed: u64) -> String {
    // Spread sequential seeds across the namespace so consecutive referrals
    // do not get guessable neighbors.
    let mut value = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(seed);
    let base = CODE_ALPHABET.len() as u64;
    let mut code = String::with_capacity(REFERRAL_CODE_LENGTH);
    for _ in 0..REFERRAL_CODE_LENGTH {
        code.push(CODE_ALPHABET[(value % base) as usize] as char);
        value /= base;
    }
    code
}

/// Manages referral state from creation to a terminal outcome. `tested` is
/// excluded here: only the result recorder closes a referral that way.
pub struct ReferralService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    directory: Arc<dyn TestCenterDirectory>,
    expiry_days: u32,
}

impl<S, N> ReferralService<S, N>
where
    S: ReferralStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        directory: Arc<dyn TestCenterDirectory>,
        expiry_days: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            expiry_days,
        }
    }

    /// Open a referral for a moderate/high risk assessment outcome.
    ///
    /// The code is collision-checked against every historical code,
    /// including expired and cancelled referrals: the namespace is
    /// permanent.
    pub fn open(
        &self,
        patient_id: &PatientId,
        assessment_id: &AssessmentId,
        risk_tier: RiskTier,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        let code = self.next_unused_code()?;
        let referral = Referral {
            id: next_referral_id(),
            code,
            patient_id: patient_id.clone(),
            assessment_id: assessment_id.clone(),
            test_center_id: None,
            status: ReferralStatus::Pending,
            created_at: now,
            expires_at: now + Duration::days(i64::from(self.expiry_days)),
        };
        let stored = self.store.insert_referral(referral)?;

        let intent = NotificationIntent::new(patient_id.clone(), TemplateCategory::ReferralCreated)
            .with_risk_tier(risk_tier)
            .with_variable("referral_code", stored.code.clone())
            .with_variable("expires_on", stored.expires_at.date_naive().to_string());
        self.dispatch(intent);

        Ok(stored)
    }

    pub fn mark_sent(
        &self,
        id: &ReferralId,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        self.transition(id, ReferralStatus::Sent, now)
    }

    pub fn mark_received(
        &self,
        id: &ReferralId,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        self.transition(id, ReferralStatus::Received, now)
    }

    /// Schedule the test at a center. The notification is enriched with the
    /// center's details when the directory knows it.
    pub fn schedule(
        &self,
        id: &ReferralId,
        center_id: TestCenterId,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        let mut referral = self.open_referral(id, now)?;
        self.check_transition(&referral, ReferralStatus::Scheduled)?;

        referral.status = ReferralStatus::Scheduled;
        referral.test_center_id = Some(center_id.clone());
        self.store.update_referral(referral.clone())?;

        let mut intent =
            NotificationIntent::new(referral.patient_id.clone(), TemplateCategory::ReferralScheduled)
                .with_variable("referral_code", referral.code.clone());
        if let Some(center) = self.directory.lookup_center(&center_id) {
            intent = intent
                .with_variable("center_name", center.name)
                .with_variable("center_address", center.address)
                .with_variable("center_hours", center.hours)
                .with_variable("center_phone", center.phone);
        }
        self.dispatch(intent);

        Ok(referral)
    }

    pub fn mark_no_show(
        &self,
        id: &ReferralId,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        self.transition(id, ReferralStatus::NoShow, now)
    }

    pub fn cancel(&self, id: &ReferralId, now: DateTime<Utc>) -> Result<Referral, ReferralError> {
        self.transition(id, ReferralStatus::Cancelled, now)
    }

    pub fn get(&self, id: &ReferralId) -> Result<Referral, ReferralError> {
        self.store.fetch_referral(id)?.ok_or(ReferralError::NotFound)
    }

    pub fn find_by_code(&self, code: &str) -> Result<Referral, ReferralError> {
        self.store
            .fetch_referral_by_code(code)?
            .ok_or(ReferralError::NotFound)
    }

    fn transition(
        &self,
        id: &ReferralId,
        next: ReferralStatus,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        let mut referral = self.open_referral(id, now)?;
        self.check_transition(&referral, next)?;

        referral.status = next;
        self.store.update_referral(referral.clone())?;
        Ok(referral)
    }

    fn open_referral(
        &self,
        id: &ReferralId,
        now: DateTime<Utc>,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get(id)?;
        if !referral.is_open(now) {
            return Err(ReferralError::NotOpen {
                status: referral.effective_status_label(now),
            });
        }
        Ok(referral)
    }

    fn check_transition(
        &self,
        referral: &Referral,
        next: ReferralStatus,
    ) -> Result<(), ReferralError> {
        if !referral.status.can_transition_to(next) {
            return Err(ReferralError::InvalidTransition {
                from: referral.status.label(),
                to: next.label(),
            });
        }
        Ok(())
    }

    fn next_unused_code(&self) -> Result<String, ReferralError> {
        for _ in 0..CODE_ATTEMPTS {
            let seed = CODE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let code = candidate_code(seed);
            if !self.store.code_exists(&code)? {
                return Ok(code);
            }
        }
        Err(ReferralError::CodeSpaceExhausted)
    }

    fn dispatch(&self, intent: NotificationIntent) {
        if let Err(error) = self.notifier.dispatch(intent) {
            warn!(%error, "referral notification could not be dispatched");
        }
    }
}
