use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use super::domain::{classify_adherence, AdherenceDay, AdherenceLevel, ArtPatient, ArtStatus};
use crate::cascade::domain::PatientId;
use crate::cascade::messaging::{NotificationDispatcher, NotificationIntent, TemplateCategory};
use crate::cascade::repository::{ArtStore, RepositoryError};

/// Error raised by ART enrollment operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtError {
    #[error("patient is not enrolled in ART")]
    NotEnrolled,
    #[error("ART status cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Details captured during a clinic visit. Visits may adjust the regimen
/// and the next appointment; they are explicitly non-billable.
#[derive(Debug, Clone, Default)]
pub struct ClinicVisit {
    pub regimen: Option<String>,
    pub next_appointment: Option<NaiveDate>,
}

/// Maintains the per-patient ART record after a positive result enrolled it.
pub struct ArtService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    adherence_window_days: u32,
}

impl<S, N> ArtService<S, N>
where
    S: ArtStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, adherence_window_days: u32) -> Self {
        Self {
            store,
            notifier,
            adherence_window_days,
        }
    }

    pub fn get(&self, patient_id: &PatientId) -> Result<ArtPatient, ArtError> {
        self.store
            .art_patient_for(patient_id)?
            .ok_or(ArtError::NotEnrolled)
    }

    /// Put the patient on treatment. Valid from `not_started` (first start)
    /// and from `defaulted` (resumption); the original start date is kept
    /// on resumption.
    pub fn start_treatment(
        &self,
        patient_id: &PatientId,
        regimen: String,
        started_on: NaiveDate,
    ) -> Result<ArtPatient, ArtError> {
        let mut record = self.get(patient_id)?;
        self.check_transition(&record, ArtStatus::Active)?;

        record.status = ArtStatus::Active;
        record.started_on = record.started_on.or(Some(started_on));
        record.regimen = Some(regimen);
        self.store.update_art_patient(record.clone())?;
        Ok(record)
    }

    /// Record a clinic visit. Never generates a billing event: clinic
    /// visits are non-billable under the current rule set.
    pub fn record_clinic_visit(
        &self,
        patient_id: &PatientId,
        visit: ClinicVisit,
    ) -> Result<ArtPatient, ArtError> {
        let mut record = self.get(patient_id)?;

        if let Some(regimen) = visit.regimen {
            record.regimen = Some(regimen);
        }
        if let Some(next_appointment) = visit.next_appointment {
            record.next_appointment = Some(next_appointment);
        }
        self.store.update_art_patient(record.clone())?;
        Ok(record)
    }

    /// Move the enrollment to a new status under the monotonic-forward rule.
    pub fn transition(
        &self,
        patient_id: &PatientId,
        next: ArtStatus,
    ) -> Result<ArtPatient, ArtError> {
        let mut record = self.get(patient_id)?;
        self.check_transition(&record, next)?;

        record.status = next;
        self.store.update_art_patient(record.clone())?;
        Ok(record)
    }

    /// Append one day of adherence history and reclassify the rolling
    /// window. A day logged twice keeps the latest count. Poor adherence
    /// emits a follow-up intent.
    pub fn log_adherence(
        &self,
        patient_id: &PatientId,
        date: NaiveDate,
        doses_missed: u8,
    ) -> Result<AdherenceLevel, ArtError> {
        let mut record = self.get(patient_id)?;

        match record.adherence.iter_mut().find(|day| day.date == date) {
            Some(day) => day.doses_missed = doses_missed,
            None => record.adherence.push(AdherenceDay { date, doses_missed }),
        }
        self.store.update_art_patient(record.clone())?;

        let level = classify_adherence(&record.adherence, self.adherence_window_days, date);
        if level == AdherenceLevel::Poor {
            let intent =
                NotificationIntent::new(patient_id.clone(), TemplateCategory::AdherenceFollowUp)
                    .with_variable("adherence_level", level.label().to_string())
                    .with_variable("window_days", self.adherence_window_days.to_string());
            if let Err(error) = self.notifier.dispatch(intent) {
                warn!(%error, "adherence follow-up could not be dispatched");
            }
        }

        Ok(level)
    }

    /// Pure derived read; nothing about the classification is persisted.
    pub fn adherence_level(
        &self,
        patient_id: &PatientId,
        today: NaiveDate,
    ) -> Result<AdherenceLevel, ArtError> {
        let record = self.get(patient_id)?;
        Ok(classify_adherence(
            &record.adherence,
            self.adherence_window_days,
            today,
        ))
    }

    fn check_transition(&self, record: &ArtPatient, next: ArtStatus) -> Result<(), ArtError> {
        if !record.status.can_transition_to(next) {
            return Err(ArtError::InvalidTransition {
                from: record.status.label(),
                to: next.label(),
            });
        }
        Ok(())
    }
}
