use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use super::domain::{
    BillableService, BillingEvent, BillingPeriod, BillingPeriodStatus, EventReference,
    PatientBillingSummary, BILLING_CAP,
};
use crate::cascade::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::cascade::domain::{BillingEventId, BillingPeriodId, PatientId, Principal};
use crate::cascade::locks::PatientLocks;
use crate::cascade::repository::{BillingStore, RepositoryError};

/// Error raised by the billing ledger. `AlreadyBilled` and `CapReached` are
/// expected, first-class outcomes; both leave an audit entry behind.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{service} already billed for this patient")]
    AlreadyBilled { service: BillableService },
    #[error("billing cap reached (requested {requested}, remaining {remaining})")]
    CapReached { requested: u32, remaining: u32 },
    #[error("billing event not found")]
    EventNotFound,
    #[error("billing event already superseded")]
    AlreadySuperseded,
    #[error("billing period not found")]
    PeriodNotFound,
    #[error("a billing period is already open")]
    PeriodAlreadyOpen,
    #[error("billing period cannot move from {from} to {to}")]
    InvalidPeriodTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("billing export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static PERIOD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> BillingEventId {
    let id = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BillingEventId(format!("evt-{id:06}"))
}

fn next_period_id() -> BillingPeriodId {
    let id = PERIOD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BillingPeriodId(format!("per-{id:04}"))
}

/// Append-only billing ledger enforcing the per-patient cap and the one
/// event per (patient, service) dedup rule.
///
/// `record_event` serializes per patient: the dedup check and the cap check
/// observe a consistent snapshot, so two concurrent attempts for the same
/// patient cannot both pass the check phase. The store's unique constraint
/// is the backstop across process boundaries.
pub struct BillingLedger<B, A> {
    store: Arc<B>,
    audit: Arc<A>,
    locks: PatientLocks,
}

impl<B, A> BillingLedger<B, A>
where
    B: BillingStore + 'static,
    A: AuditTrail + 'static,
{
    pub fn new(store: Arc<B>, audit: Arc<A>) -> Self {
        Self {
            store,
            audit,
            locks: PatientLocks::default(),
        }
    }

    pub(crate) fn store(&self) -> &B {
        &self.store
    }

    /// Attempt to bill one service for a patient.
    ///
    /// Rejections do not insert a row, but they are still program-relevant
    /// history: every accepted and rejected attempt writes an audit entry.
    pub fn record_event(
        &self,
        patient_id: &PatientId,
        service: BillableService,
        reference: EventReference,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<BillingEvent, BillingError> {
        let slot = self.locks.slot(patient_id);
        let _serialized = slot.lock().expect("patient billing lock poisoned");

        let events = self.store.events_for_patient(patient_id)?;
        let accepted: Vec<&BillingEvent> =
            events.iter().filter(|event| !event.superseded).collect();

        let current_total: u32 = accepted.iter().map(|event| event.amount).sum();
        let amount = service.amount();
        if current_total + amount > BILLING_CAP {
            // Whole-event-or-nothing: no partial billing against the
            // remaining headroom. Checked before dedup so a capped patient
            // reports the cap no matter which service is attempted.
            let error = BillingError::CapReached {
                requested: amount,
                remaining: BILLING_CAP.saturating_sub(current_total),
            };
            self.audit_rejection(principal, patient_id, service, &error, now);
            return Err(error);
        }

        if accepted.iter().any(|event| event.service == service) {
            let error = BillingError::AlreadyBilled { service };
            self.audit_rejection(principal, patient_id, service, &error, now);
            return Err(error);
        }

        let period = self.store.open_period()?;
        let event = BillingEvent {
            id: next_event_id(),
            patient_id: patient_id.clone(),
            service,
            amount,
            reference,
            processed: false,
            superseded: false,
            created_at: now,
            period_id: period.as_ref().map(|period| period.id.clone()),
        };

        let stored = match self.store.append_event(event) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                // The storage backstop caught a concurrent duplicate.
                let error = BillingError::AlreadyBilled { service };
                self.audit_rejection(principal, patient_id, service, &error, now);
                return Err(error);
            }
            Err(other) => return Err(other.into()),
        };

        if let Some(mut period) = period {
            period.total_billed += amount;
            period.event_count += 1;
            self.store.update_period(period)?;
        }

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::BillingAccepted,
            patient_id: Some(patient_id.clone()),
            detail: format!("billed {} ({} units)", service, amount),
            before: None,
            after: serde_json::to_value(&stored).ok(),
            recorded_at: now,
        });

        Ok(stored)
    }

    /// `max(0, cap - current total)`, derived the same way as the cap check.
    pub fn remaining_billable_amount(&self, patient_id: &PatientId) -> Result<u32, BillingError> {
        Ok(BILLING_CAP.saturating_sub(self.total_billed(patient_id)?))
    }

    pub fn total_billed(&self, patient_id: &PatientId) -> Result<u32, BillingError> {
        let events = self.store.events_for_patient(patient_id)?;
        Ok(events
            .iter()
            .filter(|event| !event.superseded)
            .map(|event| event.amount)
            .sum())
    }

    /// Recomputed summary for the active period. Never persisted.
    pub fn summary_for(&self, patient_id: &PatientId) -> Result<PatientBillingSummary, BillingError> {
        let events = self.store.events_for_patient(patient_id)?;
        let period = self.store.open_period()?;
        Ok(PatientBillingSummary::from_events(
            patient_id.clone(),
            period.map(|period| period.id),
            &events,
        ))
    }

    /// Mark an event superseded, reopening its (patient, service) slot.
    pub fn supersede_event(
        &self,
        event_id: &BillingEventId,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<BillingEvent, BillingError> {
        let mut event = self
            .store
            .fetch_event(event_id)?
            .ok_or(BillingError::EventNotFound)?;
        if event.superseded {
            return Err(BillingError::AlreadySuperseded);
        }

        let slot = self.locks.slot(&event.patient_id);
        let _serialized = slot.lock().expect("patient billing lock poisoned");

        let before = serde_json::to_value(&event).ok();
        event.superseded = true;
        self.store.update_event(event.clone())?;

        if let Some(period_id) = event.period_id.clone() {
            if let Some(mut period) = self.store.fetch_period(&period_id)? {
                period.total_billed = period.total_billed.saturating_sub(event.amount);
                period.event_count = period.event_count.saturating_sub(1);
                self.store.update_period(period)?;
            }
        }

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::BillingSuperseded,
            patient_id: Some(event.patient_id.clone()),
            detail: format!("superseded {} event {}", event.service, event.id.0),
            before,
            after: serde_json::to_value(&event).ok(),
            recorded_at: now,
        });

        Ok(event)
    }

    /// Open a new draft period. Only one period may accumulate at a time.
    pub fn open_period(
        &self,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<BillingPeriod, BillingError> {
        if self.store.open_period()?.is_some() {
            return Err(BillingError::PeriodAlreadyOpen);
        }

        let period = BillingPeriod {
            id: next_period_id(),
            starts_on,
            ends_on,
            status: BillingPeriodStatus::Draft,
            total_billed: 0,
            event_count: 0,
        };
        let stored = self.store.insert_period(period)?;

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::PeriodOpened,
            patient_id: None,
            detail: format!(
                "opened billing period {} ({} to {})",
                stored.id.0, stored.starts_on, stored.ends_on
            ),
            before: None,
            after: serde_json::to_value(&stored).ok(),
            recorded_at: now,
        });

        Ok(stored)
    }

    /// Advance a period's status. Forward-only; `Paid` is sticky.
    pub fn advance_period(
        &self,
        period_id: &BillingPeriodId,
        next: BillingPeriodStatus,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<BillingPeriod, BillingError> {
        let mut period = self
            .store
            .fetch_period(period_id)?
            .ok_or(BillingError::PeriodNotFound)?;

        if !period.status.can_advance_to(next) {
            return Err(BillingError::InvalidPeriodTransition {
                from: period.status.label(),
                to: next.label(),
            });
        }

        let before = serde_json::to_value(&period).ok();
        period.status = next;
        self.store.update_period(period.clone())?;

        // Settlement with the payer closes the loop: member events are
        // marked processed once the period is paid.
        if next == BillingPeriodStatus::Paid {
            for mut event in self.store.all_events()? {
                if event.period_id.as_ref() == Some(&period.id) && !event.processed {
                    event.processed = true;
                    self.store.update_event(event)?;
                }
            }
        }

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::PeriodAdvanced,
            patient_id: None,
            detail: format!("period {} advanced to {}", period.id.0, next.label()),
            before,
            after: serde_json::to_value(&period).ok(),
            recorded_at: now,
        });

        Ok(period)
    }

    fn audit_rejection(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
        service: BillableService,
        error: &BillingError,
        now: DateTime<Utc>,
    ) {
        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::BillingRejected,
            patient_id: Some(patient_id.clone()),
            detail: format!("rejected {}: {}", service, error),
            before: None,
            after: None,
            recorded_at: now,
        });
    }

    pub(crate) fn append_audit(&self, entry: AuditEntry) {
        if let Err(error) = self.audit.append(entry) {
            warn!(%error, "audit entry could not be appended");
        }
    }
}
