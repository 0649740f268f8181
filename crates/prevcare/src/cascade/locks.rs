use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::PatientId;

/// Per-patient serialization guard.
///
/// Cross-patient operations are independent and must not share locks; the
/// registry hands out one reusable mutex per patient id. The storage-level
/// unique constraints remain the backstop across process boundaries.
#[derive(Default)]
pub(crate) struct PatientLocks {
    slots: Mutex<HashMap<PatientId, Arc<Mutex<()>>>>,
}

impl PatientLocks {
    pub(crate) fn slot(&self, patient: &PatientId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().expect("patient lock registry poisoned");
        slots
            .entry(patient.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
