//! ART enrollment: one record per patient, forward-monotonic status, and
//! derived adherence classification.

pub mod domain;
pub mod service;

pub use domain::{
    classify_adherence, AdherenceDay, AdherenceLevel, ArtPatient, ArtStatus,
};
pub use service::{ArtError, ArtService, ClinicVisit};
