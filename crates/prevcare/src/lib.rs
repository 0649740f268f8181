//! Care-cascade orchestration and billing ledger for an HIV prevention program.
//!
//! The `cascade` module holds the domain core: risk assessment, referral,
//! test-result recording, ART enrollment, and the billing ledger with its
//! audit trail. `config`, `telemetry`, and `error` carry the service plumbing
//! shared with the API crate.

pub mod cascade;
pub mod config;
pub mod error;
pub mod telemetry;
