//! Test referral lifecycle: permanent-namespace codes, lazy expiry, and the
//! transition table up to (but excluding) the recorder-only `tested` state.

pub mod domain;
pub mod service;

pub use domain::{Referral, ReferralStatus, REFERRAL_CODE_LENGTH};
pub use service::{ReferralError, ReferralService};
