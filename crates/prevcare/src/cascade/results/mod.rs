//! Test-result recording: the only path to a `tested` referral and the
//! origin of the `test_result_logged` and `art_started` billing events.

pub mod domain;
pub mod recorder;

pub use domain::{TestKind, TestResult};
pub use recorder::{RecordedOutcome, ResultError, ResultRecorder};
