use serde::{Deserialize, Serialize};

use super::domain::TestCenterId;

/// Snapshot returned by the test-center directory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCenter {
    pub id: TestCenterId,
    pub name: String,
    pub address: String,
    pub hours: String,
    pub phone: String,
}

/// Directory lookup consumed when enriching referral notification intents.
/// A missing center is not an error; the notification simply goes out
/// without location details.
pub trait TestCenterDirectory: Send + Sync {
    fn lookup_center(&self, id: &TestCenterId) -> Option<TestCenter>;
}
