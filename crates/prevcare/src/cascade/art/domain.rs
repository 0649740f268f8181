use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cascade::domain::{ArtPatientId, PatientId, TestResultId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtStatus {
    NotStarted,
    Active,
    Defaulted,
    Stopped,
    TransferredOut,
    Deceased,
}

impl ArtStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Defaulted => "defaulted",
            Self::Stopped => "stopped",
            Self::TransferredOut => "transferred_out",
            Self::Deceased => "deceased",
        }
    }

    pub const fn is_final(self) -> bool {
        matches!(self, Self::Stopped | Self::TransferredOut | Self::Deceased)
    }

    /// Forward-monotonic transitions; `Active` may be re-entered from
    /// `Defaulted` (resumption), never from a final state.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::NotStarted, Self::Active) => true,
            (Self::NotStarted, Self::Stopped | Self::TransferredOut | Self::Deceased) => true,
            (Self::Active, Self::Defaulted) => true,
            (Self::Active, Self::Stopped | Self::TransferredOut | Self::Deceased) => true,
            (Self::Defaulted, Self::Active) => true,
            (Self::Defaulted, Self::Stopped | Self::TransferredOut | Self::Deceased) => true,
            _ => false,
        }
    }
}

/// One day of adherence history. Daily granularity; the good/fair/poor
/// classification is derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceDay {
    pub date: NaiveDate,
    pub doses_missed: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdherenceLevel {
    Good,
    Fair,
    Poor,
}

impl AdherenceLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// Missed-dose classification over a rolling window ending today.
pub fn classify_adherence(
    log: &[AdherenceDay],
    window_days: u32,
    today: NaiveDate,
) -> AdherenceLevel {
    let cutoff = today - chrono::Duration::days(i64::from(window_days));
    let missed: u32 = log
        .iter()
        .filter(|day| day.date > cutoff && day.date <= today)
        .map(|day| u32::from(day.doses_missed))
        .sum();

    match missed {
        0..=1 => AdherenceLevel::Good,
        2..=4 => AdherenceLevel::Fair,
        _ => AdherenceLevel::Poor,
    }
}

/// One ART record per patient, ever. Created only as the side effect of a
/// positive test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtPatient {
    pub id: ArtPatientId,
    pub patient_id: PatientId,
    pub origin_result_id: TestResultId,
    pub status: ArtStatus,
    pub enrolled_on: NaiveDate,
    pub started_on: Option<NaiveDate>,
    pub regimen: Option<String>,
    pub next_appointment: Option<NaiveDate>,
    pub adherence: Vec<AdherenceDay>,
}
