use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cascade::domain::{AssessmentId, PatientId, RiskTier};

/// One question in the risk questionnaire. A negative weight marks a
/// risk-reducing factor (e.g. "has tested before").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub key: String,
    pub prompt: String,
    pub weight: i32,
}

/// Ordered questionnaire blueprint instantiated for every new assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Questionnaire {
    questions: Vec<QuestionTemplate>,
}

impl Questionnaire {
    pub fn new(questions: Vec<QuestionTemplate>) -> Self {
        Self { questions }
    }

    pub fn standard() -> Self {
        Self::new(standard_questions())
    }

    pub fn questions(&self) -> &[QuestionTemplate] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, key: &str) -> Option<&QuestionTemplate> {
        self.questions.iter().find(|question| question.key == key)
    }

    /// Achievable `(min, max)` total over all yes/no answer combinations.
    /// The scoring rule table must cover this span with no gaps.
    pub fn score_span(&self) -> (i32, i32) {
        let min = self
            .questions
            .iter()
            .map(|question| question.weight.min(0))
            .sum();
        let max = self
            .questions
            .iter()
            .map(|question| question.weight.max(0))
            .sum();
        (min, max)
    }
}

fn standard_questions() -> Vec<QuestionTemplate> {
    vec![
        QuestionTemplate {
            key: "shared_needles".to_string(),
            prompt: "In the last 12 months, have you shared needles or injection equipment?"
                .to_string(),
            weight: 25,
        },
        QuestionTemplate {
            key: "partner_positive".to_string(),
            prompt: "Do you have a sexual partner who is living with HIV?".to_string(),
            weight: 25,
        },
        QuestionTemplate {
            key: "unprotected_sex".to_string(),
            prompt: "In the last 6 months, have you had sex without a condom?".to_string(),
            weight: 20,
        },
        QuestionTemplate {
            key: "multiple_partners".to_string(),
            prompt: "Have you had more than one sexual partner in the last 6 months?".to_string(),
            weight: 15,
        },
        QuestionTemplate {
            key: "transactional_sex".to_string(),
            prompt: "Have you exchanged sex for money, goods, or shelter?".to_string(),
            weight: 15,
        },
        QuestionTemplate {
            key: "sti_history".to_string(),
            prompt: "Have you been diagnosed with a sexually transmitted infection in the last year?"
                .to_string(),
            weight: 10,
        },
        QuestionTemplate {
            key: "tested_before".to_string(),
            prompt: "Have you tested for HIV in the last 12 months?".to_string(),
            weight: -10,
        },
    ]
}

/// Recorded answer with the score contribution locked at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub question_key: String,
    pub weight: i32,
    pub answered_yes: bool,
    pub contribution: i32,
}

impl RecordedResponse {
    pub fn new(question: &QuestionTemplate, answered_yes: bool) -> Self {
        Self {
            question_key: question.key.clone(),
            weight: question.weight,
            answered_yes,
            contribution: if answered_yes { question.weight } else { 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

impl AssessmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

/// A patient's risk assessment. Never deleted; it completes or expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub patient_id: PatientId,
    pub responses: Vec<RecordedResponse>,
    pub status: AssessmentStatus,
    pub total_score: Option<i32>,
    pub risk_tier: Option<RiskTier>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Assessment {
    /// Expiry is lazy: an unanswered-past-deadline assessment reads as
    /// expired even before its stored status is flipped.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AssessmentStatus::Pending | AssessmentStatus::InProgress => now >= self.expires_at,
            AssessmentStatus::Expired => true,
            AssessmentStatus::Completed => false,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            AssessmentStatus::Pending | AssessmentStatus::InProgress
        ) && !self.is_expired(now)
    }

    pub fn has_answered(&self, question_key: &str) -> bool {
        self.responses
            .iter()
            .any(|response| response.question_key == question_key)
    }
}
