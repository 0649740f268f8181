//! Risk assessment lifecycle and the scoring engine behind it.

pub mod domain;
pub mod scoring;
pub mod service;

pub use domain::{
    Assessment, AssessmentStatus, Questionnaire, QuestionTemplate, RecordedResponse,
};
pub use scoring::{
    RiskScore, ScoringConfigurationError, ScoringEngine, ScoringRule, ScoringRules,
};
pub use service::{AssessmentError, AssessmentService, SubmissionOutcome};
