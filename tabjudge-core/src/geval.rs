//! Direct rubric scoring (G-Eval strategy).
//!
//! One structured call per unit: the model rates the answer 1-5 against a
//! fixed rubric, with no decomposition and no aggregation.

use crate::error::{ConfigError, EvalError};
use crate::inference::StructuredClient;
use crate::prompts;
use crate::schemas::{RubricScoreResult, rubric_score_function};
use serde::{Deserialize, Serialize};

/// Which rubric the scorer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    Faithfulness,
    Completeness,
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalMode::Faithfulness => write!(f, "faithfulness"),
            EvalMode::Completeness => write!(f, "completeness"),
        }
    }
}

impl std::str::FromStr for EvalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faithfulness" => Ok(EvalMode::Faithfulness),
            "completeness" => Ok(EvalMode::Completeness),
            other => Err(ConfigError::Invalid {
                message: format!("unknown evaluation mode '{other}'"),
            }),
        }
    }
}

/// A validated rubric rating in [1, 5].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub fn get(&self) -> u8 {
        self.0
    }
}

/// Scores answers directly against a rubric.
#[derive(Clone)]
pub struct DirectScorer {
    client: StructuredClient,
}

impl DirectScorer {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    /// Rate one answer. The rubric is selected by `mode`; the result is an
    /// integer in [1, 5], validated before it is returned.
    pub async fn score(
        &self,
        table: &str,
        question: &str,
        answer: &str,
        mode: EvalMode,
    ) -> Result<Rating, EvalError> {
        let prompt = match mode {
            EvalMode::Faithfulness => prompts::faithfulness_prompt(table, question, answer),
            EvalMode::Completeness => prompts::comprehensiveness_prompt(table, question, answer),
        };
        let result: RubricScoreResult = self
            .client
            .call(prompts::SCORE_SYSTEM, &prompt, &rubric_score_function())
            .await?;
        Ok(Rating(result.score))
    }
}
