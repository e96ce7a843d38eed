//! Batch evaluation over prepared units.
//!
//! Units are fully independent, so a failed unit is logged and excluded
//! from the results while the run continues. Evaluation may fan out across
//! units with bounded concurrency; result order always follows input order.

use crate::claims::{AggregationPolicy, ClaimPipeline, ClaimVerdict};
use crate::dataset::EvaluationUnit;
use crate::error::EvalError;
use crate::geval::{DirectScorer, EvalMode};
use crate::inference::StructuredClient;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Which evaluation strategy the runner applies to every unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Single rubric-scoring call per unit.
    Direct(EvalMode),
    /// Decompose into claims, verify each, aggregate.
    ClaimLevel(AggregationPolicy),
}

/// One evaluated unit: the original fields plus the computed judgment and
/// the model that judged it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(flatten)]
    pub unit: EvaluationUnit,
    pub judge_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faithful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_verdicts: Option<Vec<ClaimVerdict>>,
}

/// A unit whose evaluation failed permanently, recorded with its identity
/// and cause and excluded from the results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUnit {
    pub example_id: crate::dataset::ExampleId,
    pub model: String,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<ResultRecord>,
    pub failures: Vec<FailedUnit>,
}

/// Evaluates a batch of units under one strategy.
#[derive(Clone)]
pub struct BatchRunner {
    client: StructuredClient,
    strategy: Strategy,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(client: StructuredClient, strategy: Strategy) -> Self {
        Self {
            client,
            strategy,
            concurrency: 1,
        }
    }

    /// Fan evaluation out across units. Units are independent, so this is
    /// safe at any width; keep it within the remote service's rate limits.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn evaluate_unit(&self, unit: &EvaluationUnit) -> Result<ResultRecord, EvalError> {
        let judge_model = self.client.model_name().to_string();
        match self.strategy {
            Strategy::Direct(mode) => {
                let scorer = DirectScorer::new(self.client.clone());
                let rating = scorer
                    .score(&unit.table.to_string(), &unit.question, &unit.answer, mode)
                    .await?;
                Ok(ResultRecord {
                    unit: unit.clone(),
                    judge_model,
                    score: Some(rating.get()),
                    faithful: None,
                    claim_verdicts: None,
                })
            }
            Strategy::ClaimLevel(policy) => {
                let pipeline = ClaimPipeline::new(self.client.clone(), policy);
                let report = pipeline.evaluate(&unit.table, &unit.answer).await?;
                Ok(ResultRecord {
                    unit: unit.clone(),
                    judge_model,
                    score: None,
                    faithful: Some(report.faithful),
                    claim_verdicts: Some(report.verdicts),
                })
            }
        }
    }

    /// Evaluate every unit. A permanent failure on one unit never aborts
    /// the run.
    pub async fn run(&self, units: Vec<EvaluationUnit>) -> BatchReport {
        let total = units.len();
        let tasks = units.into_iter().enumerate().map(|(idx, unit)| {
            let runner = self.clone();
            async move {
                let outcome = runner.evaluate_unit(&unit).await;
                (idx, unit, outcome)
            }
        });

        let mut outcomes = stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (idx, unit, outcome) in outcomes {
            match outcome {
                Ok(record) => {
                    info!(
                        example_id = %unit.example_id,
                        model = %unit.model,
                        unit = idx + 1,
                        total,
                        "Evaluated unit"
                    );
                    records.push(record);
                }
                Err(e) => {
                    warn!(
                        example_id = %unit.example_id,
                        model = %unit.model,
                        error = %e,
                        "Unit evaluation failed, excluding from results"
                    );
                    failures.push(FailedUnit {
                        example_id: unit.example_id,
                        model: unit.model,
                        error: e.to_string(),
                    });
                }
            }
        }
        BatchReport { records, failures }
    }
}

/// Persist evaluated records as pretty-printed JSON, one object per unit
/// with the original fields plus the computed judgment.
pub fn save_results(path: &Path, records: &[ResultRecord]) -> crate::error::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}
