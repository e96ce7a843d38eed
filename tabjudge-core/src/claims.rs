//! Claim-level verification strategy.
//!
//! An insight is decomposed into atomic claims, each claim is checked
//! against the table independently, and the per-claim verdicts are combined
//! under an explicit aggregation policy.

use crate::dataset::Table;
use crate::error::{ConfigError, EvalError};
use crate::inference::StructuredClient;
use crate::prompts;
use crate::schemas::{
    ClaimDecompositionResult, ClaimVerificationResult, decompose_claims_function,
    verify_claim_function,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A per-claim faithfulness verdict, bound to exactly one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerdict {
    pub claim: String,
    pub faithful: bool,
}

/// How per-claim verdicts combine into one verdict for the insight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Faithful only if every claim is faithful.
    All,
    /// Faithful if strictly more than half the claims are faithful.
    Majority,
    /// Faithful if the fraction of faithful claims is at least the threshold.
    Threshold(f64),
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy::All
    }
}

impl AggregationPolicy {
    /// Combine verdicts under this policy. The verdict sequence is never
    /// empty: decomposition guarantees at least one claim.
    pub fn aggregate(&self, verdicts: &[ClaimVerdict]) -> bool {
        let faithful = verdicts.iter().filter(|v| v.faithful).count();
        let total = verdicts.len();
        match self {
            AggregationPolicy::All => faithful == total,
            AggregationPolicy::Majority => faithful * 2 > total,
            AggregationPolicy::Threshold(t) => {
                total > 0 && faithful as f64 / total as f64 >= *t
            }
        }
    }
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationPolicy::All => write!(f, "all"),
            AggregationPolicy::Majority => write!(f, "majority"),
            AggregationPolicy::Threshold(t) => write!(f, "threshold:{t}"),
        }
    }
}

impl std::str::FromStr for AggregationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AggregationPolicy::All),
            "majority" => Ok(AggregationPolicy::Majority),
            other => {
                if let Some(raw) = other.strip_prefix("threshold:")
                    && let Ok(t) = raw.parse::<f64>()
                    && (0.0..=1.0).contains(&t)
                {
                    return Ok(AggregationPolicy::Threshold(t));
                }
                Err(ConfigError::Invalid {
                    message: format!("unknown aggregation policy '{other}'"),
                })
            }
        }
    }
}

/// The aggregate result for one insight under the claim-level strategy.
/// Carries the policy that produced it so runs are comparable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaithfulnessReport {
    pub verdicts: Vec<ClaimVerdict>,
    pub policy: AggregationPolicy,
    pub faithful: bool,
}

/// Decomposes an insight into atomic, independently verifiable claims.
#[derive(Clone)]
pub struct ClaimDecomposer {
    client: StructuredClient,
}

impl ClaimDecomposer {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    /// Decompose an insight against a table schema. Claims come back
    /// verbatim in the order the model produced them. An empty sequence is
    /// a decomposition failure, not a vacuously faithful insight.
    pub async fn decompose(
        &self,
        table_schema: &str,
        insight: &str,
    ) -> Result<Vec<String>, EvalError> {
        let prompt = prompts::claim_decomposition_prompt(table_schema, insight);
        let result: ClaimDecompositionResult = self
            .client
            .call(prompts::DECOMPOSE_SYSTEM, &prompt, &decompose_claims_function())
            .await?;
        if result.claims.is_empty() {
            return Err(EvalError::EmptyDecomposition);
        }
        debug!(claims = result.claims.len(), "Decomposed insight");
        Ok(result.claims)
    }
}

/// Verifies single claims against a serialized table.
#[derive(Clone)]
pub struct ClaimVerifier {
    client: StructuredClient,
}

impl ClaimVerifier {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    /// Verify one claim against the table.
    pub async fn verify(&self, table: &str, claim: &str) -> Result<bool, EvalError> {
        let prompt = prompts::claim_verification_prompt(table, claim);
        let result: ClaimVerificationResult = self
            .client
            .call(prompts::VERIFY_SYSTEM, &prompt, &verify_claim_function())
            .await?;
        Ok(result.is_faithful())
    }

    /// Verify every claim independently, preserving order. One claim's
    /// retry exhaustion fails the whole call; there is no partial-result
    /// mode.
    pub async fn verify_all(
        &self,
        table: &str,
        claims: &[String],
    ) -> Result<Vec<ClaimVerdict>, EvalError> {
        let mut verdicts = Vec::with_capacity(claims.len());
        for claim in claims {
            let faithful = self.verify(table, claim).await?;
            verdicts.push(ClaimVerdict {
                claim: claim.clone(),
                faithful,
            });
        }
        Ok(verdicts)
    }
}

/// End-to-end claim-level pipeline: decompose, verify, aggregate.
#[derive(Clone)]
pub struct ClaimPipeline {
    decomposer: ClaimDecomposer,
    verifier: ClaimVerifier,
    policy: AggregationPolicy,
}

impl ClaimPipeline {
    pub fn new(client: StructuredClient, policy: AggregationPolicy) -> Self {
        Self {
            decomposer: ClaimDecomposer::new(client.clone()),
            verifier: ClaimVerifier::new(client),
            policy,
        }
    }

    /// Judge one insight against its table.
    pub async fn evaluate(
        &self,
        table: &Table,
        insight: &str,
    ) -> Result<FaithfulnessReport, EvalError> {
        let claims = self.decomposer.decompose(&table.schema(), insight).await?;
        let serialized = table.to_string();
        let verdicts = self.verifier.verify_all(&serialized, &claims).await?;
        let faithful = self.policy.aggregate(&verdicts);
        Ok(FaithfulnessReport {
            verdicts,
            policy: self.policy,
            faithful,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::LlmError;
    use crate::inference::MockLlmProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn client(provider: Arc<MockLlmProvider>) -> StructuredClient {
        let retry = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        StructuredClient::new(provider, retry)
    }

    fn verdicts(flags: &[bool]) -> Vec<ClaimVerdict> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &faithful)| ClaimVerdict {
                claim: format!("claim {i}"),
                faithful,
            })
            .collect()
    }

    #[test]
    fn test_aggregation_all() {
        let policy = AggregationPolicy::All;
        assert!(policy.aggregate(&verdicts(&[true, true, true])));
        assert!(!policy.aggregate(&verdicts(&[true, false, true])));
    }

    #[test]
    fn test_aggregation_majority() {
        let policy = AggregationPolicy::Majority;
        assert!(policy.aggregate(&verdicts(&[true, true, false])));
        assert!(!policy.aggregate(&verdicts(&[true, false])));
    }

    #[test]
    fn test_aggregation_threshold() {
        let policy = AggregationPolicy::Threshold(0.5);
        assert!(policy.aggregate(&verdicts(&[true, false])));
        assert!(!policy.aggregate(&verdicts(&[true, false, false])));
    }

    #[test]
    fn test_aggregation_policy_parse() {
        assert_eq!("all".parse::<AggregationPolicy>().unwrap(), AggregationPolicy::All);
        assert_eq!(
            "majority".parse::<AggregationPolicy>().unwrap(),
            AggregationPolicy::Majority
        );
        assert_eq!(
            "threshold:0.75".parse::<AggregationPolicy>().unwrap(),
            AggregationPolicy::Threshold(0.75)
        );
        assert!("threshold:1.5".parse::<AggregationPolicy>().is_err());
        assert!("most".parse::<AggregationPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_decompose_returns_claims_verbatim() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::function_call_response(
            "decompose_claims",
            json!({"claims": ["Alice is 30 years old", "Alice lives in Paris"]}),
        ));
        let decomposer = ClaimDecomposer::new(client(provider));

        let claims = decomposer
            .decompose("People: Name | Age", "Alice is 30 years old and lives in Paris")
            .await
            .unwrap();
        assert_eq!(
            claims,
            vec!["Alice is 30 years old", "Alice lives in Paris"]
        );
    }

    #[tokio::test]
    async fn test_decompose_empty_is_an_error() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::function_call_response(
            "decompose_claims",
            json!({"claims": []}),
        ));
        let decomposer = ClaimDecomposer::new(client(provider));

        let result = decomposer.decompose("schema", "insight").await;
        assert!(matches!(result, Err(EvalError::EmptyDecomposition)));
    }

    #[tokio::test]
    async fn test_verify_all_preserves_length_and_order() {
        let provider = Arc::new(MockLlmProvider::new());
        for flag in [1, 0, 1] {
            provider.queue_response(MockLlmProvider::function_call_response(
                "verify_claim",
                json!({"faithfulness": flag}),
            ));
        }
        let verifier = ClaimVerifier::new(client(provider));

        let claims = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let verdicts = verifier.verify_all("table", &claims).await.unwrap();
        assert_eq!(verdicts.len(), 3);
        assert_eq!(
            verdicts.iter().map(|v| v.claim.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            verdicts.iter().map(|v| v.faithful).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_all_fails_whole_call_on_one_exhaustion() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::function_call_response(
            "verify_claim",
            json!({"faithfulness": 1}),
        ));
        // second claim never succeeds
        for _ in 0..5 {
            provider.queue_error(LlmError::Connection {
                message: "refused".into(),
            });
        }
        let verifier = ClaimVerifier::new(client(provider));

        let claims = vec!["a".to_string(), "b".to_string()];
        let result = verifier.verify_all("table", &claims).await;
        assert!(matches!(result, Err(EvalError::RetryExhausted { .. })));
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end_unfaithful_claim() {
        let table = Table {
            title: "People".to_string(),
            header: vec!["Name".to_string(), "Age".to_string()],
            rows: vec![vec!["Alice".to_string(), "30".to_string()]],
        };
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::function_call_response(
            "decompose_claims",
            json!({"claims": ["Alice is 30 years old", "Alice lives in Paris"]}),
        ));
        provider.queue_response(MockLlmProvider::function_call_response(
            "verify_claim",
            json!({"faithfulness": 1}),
        ));
        provider.queue_response(MockLlmProvider::function_call_response(
            "verify_claim",
            json!({"faithfulness": 0}),
        ));
        let pipeline = ClaimPipeline::new(client(provider), AggregationPolicy::All);

        let report = pipeline
            .evaluate(&table, "Alice is 30 years old and lives in Paris")
            .await
            .unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert!(report.verdicts[0].faithful);
        assert!(!report.verdicts[1].faithful);
        assert!(!report.faithful);
        assert_eq!(report.policy, AggregationPolicy::All);
    }
}
