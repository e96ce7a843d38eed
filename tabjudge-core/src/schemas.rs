//! Declared result shapes for structured calls.
//!
//! Each shape pairs a serde type (the validation side) with a
//! [`FunctionSpec`] constructor (the wire side). Range constraints are part
//! of the shape: a faithfulness flag outside {0, 1} or a score outside
//! [1, 5] fails deserialization and is treated as a schema mismatch.

use crate::types::FunctionSpec;
use serde::{Deserialize, Deserializer};
use serde_json::json;

/// Result shape of a claim decomposition call: `{claims: [string]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimDecompositionResult {
    pub claims: Vec<String>,
}

/// Result shape of a claim verification call: `{faithfulness: 0|1}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimVerificationResult {
    #[serde(deserialize_with = "zero_or_one")]
    pub faithfulness: u8,
}

impl ClaimVerificationResult {
    pub fn is_faithful(&self) -> bool {
        self.faithfulness == 1
    }
}

/// Result shape of a direct-scoring call: `{score: 1..=5}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RubricScoreResult {
    #[serde(deserialize_with = "score_in_range")]
    pub score: u8,
}

fn zero_or_one<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u8::deserialize(deserializer)?;
    if value > 1 {
        return Err(serde::de::Error::custom(format!(
            "faithfulness must be 0 or 1, got {value}"
        )));
    }
    Ok(value)
}

fn score_in_range<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u8::deserialize(deserializer)?;
    if !(1..=5).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "score must be in [1, 5], got {value}"
        )));
    }
    Ok(value)
}

/// Function declaration for claim decomposition.
pub fn decompose_claims_function() -> FunctionSpec {
    FunctionSpec {
        name: "decompose_claims".to_string(),
        description: "Decomposes the given insight into atomic-level claims based on a \
                      provided table schema. Returns a JSON object with a single key \
                      'claims' mapping to a list of strings."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "claims": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["claims"]
        }),
    }
}

/// Function declaration for single-claim verification.
pub fn verify_claim_function() -> FunctionSpec {
    FunctionSpec {
        name: "verify_claim".to_string(),
        description: "Given a table and a claim, returns {\"faithfulness\": 0 or 1} where 1 \
                      means the claim is faithful to the table data, 0 otherwise."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "faithfulness": {
                    "type": "integer",
                    "enum": [0, 1]
                }
            },
            "required": ["faithfulness"]
        }),
    }
}

/// Function declaration for direct rubric scoring.
pub fn rubric_score_function() -> FunctionSpec {
    FunctionSpec {
        name: "rate_answer".to_string(),
        description: "Rates the answer against the evaluation criteria. Returns a JSON \
                      object with a single key 'score' mapping to an integer from 1 to 5."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "score": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 5
                }
            },
            "required": ["score"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decomposition_result_parses() {
        let result: ClaimDecompositionResult =
            serde_json::from_value(json!({"claims": ["Alice is 30", "Alice lives in Paris"]}))
                .unwrap();
        assert_eq!(result.claims.len(), 2);
    }

    #[test]
    fn test_decomposition_rejects_unknown_fields() {
        let result: Result<ClaimDecompositionResult, _> =
            serde_json::from_value(json!({"claims": [], "extra": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_decomposition_rejects_null_entries() {
        let result: Result<ClaimDecompositionResult, _> =
            serde_json::from_value(json!({"claims": ["ok", null]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_verification_accepts_zero_and_one() {
        let yes: ClaimVerificationResult =
            serde_json::from_value(json!({"faithfulness": 1})).unwrap();
        assert!(yes.is_faithful());
        let no: ClaimVerificationResult =
            serde_json::from_value(json!({"faithfulness": 0})).unwrap();
        assert!(!no.is_faithful());
    }

    #[test]
    fn test_verification_rejects_out_of_range() {
        let result: Result<ClaimVerificationResult, _> =
            serde_json::from_value(json!({"faithfulness": 2}));
        assert!(result.is_err());
        let result: Result<ClaimVerificationResult, _> =
            serde_json::from_value(json!({"faithfulness": true}));
        assert!(result.is_err());
    }

    #[test]
    fn test_score_range() {
        for score in 1..=5u8 {
            let result: RubricScoreResult =
                serde_json::from_value(json!({"score": score})).unwrap();
            assert_eq!(result.score, score);
        }
        for score in [0u8, 6, 100] {
            let result: Result<RubricScoreResult, _> =
                serde_json::from_value(json!({"score": score}));
            assert!(result.is_err(), "score {score} should be rejected");
        }
    }

    #[test]
    fn test_score_rejects_non_integer() {
        let result: Result<RubricScoreResult, _> = serde_json::from_value(json!({"score": 3.5}));
        assert!(result.is_err());
    }

    #[test]
    fn test_function_specs_name_their_shapes() {
        assert_eq!(decompose_claims_function().name, "decompose_claims");
        assert_eq!(verify_claim_function().name, "verify_claim");
        assert_eq!(rubric_score_function().name, "rate_answer");
    }
}
