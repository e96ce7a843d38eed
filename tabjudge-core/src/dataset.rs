//! Dataset loading and preparation.
//!
//! Joins model-output records with human score files, filters out empty
//! generations, and attaches a normalized table serialization. The
//! evaluator consumes the resulting [`EvaluationUnit`]s by value and never
//! mutates them.

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A normalized, read-only table attached to every evaluation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Schema line embedded in decomposition prompts: title plus header.
    pub fn schema(&self) -> String {
        format!("{}: {}", self.title, self.header.join(" | "))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "{}", self.header.join(" | "))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join(" | "))?;
        }
        Ok(())
    }
}

/// Example identifiers appear as integers in some datasets and strings in
/// others; both join against the human score files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExampleId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExampleId::Int(n) => write!(f, "{n}"),
            ExampleId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Supported source datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Fetaqa,
    Qtsumm,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Fetaqa => "fetaqa",
            DatasetKind::Qtsumm => "qtsumm",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetaqa" => Ok(DatasetKind::Fetaqa),
            "qtsumm" => Ok(DatasetKind::Qtsumm),
            other => Err(DataError::UnknownDataset {
                name: other.to_string(),
            }),
        }
    }
}

/// One raw record from the model outputs file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutputRecord {
    pub example_id: ExampleId,
    pub model: String,
    #[serde(default, alias = "query")]
    pub question: String,
    #[serde(default)]
    pub model_output: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One record from a human score file.
#[derive(Debug, Clone, Deserialize)]
pub struct HumanScoreRecord {
    pub example_id: ExampleId,
    pub model: String,
    pub score: f64,
}

/// A single (table, question, generated answer) tuple to be judged.
/// Identity key is `(example_id, model)`; immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationUnit {
    pub example_id: ExampleId,
    pub model: String,
    pub question: String,
    pub answer: String,
    pub table: Table,
    pub human_faithfulness: f64,
    pub human_completeness: f64,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    if !path.exists() {
        return Err(DataError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| DataError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| DataError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load the main model outputs from `model_outputs.json`.
pub fn load_model_outputs(data_dir: &Path) -> Result<Vec<ModelOutputRecord>, DataError> {
    load_json_file(&data_dir.join("model_outputs.json"))
}

/// Load human faithfulness scores for a dataset.
pub fn load_human_faithfulness_scores(
    data_dir: &Path,
    dataset: DatasetKind,
) -> Result<Vec<HumanScoreRecord>, DataError> {
    load_json_file(&data_dir.join(format!("human_faithfulness_scores_{dataset}.json")))
}

/// Load human comprehensiveness scores for a dataset.
pub fn load_human_comprehensiveness_scores(
    data_dir: &Path,
    dataset: DatasetKind,
) -> Result<Vec<HumanScoreRecord>, DataError> {
    load_json_file(&data_dir.join(format!("human_comprehensiveness_scores_{dataset}.json")))
}

/// Remove records with an empty or whitespace-only generated answer.
pub fn filter_empty_outputs(records: Vec<ModelOutputRecord>) -> Vec<ModelOutputRecord> {
    records
        .into_iter()
        .filter(|r| !r.model_output.trim().is_empty())
        .collect()
}

/// Build the normalized table for a record based on the dataset type.
pub fn serialize_table(record: &ModelOutputRecord, dataset: DatasetKind) -> Table {
    let metadata = &record.metadata;
    match dataset {
        DatasetKind::Fetaqa => {
            let page_title = metadata["table_page_title"].as_str().unwrap_or_default();
            let section_title = metadata["table_section_title"].as_str().unwrap_or_default();
            let array = metadata["table_array"].as_array().cloned().unwrap_or_default();
            let mut table_rows = array.iter().map(string_row);
            let header = table_rows.next().unwrap_or_default();
            Table {
                title: format!("{page_title} - {section_title}"),
                header,
                rows: table_rows.collect(),
            }
        }
        DatasetKind::Qtsumm => {
            let table = &metadata["table"];
            Table {
                title: table["title"].as_str().unwrap_or_default().to_string(),
                header: string_row(&table["header"]),
                rows: table["rows"]
                    .as_array()
                    .map(|rows| rows.iter().map(string_row).collect())
                    .unwrap_or_default(),
            }
        }
    }
}

fn string_row(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|cells| {
            cells
                .iter()
                .map(|c| match c {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Inner-join filtered model outputs with the human score files on
/// `(example_id, model)`. Only records with both a faithfulness and a
/// comprehensiveness score survive.
pub fn merge_human_scores(
    outputs: Vec<ModelOutputRecord>,
    faith_scores: &[HumanScoreRecord],
    comp_scores: &[HumanScoreRecord],
    dataset: DatasetKind,
) -> Vec<EvaluationUnit> {
    let faith_map: HashMap<(&ExampleId, &str), f64> = faith_scores
        .iter()
        .map(|r| ((&r.example_id, r.model.as_str()), r.score))
        .collect();
    let comp_map: HashMap<(&ExampleId, &str), f64> = comp_scores
        .iter()
        .map(|r| ((&r.example_id, r.model.as_str()), r.score))
        .collect();

    outputs
        .into_iter()
        .filter_map(|record| {
            let key = (&record.example_id, record.model.as_str());
            let faith = *faith_map.get(&key)?;
            let comp = *comp_map.get(&key)?;
            let table = serialize_table(&record, dataset);
            Some(EvaluationUnit {
                example_id: record.example_id,
                model: record.model,
                question: record.question,
                answer: record.model_output,
                table,
                human_faithfulness: faith,
                human_completeness: comp,
            })
        })
        .collect()
}

/// Run the full preparation pipeline for one dataset: load, filter, merge,
/// serialize tables.
pub fn prepare_units(data_dir: &Path, dataset: DatasetKind) -> Result<Vec<EvaluationUnit>, DataError> {
    let outputs = filter_empty_outputs(load_model_outputs(data_dir)?);
    let faith = load_human_faithfulness_scores(data_dir, dataset)?;
    let comp = load_human_comprehensiveness_scores(data_dir, dataset)?;
    Ok(merge_human_scores(outputs, &faith, &comp, dataset))
}

/// Path of the prepared file for a dataset inside `output_dir`.
pub fn prepared_path(output_dir: &Path, dataset: DatasetKind) -> PathBuf {
    output_dir.join(format!("model_outputs_with_scores_{dataset}.json"))
}

/// Persist prepared units as pretty-printed JSON.
pub fn save_units(path: &Path, units: &[EvaluationUnit]) -> crate::error::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(units)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load previously prepared units.
pub fn load_units(path: &Path) -> Result<Vec<EvaluationUnit>, DataError> {
    load_json_file(path)
}
