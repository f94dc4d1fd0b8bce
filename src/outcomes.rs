//! External lookup tables
//!
//! - Outcome table: correctness label per `(experiment, question)`, CSV
//! - Smell catalog: smell kind and severity per question, JSON
//!
//! Identifiers are matched after normalization so that `"05"` and `"5"` name
//! the same experiment or question.

use crate::error::GazeError;
use crate::types::{Outcome, SessionId, SmellInfo};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Canonical form of an experiment or question identifier
pub fn normalize_id(id: &str) -> String {
    let trimmed = id.trim();
    match trimmed.parse::<u64>() {
        Ok(number) => number.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Parse a boolean-like correctness flag
pub fn parse_flag(raw: &str) -> Result<bool, GazeError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "sim" | "s" | "correct" | "certo" => Ok(true),
        "false" | "0" | "no" | "n" | "nao" | "não" | "incorrect" | "errado" => Ok(false),
        other => Err(GazeError::ParseError(format!(
            "unrecognized correctness flag '{other}'"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct OutcomeRow {
    #[serde(alias = "question")]
    question_id: String,
    #[serde(alias = "experiment")]
    experiment_id: String,
    #[serde(alias = "success", alias = "is_correct")]
    correct: String,
}

/// Correctness labels keyed by session identity
#[derive(Debug, Clone, Default)]
pub struct OutcomeTable {
    labels: HashMap<(String, String), bool>,
}

impl OutcomeTable {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let labels = outcomes
            .into_iter()
            .map(|o| {
                (
                    (normalize_id(&o.experiment_id), normalize_id(&o.question_id)),
                    o.correct,
                )
            })
            .collect();
        Self { labels }
    }

    /// Load a CSV with `question_id`, `experiment_id` and `correct` columns
    pub fn load(path: &Path) -> Result<Self, GazeError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut outcomes = Vec::new();
        for (idx, record) in reader.deserialize::<OutcomeRow>().enumerate() {
            let row = record.map_err(|e| {
                GazeError::ParseError(format!("{} row {}: {}", path.display(), idx + 1, e))
            })?;
            outcomes.push(Outcome {
                experiment_id: row.experiment_id,
                question_id: row.question_id,
                correct: parse_flag(&row.correct)?,
            });
        }

        log::debug!("loaded {} outcome labels from {}", outcomes.len(), path.display());
        Ok(Self::from_outcomes(outcomes))
    }

    /// Correctness of a session, or `OutcomeNotFound`
    pub fn lookup(&self, id: &SessionId) -> Result<bool, GazeError> {
        let key = (normalize_id(&id.experiment_id), normalize_id(&id.question_id));
        self.labels
            .get(&key)
            .copied()
            .ok_or_else(|| GazeError::OutcomeNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Code smell metadata per question
#[derive(Debug, Clone, Default)]
pub struct SmellCatalog {
    smells: BTreeMap<String, SmellInfo>,
}

impl SmellCatalog {
    /// Parse `{ "<question_id>": { "smell_kind": ..., "severity": ... } }`
    pub fn from_json(json: &str) -> Result<Self, GazeError> {
        let raw: BTreeMap<String, SmellInfo> = serde_json::from_str(json)?;
        let smells = raw
            .into_iter()
            .map(|(question, info)| (normalize_id(&question), info))
            .collect();
        Ok(Self { smells })
    }

    pub fn load(path: &Path) -> Result<Self, GazeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, question_id: &str) -> Option<&SmellInfo> {
        self.smells.get(&normalize_id(question_id))
    }

    pub fn len(&self) -> usize {
        self.smells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smells.is_empty()
    }
}
