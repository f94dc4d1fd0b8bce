//! Error types for Code Gaze

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or deriving sessions
#[derive(Debug, Error)]
pub enum GazeError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Region table missing: {0}")]
    RegionTableMissing(String),

    #[error("Outcome not found: {0}")]
    OutcomeNotFound(String),

    #[error("Experiment root unreadable: {0}")]
    RootUnreadable(String),

    #[error("Duplicate experiment id: {0}")]
    DuplicateExperiment(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GazeError {
    /// Classify the error for per-session issue reporting
    pub fn kind(&self) -> IssueKind {
        match self {
            GazeError::StoreUnavailable(_) => IssueKind::StoreUnavailable,
            GazeError::InsufficientData(_) => IssueKind::InsufficientData,
            GazeError::RegionTableMissing(_) => IssueKind::RegionTableMissing,
            GazeError::OutcomeNotFound(_) => IssueKind::OutcomeNotFound,
            GazeError::RootUnreadable(_) => IssueKind::RootUnreadable,
            GazeError::DuplicateExperiment(_) => IssueKind::DuplicateExperiment,
            GazeError::ParseError(_) | GazeError::Csv(_) | GazeError::JsonError(_) => {
                IssueKind::ParseError
            }
            GazeError::Io(_) => IssueKind::Io,
        }
    }
}

impl From<rusqlite::Error> for GazeError {
    fn from(e: rusqlite::Error) -> Self {
        GazeError::StoreUnavailable(e.to_string())
    }
}

/// Serializable error category attached to skipped sessions and metric gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    StoreUnavailable,
    InsufficientData,
    RegionTableMissing,
    OutcomeNotFound,
    RootUnreadable,
    DuplicateExperiment,
    ParseError,
    Io,
}

/// A non-fatal problem recorded against a single session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl From<&GazeError> for SessionIssue {
    fn from(e: &GazeError) -> Self {
        SessionIssue {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<GazeError> for SessionIssue {
    fn from(e: GazeError) -> Self {
        SessionIssue::from(&e)
    }
}
