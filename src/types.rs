//! Core types for the Code Gaze pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw store tables, cleaned fixations, region annotations, and the
//! derived per-session values consumed by reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category label to accumulated fixation duration
pub type CategoryDurations = BTreeMap<String, f64>;

/// Category label to number of backward gaze jumps
pub type RereadCounts = BTreeMap<String, u32>;

/// A single recorded fixation on a source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixationEvent {
    /// Sequence index within the session (gaze chronology)
    pub order_number: i64,
    /// Fixation start (microseconds)
    pub start_time: i64,
    /// Dwell time (seconds)
    pub duration: f64,
    /// 1-based source line
    pub line: i64,
    /// 1-based source column
    pub column: i64,
    /// Lexical text under the gaze, or the whitespace sentinel
    pub token: String,
    /// Syntactic tag assigned by the recorder
    pub syntactic_category: String,
}

impl FixationEvent {
    pub fn is_token(&self, sentinel: &str) -> bool {
        self.token == sentinel
    }
}

/// A gaze sample from the IDE context table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdeContextEvent {
    /// Epoch timestamp (milliseconds)
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
}

/// Fully materialized contents of one raw store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTables {
    /// Fixations ordered by `order_number` ascending
    pub fixations: Vec<FixationEvent>,
    /// IDE context samples ordered by timestamp ascending
    pub ide_context: Vec<IdeContextEvent>,
}

/// Screen-space fixation row used for TSV export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenFixation {
    pub start_x: f64,
    pub start_y: f64,
    pub duration: f64,
}

/// One row of a question's code-region annotation table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRegion {
    #[serde(alias = "Linha")]
    pub line: i64,
    #[serde(alias = "Descricao")]
    pub category: String,
}

/// Identity of a session: one participant run of one question
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub experiment_id: String,
    pub question_id: String,
}

impl SessionId {
    pub fn new(experiment_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            question_id: question_id.into(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "experiment {} / question {}", self.experiment_id, self.question_id)
    }
}

/// Output of the whitespace normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFixations {
    /// Surviving fixations, whitespace mass folded in
    pub events: Vec<FixationEvent>,
    /// Number of fixations before normalization
    pub raw_count: usize,
    /// Number of whitespace fixations before normalization
    pub whitespace_count: usize,
}

impl NormalizedFixations {
    /// Fraction of raw fixations that landed on whitespace (0 when empty)
    pub fn whitespace_ratio(&self) -> f64 {
        if self.raw_count == 0 {
            return 0.0;
        }
        self.whitespace_count as f64 / self.raw_count as f64
    }
}

/// Scalar metrics derived for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Number of cleaned fixations
    pub total_size: usize,
    /// Whitespace fixations before normalization
    pub whitespace_count: usize,
    /// Whitespace fixations / raw fixations
    pub whitespace_ratio: f64,
    /// Whole seconds between first and last IDE sample; `None` when the IDE table is empty
    pub completion_seconds: Option<i64>,
    /// Population variance of line plus population variance of column
    pub position_variance: f64,
}

/// A cleaned fixation matched to a region category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedFixation {
    pub order_number: i64,
    pub line: i64,
    pub column: i64,
    pub duration: f64,
    pub category: String,
}

/// Result of joining a session's fixations with its region table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAnalysis {
    /// Smallest annotated line
    pub snippet_min: i64,
    /// Largest annotated line
    pub snippet_max: i64,
    /// Summed duration per category, always containing the out-of-snippet bucket
    pub category_durations: CategoryDurations,
    /// Fixations with an exact region match, in gaze order
    pub joined: Vec<JoinedFixation>,
}

/// One step of the raw IDE gaze path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeStep {
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// One step of the cleaned fixation path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationStep {
    pub order_number: i64,
    pub line: i64,
    pub column: i64,
    pub duration: f64,
    pub delta_line: i64,
    pub delta_column: i64,
    /// Fixation started before the previous one ended
    pub overlaps_previous: bool,
}

/// A key ranked by summed fixation duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDuration {
    pub key: String,
    pub duration: f64,
}

/// Correctness label for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub experiment_id: String,
    pub question_id: String,
    pub correct: bool,
}

/// Code smell metadata attached to a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmellInfo {
    pub smell_kind: String,
    pub severity: String,
}
