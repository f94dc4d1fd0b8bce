//! Analysis configuration
//!
//! Literal names and layout conventions of an experiment tree. Defaults match
//! the layout produced by the recording tool; a JSON file may override them.

use crate::error::GazeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Mode directory included in batch loads
pub const DEFAULT_MODE_FILTER: &str = "Sem Dejavu";

/// File extension of raw session stores
pub const DEFAULT_STORE_EXTENSION: &str = "db3";

/// Token text recorded for fixations that landed on whitespace
pub const WHITESPACE_TOKEN: &str = "WHITESPACE";

/// Reserved category for fixations outside the annotated snippet
pub const OUT_CATEGORY: &str = "out";

/// Suffix appended to a question id to locate its region table
pub const DEFAULT_REGION_FILE_SUFFIX: &str = "_Code_Snippet.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Only mode directories with exactly this name are walked
    pub mode_filter: String,
    /// Store file extension, without the dot
    pub store_extension: String,
    pub whitespace_token: String,
    pub out_category: String,
    /// Directory holding `<question><suffix>` region tables
    pub regions_dir: Option<PathBuf>,
    pub region_file_suffix: String,
    /// IDE timestamp ticks per second (1000 for milliseconds)
    pub ide_ticks_per_second: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode_filter: DEFAULT_MODE_FILTER.to_string(),
            store_extension: DEFAULT_STORE_EXTENSION.to_string(),
            whitespace_token: WHITESPACE_TOKEN.to_string(),
            out_category: OUT_CATEGORY.to_string(),
            regions_dir: None,
            region_file_suffix: DEFAULT_REGION_FILE_SUFFIX.to_string(),
            ide_ticks_per_second: 1000,
        }
    }
}

impl AnalysisConfig {
    pub fn with_mode_filter(mut self, mode_filter: impl Into<String>) -> Self {
        self.mode_filter = mode_filter.into();
        self
    }

    pub fn with_regions_dir(mut self, regions_dir: impl Into<PathBuf>) -> Self {
        self.regions_dir = Some(regions_dir.into());
        self
    }

    /// Load configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, GazeError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, GazeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), GazeError> {
        if self.ide_ticks_per_second <= 0 {
            return Err(GazeError::ParseError(format!(
                "ide_ticks_per_second must be positive, got {}",
                self.ide_ticks_per_second
            )));
        }
        if self.mode_filter.is_empty() {
            return Err(GazeError::ParseError("mode_filter must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path of the region table for a question, if a regions directory is set
    pub fn region_path(&self, question_id: &str) -> Option<PathBuf> {
        self.regions_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", question_id, self.region_file_suffix)))
    }

    /// Whether a path looks like a raw store file
    pub fn is_store_file(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == self.store_extension)
    }
}
