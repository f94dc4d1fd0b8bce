//! Region annotation
//!
//! Joins cleaned fixations with a question's code-region table (line →
//! category) and accumulates fixation duration per category.
//!
//! Two independent passes feed `category_durations`:
//! 1. An exact line join, summed per region category
//! 2. A bounds scan adding every fixation outside `[snippet_min, snippet_max]`
//!    to the reserved out-of-snippet bucket
//!
//! The passes are not a partition. A fixation inside the span whose line has no
//! region row contributes to neither. Because the span is derived from the same
//! table, a joined fixation can never also be out of bounds.

use crate::error::GazeError;
use crate::types::{CategoryDurations, CodeRegion, FixationEvent, JoinedFixation, RegionAnalysis};
use std::collections::BTreeMap;
use std::path::Path;

/// A question's region table keyed by line
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTable {
    regions: BTreeMap<i64, String>,
}

impl RegionTable {
    /// Build a table from rows; the first row for a line wins
    pub fn from_rows(rows: impl IntoIterator<Item = CodeRegion>) -> Result<Self, GazeError> {
        let mut regions = BTreeMap::new();
        for row in rows {
            if let Some(existing) = regions.get(&row.line) {
                log::warn!(
                    "duplicate region row for line {} ('{}' kept, '{}' ignored)",
                    row.line,
                    existing,
                    row.category
                );
                continue;
            }
            regions.insert(row.line, row.category);
        }

        if regions.is_empty() {
            return Err(GazeError::ParseError("region table has no rows".to_string()));
        }

        Ok(Self { regions })
    }

    /// Load a CSV region table with `line`/`category` (or `Linha`/`Descricao`) columns
    pub fn load(path: &Path) -> Result<Self, GazeError> {
        if !path.is_file() {
            return Err(GazeError::RegionTableMissing(path.display().to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut rows = Vec::new();
        for (idx, record) in reader.deserialize::<CodeRegion>().enumerate() {
            let row = record.map_err(|e| {
                GazeError::ParseError(format!("{} row {}: {}", path.display(), idx + 1, e))
            })?;
            rows.push(row);
        }

        Self::from_rows(rows)
    }

    pub fn category(&self, line: i64) -> Option<&str> {
        self.regions.get(&line).map(String::as_str)
    }

    /// Inclusive `(min, max)` line span of the snippet
    pub fn snippet_span(&self) -> (i64, i64) {
        let min = self.regions.keys().next().copied().unwrap_or_default();
        let max = self.regions.keys().next_back().copied().unwrap_or_default();
        (min, max)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Annotator classifying fixation duration by code category
pub struct RegionAnnotator;

impl RegionAnnotator {
    /// Join fixations with the region table and sum durations per category
    pub fn annotate(
        events: &[FixationEvent],
        table: &RegionTable,
        out_category: &str,
    ) -> RegionAnalysis {
        let (snippet_min, snippet_max) = table.snippet_span();

        let joined = join(events, table);
        let mut category_durations = join_durations(&joined);

        let out = out_of_snippet_duration(events, snippet_min, snippet_max);
        *category_durations
            .entry(out_category.to_string())
            .or_insert(0.0) += out;

        RegionAnalysis {
            snippet_min,
            snippet_max,
            category_durations,
            joined,
        }
    }
}

/// Exact line join, preserving gaze order
pub fn join(events: &[FixationEvent], table: &RegionTable) -> Vec<JoinedFixation> {
    events
        .iter()
        .filter_map(|event| {
            table.category(event.line).map(|category| JoinedFixation {
                order_number: event.order_number,
                line: event.line,
                column: event.column,
                duration: event.duration,
                category: category.to_string(),
            })
        })
        .collect()
}

fn join_durations(joined: &[JoinedFixation]) -> CategoryDurations {
    let mut durations = CategoryDurations::new();
    for fixation in joined {
        *durations.entry(fixation.category.clone()).or_insert(0.0) += fixation.duration;
    }
    durations
}

/// Summed duration of all fixations strictly outside the snippet span
pub fn out_of_snippet_duration(
    events: &[FixationEvent],
    snippet_min: i64,
    snippet_max: i64,
) -> f64 {
    events
        .iter()
        .filter(|e| e.line > snippet_max || e.line < snippet_min)
        .map(|e| e.duration)
        .sum()
}
