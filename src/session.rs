//! Session value and its one-time derivation
//!
//! A `Session` holds one participant's raw tables for one question plus the
//! question's region table. `derive()` runs the cleaning pipeline once and
//! caches the result; the raw tables are never mutated.
//!
//! Pipeline stages:
//! 1. WhitespaceNormalizer - fold whitespace fixations into neighbours
//! 2. MetricsDeriver - size, whitespace incidence, completion time, variance
//! 3. RegionAnnotator - category durations with the out-of-snippet bucket
//! 4. RereadDetector - backward jumps per category

use crate::config::AnalysisConfig;
use crate::error::{GazeError, SessionIssue};
use crate::metrics::{completion_seconds, MetricsDeriver};
use crate::normalizer::WhitespaceNormalizer;
use crate::regions::{RegionAnnotator, RegionTable};
use crate::reread::RereadDetector;
use crate::store::RawStoreReader;
use crate::types::{
    CategoryDurations, FixationEvent, RawTables, RegionAnalysis, RereadCounts, SessionId,
    SessionMetrics,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything computed from a session's raw tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSession {
    /// Cleaned fixations in gaze order
    pub fixations: Vec<FixationEvent>,
    pub metrics: SessionMetrics,
    /// `None` when the question has no usable region table
    pub regions: Option<RegionAnalysis>,
    pub rereads: Option<RereadCounts>,
    /// Metrics that could not be computed, and why
    pub issues: Vec<SessionIssue>,
}

/// One participant's recorded gaze data for one question
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    store_path: Option<PathBuf>,
    raw: RawTables,
    regions: Result<RegionTable, SessionIssue>,
    derived: Option<DerivedSession>,
}

impl Session {
    /// Create a session from already materialized tables, without regions
    pub fn new(id: SessionId, raw: RawTables) -> Self {
        let missing = GazeError::RegionTableMissing(format!("no region table attached to {id}"));
        Self {
            id,
            store_path: None,
            raw,
            regions: Err(SessionIssue::from(missing)),
            derived: None,
        }
    }

    pub fn with_regions(mut self, table: RegionTable) -> Self {
        self.regions = Ok(table);
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Read a session from a store and attach its region table.
    ///
    /// Store failures are returned. A missing or malformed region table only
    /// disables region-based metrics for this session.
    pub fn load(
        id: SessionId,
        store: &dyn RawStoreReader,
        region_path: Option<&Path>,
    ) -> Result<Self, GazeError> {
        let raw = store.read_tables()?;
        let mut session = Session::new(id, raw);

        session.regions = match region_path {
            Some(path) => RegionTable::load(path).map_err(|e| {
                log::warn!("{}: {}", session.id, e);
                SessionIssue::from(e)
            }),
            None => Err(SessionIssue::from(GazeError::RegionTableMissing(format!(
                "no regions directory configured for question {}",
                session.id.question_id
            )))),
        };

        Ok(session)
    }

    /// Run the cleaning pipeline once; later calls return the cached result.
    ///
    /// Fails with `InsufficientData` when no non-whitespace fixation exists.
    pub fn derive(&mut self, config: &AnalysisConfig) -> Result<&DerivedSession, GazeError> {
        if self.derived.is_none() {
            let derived = self.compute(config)?;
            log::debug!(
                "{}: derived {} fixations, {} issues",
                self.id,
                derived.fixations.len(),
                derived.issues.len()
            );
            self.derived = Some(derived);
        }

        self.derived.as_ref().ok_or_else(|| {
            GazeError::InsufficientData(format!("{}: derivation produced no state", self.id))
        })
    }

    fn compute(&self, config: &AnalysisConfig) -> Result<DerivedSession, GazeError> {
        let mut fixations = self.raw.fixations.clone();
        fixations.sort_by_key(|f| f.order_number);

        let normalized = WhitespaceNormalizer::normalize(fixations, &config.whitespace_token)
            .map_err(|e| match e {
                GazeError::InsufficientData(msg) => {
                    GazeError::InsufficientData(format!("{}: {}", self.id, msg))
                }
                other => other,
            })?;

        let metrics = MetricsDeriver::derive(
            &normalized,
            &self.raw.ide_context,
            config.ide_ticks_per_second,
        )?;

        let mut issues = Vec::new();
        if metrics.completion_seconds.is_none() {
            if let Err(e) = completion_seconds(&self.raw.ide_context, config.ide_ticks_per_second) {
                issues.push(SessionIssue::from(e));
            }
        }

        let (regions, rereads) = match &self.regions {
            Ok(table) => {
                let analysis =
                    RegionAnnotator::annotate(&normalized.events, table, &config.out_category);
                let rereads = RereadDetector::detect(&analysis.joined);
                (Some(analysis), Some(rereads))
            }
            Err(issue) => {
                issues.push(issue.clone());
                (None, None)
            }
        };

        Ok(DerivedSession {
            fixations: normalized.events,
            metrics,
            regions,
            rereads,
            issues,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn experiment_id(&self) -> &str {
        &self.id.experiment_id
    }

    pub fn question_id(&self) -> &str {
        &self.id.question_id
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Raw tables as read from the store
    pub fn raw(&self) -> &RawTables {
        &self.raw
    }

    pub fn has_regions(&self) -> bool {
        self.regions.is_ok()
    }

    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }

    pub fn derived(&self) -> Option<&DerivedSession> {
        self.derived.as_ref()
    }

    pub fn metrics(&self) -> Option<&SessionMetrics> {
        self.derived.as_ref().map(|d| &d.metrics)
    }

    pub fn completion_seconds(&self) -> Option<i64> {
        self.metrics().and_then(|m| m.completion_seconds)
    }

    pub fn category_durations(&self) -> Option<&CategoryDurations> {
        self.derived
            .as_ref()
            .and_then(|d| d.regions.as_ref())
            .map(|r| &r.category_durations)
    }

    pub fn reread_counts(&self) -> Option<&RereadCounts> {
        self.derived.as_ref().and_then(|d| d.rereads.as_ref())
    }
}
