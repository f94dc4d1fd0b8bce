//! Report encoding
//!
//! This module turns derived sessions and experiment sets into plain JSON
//! documents for plotting and reporting tools. Every report carries producer
//! metadata so outputs from different runs can be told apart.

use crate::aggregator::{ExperimentSet, OutcomeSummary, SkippedSession, WhitespaceIncidence};
use crate::error::{GazeError, SessionIssue};
use crate::metrics::{rank, top_lines, top_tokens};
use crate::outcomes::{OutcomeTable, SmellCatalog};
use crate::reread::RereadDetector;
use crate::session::Session;
use crate::types::{CategoryDurations, RankedDuration, RereadCounts, SessionMetrics, SmellInfo};
use crate::{GAZE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default number of entries in top-N listings
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub run_id: String,
    pub computed_at_utc: String,
}

/// Everything known about one derived session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub experiment_id: String,
    pub question_id: String,
    pub metrics: SessionMetrics,
    pub category_durations: Option<CategoryDurations>,
    pub reread_counts: Option<RereadCounts>,
    pub reread_total: Option<u32>,
    pub top_lines: Vec<RankedDuration>,
    pub top_tokens: Vec<RankedDuration>,
    pub top_categories: Vec<RankedDuration>,
    pub smell: Option<SmellInfo>,
    pub correct: Option<bool>,
    pub issues: Vec<SessionIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReportDocument {
    pub producer: ReportProducer,
    pub session: SessionReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub producer: ReportProducer,
    pub mode_filter: String,
    pub sessions: Vec<SessionReport>,
    pub skipped: Vec<SkippedSession>,
    pub total_category_durations: CategoryDurations,
    pub total_reread_counts: RereadCounts,
    pub whitespace_incidence: BTreeMap<String, Vec<WhitespaceIncidence>>,
    pub outcome_summary: Option<OutcomeSummary>,
    pub category_durations_by_smell: Option<BTreeMap<String, CategoryDurations>>,
}

/// Optional lookup tables that enrich reports
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub outcomes: Option<&'a OutcomeTable>,
    pub smells: Option<&'a SmellCatalog>,
    pub top_n: usize,
}

impl Default for ReportContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ReportContext<'a> {
    pub fn new() -> Self {
        Self {
            outcomes: None,
            smells: None,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_outcomes(mut self, outcomes: &'a OutcomeTable) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    pub fn with_smells(mut self, smells: &'a SmellCatalog) -> Self {
        self.smells = Some(smells);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}

/// Report encoder producing JSON documents
pub struct ReportEncoder {
    run_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create an encoder with a unique run ID
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific run ID
    pub fn with_run_id(run_id: String) -> Self {
        Self { run_id }
    }

    fn producer(&self) -> ReportProducer {
        ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: GAZE_VERSION.to_string(),
            run_id: self.run_id.clone(),
            computed_at_utc: Utc::now().to_rfc3339(),
        }
    }

    /// Summarize one derived session
    pub fn session_report(
        &self,
        session: &Session,
        context: &ReportContext<'_>,
    ) -> Result<SessionReport, GazeError> {
        let derived = session.derived().ok_or_else(|| {
            GazeError::InsufficientData(format!("{} has not been derived", session.id()))
        })?;

        let category_durations = session.category_durations().cloned();
        let top_categories = category_durations
            .as_ref()
            .map(|durations| {
                rank(
                    durations.iter().map(|(k, v)| (k.clone(), *v)),
                    context.top_n,
                )
            })
            .unwrap_or_default();
        let reread_counts = session.reread_counts().cloned();

        Ok(SessionReport {
            experiment_id: session.experiment_id().to_string(),
            question_id: session.question_id().to_string(),
            metrics: derived.metrics.clone(),
            reread_total: reread_counts.as_ref().map(RereadDetector::total),
            category_durations,
            reread_counts,
            top_lines: top_lines(&derived.fixations, context.top_n),
            top_tokens: top_tokens(&derived.fixations, context.top_n),
            top_categories,
            smell: context
                .smells
                .and_then(|catalog| catalog.get(session.question_id()).cloned()),
            correct: context
                .outcomes
                .and_then(|table| table.lookup(session.id()).ok()),
            issues: derived.issues.clone(),
        })
    }

    pub fn encode_session(
        &self,
        session: &Session,
        context: &ReportContext<'_>,
    ) -> Result<SessionReportDocument, GazeError> {
        Ok(SessionReportDocument {
            producer: self.producer(),
            session: self.session_report(session, context)?,
        })
    }

    /// Summarize a derived experiment set
    pub fn encode_experiments(
        &self,
        set: &ExperimentSet,
        context: &ReportContext<'_>,
    ) -> Result<ExperimentReport, GazeError> {
        let sessions = set
            .iter_sessions()
            .filter(|s| s.is_derived())
            .map(|s| self.session_report(s, context))
            .collect::<Result<Vec<_>, _>>()?;

        let whitespace_incidence = set
            .experiment_ids()
            .map(|id| (id.to_string(), set.whitespace_incidence(id)))
            .collect();

        Ok(ExperimentReport {
            producer: self.producer(),
            mode_filter: set.config().mode_filter.clone(),
            sessions,
            skipped: set.skipped().to_vec(),
            total_category_durations: set.total_category_durations(),
            total_reread_counts: set.total_reread_counts(),
            whitespace_incidence,
            outcome_summary: context.outcomes.map(|table| set.outcome_summary(table)),
            category_durations_by_smell: context
                .smells
                .map(|catalog| set.category_durations_by_smell(catalog)),
        })
    }

    pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, GazeError> {
        let json = if pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}
