//! Session aggregation across an experiment tree
//!
//! Expected layout:
//!
//! ```text
//! root/
//!   Experimento 05/          experiment id = last word of the name ("05")
//!     Sem Dejavu/            mode directory, must equal the configured filter
//!       02/                  question id
//!         db02.db3           one store per question directory
//! ```
//!
//! Loading never aborts on a bad session: store failures and degenerate
//! sessions are logged, recorded as skipped, and the walk continues. Only an
//! unreadable root is fatal.

use crate::config::AnalysisConfig;
use crate::error::{GazeError, SessionIssue};
use crate::outcomes::{normalize_id, OutcomeTable, SmellCatalog};
use crate::reread::RereadDetector;
use crate::session::Session;
use crate::store::SqliteStore;
use crate::types::{CategoryDurations, RereadCounts, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Smell group for questions absent from the smell catalog
pub const NO_SMELL: &str = "none";

/// A session that was left out of the analysis, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSession {
    pub experiment_id: String,
    pub question_id: Option<String>,
    pub path: PathBuf,
    pub issue: SessionIssue,
}

/// Whitespace incidence of one question in one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitespaceIncidence {
    pub question_id: String,
    pub whitespace_count: usize,
    pub total_size: usize,
}

/// Aggregates of one outcome group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub sessions: usize,
    pub mean_completion_seconds: Option<f64>,
    pub mean_position_variance: Option<f64>,
    pub mean_rereads: Option<f64>,
}

/// Correct versus incorrect sessions, side by side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub correct: GroupSummary,
    pub incorrect: GroupSummary,
    /// Derived sessions without a label
    pub unlabeled: usize,
}

/// Sessions grouped by experiment id
#[derive(Debug, Clone, Default)]
pub struct ExperimentSet {
    experiments: BTreeMap<String, Vec<Session>>,
    skipped: Vec<SkippedSession>,
    config: AnalysisConfig,
}

impl ExperimentSet {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            experiments: BTreeMap::new(),
            skipped: Vec::new(),
            config,
        }
    }

    /// Walk `root` and load one session per store under the configured mode directory
    pub fn load(root: &Path, config: AnalysisConfig) -> Result<Self, GazeError> {
        let experiment_dirs = sorted_entries(root)
            .map_err(|e| GazeError::RootUnreadable(format!("{}: {}", root.display(), e)))?;

        let mut set = ExperimentSet::new(config);
        let mut claimed: BTreeMap<String, PathBuf> = BTreeMap::new();

        for experiment_dir in experiment_dirs.into_iter().filter(|p| p.is_dir()) {
            let experiment_id = experiment_id_from_dir(&experiment_dir);
            // Experiment ids are unique across directories; the first claim wins
            if let Some(first) = claimed.get(&experiment_id) {
                let error = GazeError::DuplicateExperiment(format!(
                    "'{}' already used by {}",
                    experiment_id,
                    first.display()
                ));
                set.skip(&experiment_id, None, &experiment_dir, error);
                continue;
            }
            claimed.insert(experiment_id.clone(), experiment_dir.clone());

            set.experiments.entry(experiment_id.clone()).or_default();
            set.load_experiment(&experiment_id, &experiment_dir);
        }

        log::info!(
            "loaded {} sessions from {} experiments under {} ({} skipped)",
            set.session_count(),
            set.experiments.len(),
            root.display(),
            set.skipped.len()
        );
        Ok(set)
    }

    fn load_experiment(&mut self, experiment_id: &str, experiment_dir: &Path) {
        let mode_dirs = match sorted_entries(experiment_dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.skip(experiment_id, None, experiment_dir, GazeError::Io(e));
                return;
            }
        };

        for mode_dir in mode_dirs.into_iter().filter(|p| p.is_dir()) {
            if file_name(&mode_dir) != self.config.mode_filter {
                continue;
            }

            let question_dirs = match sorted_entries(&mode_dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.skip(experiment_id, None, &mode_dir, GazeError::Io(e));
                    continue;
                }
            };

            for question_dir in question_dirs.into_iter().filter(|p| p.is_dir()) {
                self.load_question(experiment_id, &question_dir);
            }
        }
    }

    fn load_question(&mut self, experiment_id: &str, question_dir: &Path) {
        let question_id = file_name(question_dir);

        let stores: Vec<PathBuf> = match sorted_entries(question_dir) {
            Ok(entries) => entries
                .into_iter()
                .filter(|p| self.config.is_store_file(p))
                .collect(),
            Err(e) => {
                self.skip(experiment_id, Some(&question_id), question_dir, GazeError::Io(e));
                return;
            }
        };

        let Some(store_path) = stores.first() else {
            log::debug!("{}: no store file", question_dir.display());
            return;
        };
        if stores.len() > 1 {
            log::warn!(
                "{}: {} store files, using {}",
                question_dir.display(),
                stores.len(),
                store_path.display()
            );
        }

        let id = SessionId::new(experiment_id, question_id.clone());
        let store = SqliteStore::new(store_path);
        let region_path = self.config.region_path(&question_id);

        match Session::load(id, &store, region_path.as_deref()) {
            Ok(session) => {
                log::debug!("discovered {}", store_path.display());
                self.insert(session.with_store_path(store_path));
            }
            Err(e) => self.skip(experiment_id, Some(&question_id), store_path, e),
        }
    }

    fn skip(
        &mut self,
        experiment_id: &str,
        question_id: Option<&str>,
        path: &Path,
        error: GazeError,
    ) {
        log::warn!("skipping {}: {}", path.display(), error);
        self.skipped.push(SkippedSession {
            experiment_id: experiment_id.to_string(),
            question_id: question_id.map(str::to_string),
            path: path.to_path_buf(),
            issue: SessionIssue::from(error),
        });
    }

    /// Add a session, keeping each experiment sorted by question id
    pub fn insert(&mut self, session: Session) {
        let sessions = self
            .experiments
            .entry(session.experiment_id().to_string())
            .or_default();
        sessions.push(session);
        sessions.sort_by(|a, b| a.question_id().cmp(b.question_id()));
    }

    /// Derive every session; sessions that cannot be derived move to the skipped list
    pub fn derive_all(&mut self) -> usize {
        let config = self.config.clone();
        let mut newly_skipped = Vec::new();

        for sessions in self.experiments.values_mut() {
            sessions.retain_mut(|session| match session.derive(&config) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("skipping {}: {}", session.id(), e);
                    newly_skipped.push(SkippedSession {
                        experiment_id: session.experiment_id().to_string(),
                        question_id: Some(session.question_id().to_string()),
                        path: session.store_path().map(Path::to_path_buf).unwrap_or_default(),
                        issue: SessionIssue::from(e),
                    });
                    false
                }
            });
        }

        self.skipped.extend(newly_skipped);
        self.derived_sessions().count()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn experiment_ids(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    pub fn sessions(&self, experiment_id: &str) -> &[Session] {
        self.experiments
            .get(experiment_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter_sessions(&self) -> impl Iterator<Item = &Session> {
        self.experiments.values().flatten()
    }

    fn derived_sessions(&self) -> impl Iterator<Item = &Session> {
        self.iter_sessions().filter(|s| s.is_derived())
    }

    pub fn session_count(&self) -> usize {
        self.experiments.values().map(Vec::len).sum()
    }

    pub fn skipped(&self) -> &[SkippedSession] {
        &self.skipped
    }

    /// Category durations summed over all sessions
    pub fn total_category_durations(&self) -> CategoryDurations {
        let mut totals = CategoryDurations::new();
        for durations in self.iter_sessions().filter_map(Session::category_durations) {
            for (category, duration) in durations {
                *totals.entry(category.clone()).or_insert(0.0) += duration;
            }
        }
        totals
    }

    /// Reread counts summed over all sessions
    pub fn total_reread_counts(&self) -> RereadCounts {
        let mut totals = RereadCounts::new();
        for counts in self.iter_sessions().filter_map(Session::reread_counts) {
            for (category, count) in counts {
                *totals.entry(category.clone()).or_insert(0) += count;
            }
        }
        totals
    }

    /// `(experiment_id, completion_seconds)` for one question, in experiment order
    pub fn completion_times_by(&self, question_id: &str) -> Vec<(String, i64)> {
        let wanted = normalize_id(question_id);
        self.iter_sessions()
            .filter(|s| normalize_id(s.question_id()) == wanted)
            .filter_map(|s| {
                s.completion_seconds()
                    .map(|seconds| (s.experiment_id().to_string(), seconds))
            })
            .collect()
    }

    /// `(question_id, completion_seconds)` for every question of one experiment
    pub fn completion_times_for_experiment(&self, experiment_id: &str) -> Vec<(String, i64)> {
        self.sessions(experiment_id)
            .iter()
            .filter_map(|s| {
                s.completion_seconds()
                    .map(|seconds| (s.question_id().to_string(), seconds))
            })
            .collect()
    }

    /// Whitespace counts and cleaned sizes per question of one experiment
    pub fn whitespace_incidence(&self, experiment_id: &str) -> Vec<WhitespaceIncidence> {
        self.sessions(experiment_id)
            .iter()
            .filter_map(|s| {
                s.metrics().map(|m| WhitespaceIncidence {
                    question_id: s.question_id().to_string(),
                    whitespace_count: m.whitespace_count,
                    total_size: m.total_size,
                })
            })
            .collect()
    }

    /// Pair each derived session with its correctness label; unlabeled sessions are dropped
    pub fn join_with_outcomes<'a>(&'a self, outcomes: &OutcomeTable) -> Vec<(&'a Session, bool)> {
        self.derived_sessions()
            .filter_map(|session| match outcomes.lookup(session.id()) {
                Ok(correct) => Some((session, correct)),
                Err(e) => {
                    log::debug!("excluded from outcome reports: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Compare correct and incorrect sessions
    pub fn outcome_summary(&self, outcomes: &OutcomeTable) -> OutcomeSummary {
        let joined = self.join_with_outcomes(outcomes);
        let (correct, incorrect): (Vec<_>, Vec<_>) =
            joined.iter().partition(|(_, correct)| *correct);

        OutcomeSummary {
            correct: summarize(correct.iter().map(|(s, _)| *s)),
            incorrect: summarize(incorrect.iter().map(|(s, _)| *s)),
            unlabeled: self.derived_sessions().count() - joined.len(),
        }
    }

    /// Category durations grouped by the smell kind of each session's question
    pub fn category_durations_by_smell(
        &self,
        catalog: &SmellCatalog,
    ) -> BTreeMap<String, CategoryDurations> {
        let mut by_smell: BTreeMap<String, CategoryDurations> = BTreeMap::new();
        for session in self.iter_sessions() {
            let Some(durations) = session.category_durations() else {
                continue;
            };
            let smell = catalog
                .get(session.question_id())
                .map(|info| info.smell_kind.clone())
                .unwrap_or_else(|| NO_SMELL.to_string());

            let totals = by_smell.entry(smell).or_default();
            for (category, duration) in durations {
                *totals.entry(category.clone()).or_insert(0.0) += duration;
            }
        }
        by_smell
    }

    /// Write a screen-space TSV next to every loaded store
    pub fn export_tsv(&self) -> (Vec<PathBuf>, Vec<SkippedSession>) {
        let mut written = Vec::new();
        let mut failed = Vec::new();

        for session in self.iter_sessions() {
            let Some(store_path) = session.store_path() else {
                continue;
            };
            match SqliteStore::new(store_path).export_tsv(session.question_id()) {
                Ok(path) => written.push(path),
                Err(e) => {
                    log::warn!("tsv export failed for {}: {}", session.id(), e);
                    failed.push(SkippedSession {
                        experiment_id: session.experiment_id().to_string(),
                        question_id: Some(session.question_id().to_string()),
                        path: store_path.to_path_buf(),
                        issue: SessionIssue::from(e),
                    });
                }
            }
        }

        (written, failed)
    }
}

fn summarize<'a>(sessions: impl Iterator<Item = &'a Session>) -> GroupSummary {
    let mut count = 0usize;
    let mut completion = Vec::new();
    let mut variance = Vec::new();
    let mut rereads = Vec::new();

    for session in sessions {
        count += 1;
        if let Some(seconds) = session.completion_seconds() {
            completion.push(seconds as f64);
        }
        if let Some(metrics) = session.metrics() {
            variance.push(metrics.position_variance);
        }
        if let Some(counts) = session.reread_counts() {
            rereads.push(f64::from(RereadDetector::total(counts)));
        }
    }

    GroupSummary {
        sessions: count,
        mean_completion_seconds: mean(&completion),
        mean_position_variance: mean(&variance),
        mean_rereads: mean(&rereads),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Experiment id is the last whitespace-separated word of the directory name
fn experiment_id_from_dir(dir: &Path) -> String {
    let name = file_name(dir);
    name.split_whitespace()
        .last()
        .map(str::to_string)
        .unwrap_or(name)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}
