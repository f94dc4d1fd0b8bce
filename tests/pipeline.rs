//! Integration tests for code-gaze
//!
//! Builds an experiment tree on disk and runs load → derive → aggregate → report.

use code_gaze::error::IssueKind;
use code_gaze::report::ReportEncoder;
use code_gaze::{AnalysisConfig, ExperimentSet, OutcomeTable, ReportContext, SmellCatalog};
use pretty_assertions::assert_eq;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// (order, line, column, token, duration)
type Row<'a> = (i64, i64, i64, &'a str, f64);

fn create_store(path: &Path, rows: &[Row<'_>], ide_stamps: &[i64]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE fixation (
            fixation_order_number INTEGER,
            fixation_start_event_time INTEGER,
            duration REAL,
            source_file_line INTEGER,
            source_file_col INTEGER,
            token TEXT,
            syntactic_category TEXT,
            x REAL,
            y REAL
        );
        CREATE TABLE ide_context (time_stamp INTEGER, x REAL, y REAL);",
    )
    .unwrap();

    for (order, line, column, token, duration) in rows {
        conn.execute(
            "INSERT INTO fixation VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'identifier', ?7, ?8)",
            params![
                order,
                order * 100_000,
                duration,
                line,
                column,
                token,
                *column as f64 * 8.0,
                *line as f64 * 16.0
            ],
        )
        .unwrap();
    }

    for stamp in ide_stamps {
        conn.execute(
            "INSERT INTO ide_context VALUES (?1, 0.0, 0.0)",
            params![stamp],
        )
        .unwrap();
    }
}

/// Two experiments answering question 01, plus one unreadable store and one ignored mode
fn create_experiment_tree() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    let regions = dir.path().join("regions");

    create_store(
        &root.join("Experimento 01/Sem Dejavu/01/db01.db3"),
        &[
            (0, 1, 1, "for", 1.0),
            (1, 2, 1, "call", 2.0),
            (2, 1, 5, "i", 0.5),
            (3, 9, 1, "x", 1.5),
            (4, 9, 2, "WHITESPACE", 0.5),
        ],
        &[1_000, 46_000],
    );
    create_store(
        &root.join("Experimento 02/Sem Dejavu/01/db01.db3"),
        &[(0, 1, 1, "for", 2.0), (1, 2, 1, "call", 1.0)],
        &[0, 30_000],
    );
    create_store(
        &root.join("Experimento 02/Com Dejavu/01/db01.db3"),
        &[(0, 1, 1, "for", 99.0)],
        &[0, 1_000],
    );

    let broken = root.join("Experimento 02/Sem Dejavu/02/db02.db3");
    fs::create_dir_all(broken.parent().unwrap()).unwrap();
    fs::write(&broken, b"this is not a sqlite database, just some bytes").unwrap();

    fs::create_dir_all(&regions).unwrap();
    fs::write(
        regions.join("01_Code_Snippet.csv"),
        "line,category\n1,loop\n2,call\n",
    )
    .unwrap();

    (dir, root, regions)
}

fn load_and_derive(root: &Path, regions: &Path) -> ExperimentSet {
    let config = AnalysisConfig::default().with_regions_dir(regions);
    let mut set = ExperimentSet::load(root, config).unwrap();
    assert_eq!(set.derive_all(), 2);
    set
}

#[test]
fn test_load_skips_unreadable_store() {
    let (_dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    assert_eq!(set.experiment_ids().collect::<Vec<_>>(), vec!["01", "02"]);
    assert_eq!(set.session_count(), 2);

    let skipped = set.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].experiment_id, "02");
    assert_eq!(skipped[0].question_id.as_deref(), Some("02"));
    assert_eq!(skipped[0].issue.kind, IssueKind::StoreUnavailable);
}

#[test]
fn test_session_metrics_and_regions() {
    let (_dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    let session = &set.sessions("01")[0];
    let metrics = session.metrics().unwrap();
    assert_eq!(metrics.total_size, 4);
    assert_eq!(metrics.whitespace_count, 1);
    assert!((metrics.whitespace_ratio - 0.2).abs() < 1e-9);
    assert_eq!(metrics.completion_seconds, Some(45));

    let durations = session.category_durations().unwrap();
    assert!((durations["loop"] - 1.5).abs() < 1e-9);
    assert!((durations["call"] - 2.0).abs() < 1e-9);
    // The trailing whitespace folds into the line 9 fixation
    assert!((durations["out"] - 2.0).abs() < 1e-9);

    assert_eq!(session.reread_counts().unwrap().get("loop"), Some(&1));
}

#[test]
fn test_cross_session_aggregates() {
    let (_dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    assert_eq!(
        set.completion_times_by("1"),
        vec![("01".to_string(), 45), ("02".to_string(), 30)]
    );

    let totals = set.total_category_durations();
    assert!((totals["loop"] - 3.5).abs() < 1e-9);
    assert!((totals["call"] - 3.0).abs() < 1e-9);
    assert!((totals["out"] - 2.0).abs() < 1e-9);
    assert_eq!(set.total_reread_counts().get("loop"), Some(&1));

    let incidence = set.whitespace_incidence("02");
    assert_eq!(incidence.len(), 1);
    assert_eq!(incidence[0].whitespace_count, 0);
    assert_eq!(incidence[0].total_size, 2);
}

#[test]
fn test_outcomes_and_smells() {
    let (dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    let outcome_path = dir.path().join("outcomes.csv");
    fs::write(
        &outcome_path,
        "question_id,experiment_id,correct\n01,01,true\n01,02,false\n",
    )
    .unwrap();
    let outcomes = OutcomeTable::load(&outcome_path).unwrap();

    let summary = set.outcome_summary(&outcomes);
    assert_eq!(summary.correct.sessions, 1);
    assert_eq!(summary.correct.mean_completion_seconds, Some(45.0));
    assert_eq!(summary.incorrect.sessions, 1);
    assert_eq!(summary.incorrect.mean_completion_seconds, Some(30.0));
    assert_eq!(summary.unlabeled, 0);

    let smells =
        SmellCatalog::from_json(r#"{ "01": { "smell_kind": "long_method", "severity": "high" } }"#)
            .unwrap();
    let by_smell = set.category_durations_by_smell(&smells);
    assert_eq!(by_smell.len(), 1);
    assert!((by_smell["long_method"]["loop"] - 3.5).abs() < 1e-9);
}

#[test]
fn test_experiment_report_json() {
    let (_dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    let encoder = ReportEncoder::with_run_id("integration".to_string());
    let report = encoder
        .encode_experiments(&set, &ReportContext::new().with_top_n(2))
        .unwrap();
    let json = ReportEncoder::to_json(&report, true).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["producer"]["run_id"], "integration");
    assert_eq!(value["mode_filter"], "Sem Dejavu");
    assert_eq!(value["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(value["skipped"][0]["issue"]["kind"], "store_unavailable");
    assert_eq!(value["sessions"][0]["top_lines"].as_array().unwrap().len(), 2);
    assert!(value["outcome_summary"].is_null());
}

#[test]
fn test_export_tsv_next_to_stores() {
    let (_dir, root, regions) = create_experiment_tree();
    let set = load_and_derive(&root, &regions);

    let (written, failed) = set.export_tsv();

    assert_eq!(written.len(), 2);
    assert!(failed.is_empty());

    let tsv_path = root.join("Experimento 02/Sem Dejavu/01/question_01.tsv");
    let tsv = fs::read_to_string(tsv_path).unwrap();
    let mut lines = tsv.lines();
    assert_eq!(lines.next(), Some("start_x\tstart_y\tduration"));
    assert_eq!(lines.count(), 2);
}

#[test]
fn test_unreadable_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let result = ExperimentSet::load(&dir.path().join("missing"), AnalysisConfig::default());
    assert!(result.is_err());
}
