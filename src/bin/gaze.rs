//! Gaze CLI - Command-line interface for Code Gaze
//!
//! Commands:
//! - session: Derive one session store and print its report
//! - batch: Load an experiment tree, derive every session, print an experiment report
//! - times: Completion times of one question across experiments
//! - export-tsv: Write screen-space fixation TSV files next to each store

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use code_gaze::report::ReportEncoder;
use code_gaze::types::SessionId;
use code_gaze::{
    AnalysisConfig, ExperimentSet, GazeError, OutcomeTable, ReportContext, Session,
    SmellCatalog, SqliteStore, GAZE_VERSION,
};

/// Gaze - Cleaning and metrics for code-reading eye-tracking sessions
#[derive(Parser)]
#[command(name = "gaze")]
#[command(version = GAZE_VERSION)]
#[command(about = "Derive reading metrics from eye-tracking session stores", long_about = None)]
struct Cli {
    /// Analysis configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive one session store and print its report
    Session {
        /// Session store path
        #[arg(short, long)]
        store: PathBuf,

        /// Region table for the store's question
        #[arg(long)]
        regions: Option<PathBuf>,

        /// Question id (defaults to the store's directory name)
        #[arg(long)]
        question: Option<String>,

        /// Experiment id
        #[arg(long, default_value = "unknown")]
        experiment: String,

        /// Number of entries in top-N listings
        #[arg(long, default_value = "5")]
        top: usize,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,
    },

    /// Derive every session of an experiment tree and print an experiment report
    Batch {
        /// Experiment tree root
        #[arg(short, long)]
        root: PathBuf,

        /// Directory holding region tables
        #[arg(long)]
        regions_dir: Option<PathBuf>,

        /// Mode directory to include
        #[arg(long)]
        mode: Option<String>,

        /// Outcome labels (CSV)
        #[arg(long)]
        outcomes: Option<PathBuf>,

        /// Smell metadata (JSON)
        #[arg(long)]
        smells: Option<PathBuf>,

        /// Number of entries in top-N listings
        #[arg(long, default_value = "5")]
        top: usize,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,
    },

    /// Completion times of one question across experiments
    Times {
        /// Experiment tree root
        #[arg(short, long)]
        root: PathBuf,

        /// Question id
        #[arg(short, long)]
        question: String,

        /// Mode directory to include
        #[arg(long)]
        mode: Option<String>,
    },

    /// Write question_<id>.tsv (start_x, start_y, duration) next to each store
    ExportTsv {
        /// Experiment tree root
        #[arg(short, long)]
        root: PathBuf,

        /// Mode directory to include
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    fn is_pretty(&self) -> bool {
        matches!(self, OutputFormat::JsonPretty)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<(), GazeCliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Session {
            store,
            regions,
            question,
            experiment,
            top,
            output,
            format,
        } => cmd_session(
            &config,
            &store,
            regions.as_deref(),
            question,
            experiment,
            top,
            &output,
            format,
        ),

        Commands::Batch {
            root,
            regions_dir,
            mode,
            outcomes,
            smells,
            top,
            output,
            format,
        } => {
            let mut config = apply_mode(config, mode);
            if let Some(dir) = regions_dir {
                config = config.with_regions_dir(dir);
            }
            cmd_batch(
                config,
                &root,
                outcomes.as_deref(),
                smells.as_deref(),
                top,
                &output,
                format,
            )
        }

        Commands::Times {
            root,
            question,
            mode,
        } => cmd_times(apply_mode(config, mode), &root, &question),

        Commands::ExportTsv { root, mode } => cmd_export_tsv(apply_mode(config, mode), &root),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, GazeCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(AnalysisConfig::from_json(&json)?)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn apply_mode(config: AnalysisConfig, mode: Option<String>) -> AnalysisConfig {
    match mode {
        Some(mode) => config.with_mode_filter(mode),
        None => config,
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_session(
    config: &AnalysisConfig,
    store_path: &Path,
    regions: Option<&Path>,
    question: Option<String>,
    experiment: String,
    top: usize,
    output: &Path,
    format: OutputFormat,
) -> Result<(), GazeCliError> {
    let question = question
        .or_else(|| {
            store_path
                .parent()
                .and_then(|dir| dir.file_name())
                .map(|name| name.to_string_lossy().into_owned())
        })
        .ok_or_else(|| GazeCliError::MissingQuestion(store_path.display().to_string()))?;

    let store = SqliteStore::new(store_path);
    let id = SessionId::new(experiment, question);

    // An explicit region file wins over the configured regions directory
    let region_path = regions
        .map(Path::to_path_buf)
        .or_else(|| config.region_path(&id.question_id));

    let mut session =
        Session::load(id, &store, region_path.as_deref())?.with_store_path(store_path);
    session.derive(config)?;

    let context = ReportContext::new().with_top_n(top);
    let document = ReportEncoder::new().encode_session(&session, &context)?;
    write_output(output, &ReportEncoder::to_json(&document, format.is_pretty())?)
}

fn cmd_batch(
    config: AnalysisConfig,
    root: &Path,
    outcomes: Option<&Path>,
    smells: Option<&Path>,
    top: usize,
    output: &Path,
    format: OutputFormat,
) -> Result<(), GazeCliError> {
    let outcomes = outcomes.map(OutcomeTable::load).transpose()?;
    let smells = smells.map(SmellCatalog::load).transpose()?;

    let mut set = ExperimentSet::load(root, config)?;
    let derived = set.derive_all();
    if derived == 0 {
        return Err(GazeCliError::NoSessions(root.display().to_string()));
    }

    let mut context = ReportContext::new().with_top_n(top);
    if let Some(table) = outcomes.as_ref() {
        context = context.with_outcomes(table);
    }
    if let Some(catalog) = smells.as_ref() {
        context = context.with_smells(catalog);
    }

    let report = ReportEncoder::new().encode_experiments(&set, &context)?;
    write_output(output, &ReportEncoder::to_json(&report, format.is_pretty())?)
}

fn cmd_times(config: AnalysisConfig, root: &Path, question: &str) -> Result<(), GazeCliError> {
    let mut set = ExperimentSet::load(root, config)?;
    set.derive_all();

    let times: Vec<CompletionTime> = set
        .completion_times_by(question)
        .into_iter()
        .map(|(experiment_id, completion_seconds)| CompletionTime {
            experiment_id,
            completion_seconds,
        })
        .collect();

    if times.is_empty() {
        return Err(GazeCliError::NoSessions(format!(
            "{} (question {})",
            root.display(),
            question
        )));
    }

    println!("{}", serde_json::to_string_pretty(&times)?);
    Ok(())
}

fn cmd_export_tsv(config: AnalysisConfig, root: &Path) -> Result<(), GazeCliError> {
    let set = ExperimentSet::load(root, config)?;
    let (written, failed) = set.export_tsv();

    let report = ExportReport {
        written: written.len(),
        failed: failed.len(),
        files: written,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failed.is_empty() {
        Ok(())
    } else {
        Err(GazeCliError::ExportFailed(failed.len()))
    }
}

// Helper functions

fn write_output(output: &Path, data: &str) -> Result<(), GazeCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum GazeCliError {
    Io(std::io::Error),
    Gaze(GazeError),
    Json(serde_json::Error),
    MissingQuestion(String),
    NoSessions(String),
    ExportFailed(usize),
}

impl From<std::io::Error> for GazeCliError {
    fn from(e: std::io::Error) -> Self {
        GazeCliError::Io(e)
    }
}

impl From<GazeError> for GazeCliError {
    fn from(e: GazeError) -> Self {
        GazeCliError::Gaze(e)
    }
}

impl From<serde_json::Error> for GazeCliError {
    fn from(e: serde_json::Error) -> Self {
        GazeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GazeCliError> for CliError {
    fn from(e: GazeCliError) -> Self {
        match e {
            GazeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GazeCliError::Gaze(e) => {
                let hint = match &e {
                    GazeError::StoreUnavailable(_) => "Check that the store is a SQLite file",
                    GazeError::InsufficientData(_) => "The session has no usable fixations",
                    GazeError::RegionTableMissing(_) => "Pass --regions or --regions-dir",
                    GazeError::OutcomeNotFound(_) => "Check the outcome table ids",
                    GazeError::RootUnreadable(_) => "Check the experiment root path",
                    GazeError::DuplicateExperiment(_) => "Give experiment directories distinct ids",
                    _ => "Check input format",
                };
                CliError {
                    code: "GAZE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            GazeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GazeCliError::MissingQuestion(path) => CliError {
                code: "MISSING_QUESTION".to_string(),
                message: format!("Cannot infer a question id for {}", path),
                hint: Some("Pass --question".to_string()),
            },
            GazeCliError::NoSessions(root) => CliError {
                code: "NO_SESSIONS".to_string(),
                message: format!("No derivable sessions found under {}", root),
                hint: Some("Check --mode and the experiment tree layout".to_string()),
            },
            GazeCliError::ExportFailed(count) => CliError {
                code: "EXPORT_FAILED".to_string(),
                message: format!("{} stores could not be exported", count),
                hint: Some("Run with --verbose for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct CompletionTime {
    experiment_id: String,
    completion_seconds: i64,
}

#[derive(serde::Serialize)]
struct ExportReport {
    written: usize,
    failed: usize,
    files: Vec<PathBuf>,
}
