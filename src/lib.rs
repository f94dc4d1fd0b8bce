//! Code Gaze - Cleaning and derived metrics for code-reading eye-tracking sessions
//!
//! Gaze turns raw per-session fixation stores into normalized, region-annotated
//! records through a deterministic pipeline: store reading → whitespace
//! normalization → session metrics → region annotation → reread detection →
//! cross-session aggregation.
//!
//! ## Modules
//!
//! - **Session pipeline**: `store`, `normalizer`, `metrics`, `regions`, `reread`, `session`
//! - **Batch analysis**: `aggregator`, `outcomes`, `report`

pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod normalizer;
pub mod outcomes;
pub mod regions;
pub mod report;
pub mod reread;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use aggregator::{ExperimentSet, SkippedSession};
pub use config::AnalysisConfig;
pub use error::{GazeError, IssueKind, SessionIssue};
pub use normalizer::WhitespaceNormalizer;
pub use outcomes::{OutcomeTable, SmellCatalog};
pub use regions::{RegionAnnotator, RegionTable};
pub use report::{ReportContext, ReportEncoder};
pub use reread::RereadDetector;
pub use session::{DerivedSession, Session};
pub use store::{RawStoreReader, SqliteStore};

/// Gaze version embedded in all reports
pub const GAZE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "code-gaze";
