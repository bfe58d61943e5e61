//! Multi-language static code analysis engine.
//!
//! Files go through classification, comment/string aware normalisation, metric extraction and a
//! registry of independent detectors. Cross-file stages then find duplicated blocks, build the
//! import graph and merge advisory records before everything is aggregated into a
//! [`ReportModel`].
//!
//! ```no_run
//! use sniff_core::{Config, Engine, FileInput};
//!
//! let engine = Engine::new(Config::default())?;
//! let report = engine.run(&[FileInput::new("src/app.py", "import os\n")])?;
//! println!("{} findings", report.summary.findings_total);
//! # Ok::<(), sniff_core::EngineError>(())
//! ```

pub mod advisory;
pub mod aggregate;
pub mod config;
pub mod detectors;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod graph;
pub mod imports;
pub mod language;
pub mod metrics;
pub mod normalize;
pub mod report;

pub use advisory::{AdvisoryFeed, DeclaredDependency, Ecosystem, Vulnerability};
pub use config::{Config, ExitPolicy, PatternRuleConfig, SeverityScale, Thresholds};
pub use detectors::{Detector, FileContext, Registry};
pub use duplicates::{DuplicateGroup, DuplicateMember};
pub use engine::{CancellationToken, Engine, FileInput};
pub use error::{ConfigError, DetectorError, EngineError};
pub use graph::{DependencyEdge, DependencyGraph, ModuleNode};
pub use language::{classify, BlockStyle, Language};
pub use metrics::{FileMetrics, FunctionUnit, LoopRegion};
pub use normalize::{normalize, Line, NormalizedStream};
pub use report::{
    Category, Degradation, FileEntry, Finding, Health, HealthRating, LineRange, Recommendation,
    RecommendationTopic, ReportModel, RunWarning, Severity, SkipReason, SkippedFile, SourceFile,
    Summary,
};
