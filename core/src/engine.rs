//! Run orchestration.
//!
//! Files are analysed independently on the rayon pool. The duplicate index, graph resolution,
//! advisory lookups and aggregation only start once every file has produced its outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::advisory::{self, AdvisoryFeed, DeclaredDependency};
use crate::aggregate;
use crate::config::{build_ignore_set, Config};
use crate::detectors::{FileContext, Registry};
use crate::duplicates::{self, FileShingles};
use crate::error::{ConfigError, EngineError};
use crate::graph::{self, FileImports};
use crate::imports;
use crate::language::{classify, Language};
use crate::metrics;
use crate::normalize::normalize;
use crate::report::{
    Degradation, FileEntry, Finding, ReportModel, RunWarning, SkipReason, SkippedFile, SourceFile,
};

/// One file handed to the engine. Paths are reported with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub path: String,
    pub bytes: Vec<u8>,
    /// Encoding label supplied by the caller; decoding is always UTF-8 with replacement.
    pub encoding: Option<String>,
}

impl FileInput {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Shared flag that stops a run from scheduling further files.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Engine {
    config: Config,
    registry: Registry,
    ignore: Option<GlobSet>,
    advisories: AdvisoryFeed,
}

/// Everything one worker produces for one file.
struct FileOutcome {
    entry: FileEntry,
    findings: Vec<Finding>,
    warnings: Vec<RunWarning>,
    shingles: FileShingles,
    imports: Option<FileImports>,
    declared: Vec<DeclaredDependency>,
}

fn display_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

fn decode(bytes: &[u8]) -> (String, bool) {
    let (text, lossy) = match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), true),
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => (rest.to_string(), lossy),
        None => (text, lossy),
    }
}

impl Engine {
    /// Validate `config` and build the detector registry.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Registry::new(&config)?;
        let ignore = build_ignore_set(&config.ignore_globs)?;
        Ok(Self {
            config,
            registry,
            ignore,
            advisories: AdvisoryFeed::default(),
        })
    }

    pub fn with_advisories(mut self, feed: AdvisoryFeed) -> Self {
        self.advisories = feed;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, inputs: &[FileInput]) -> Result<ReportModel, EngineError> {
        self.run_with_cancel(inputs, &CancellationToken::new())
    }

    pub fn run_with_cancel(
        &self,
        inputs: &[FileInput],
        cancel: &CancellationToken,
    ) -> Result<ReportModel, EngineError> {
        let started = Instant::now();
        let mut report = ReportModel::default();

        let mut queued: Vec<(String, &FileInput)> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for input in inputs {
            let path = display_path(&input.path);
            let reason = if !seen.insert(path.clone()) {
                Some(SkipReason::DuplicatePath)
            } else if self.ignore.as_ref().is_some_and(|set| set.is_match(&path)) {
                Some(SkipReason::Ignored)
            } else if input.bytes.len() as u64 > self.config.max_file_bytes {
                Some(SkipReason::TooLarge)
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    debug!(path = %path, ?reason, "skipping file");
                    report.skipped.push(SkippedFile { path, reason });
                }
                None => queued.push((path, input)),
            }
        }
        queued.sort_by(|a, b| a.0.cmp(&b.0));
        report
            .skipped
            .sort_by(|a, b| (&a.path, a.reason).cmp(&(&b.path, b.reason)));

        let outcomes: Vec<Option<FileOutcome>> = queued
            .par_iter()
            .map(|(path, input)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.analyze_file(path, input))
            })
            .collect();
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut findings = Vec::new();
        let mut shingles = Vec::new();
        let mut file_imports = Vec::new();
        let mut unreliable = BTreeSet::new();
        let mut languages: BTreeMap<String, Language> = BTreeMap::new();
        for outcome in outcomes.into_iter().flatten() {
            let path = outcome.entry.source.path.clone();
            if !outcome.entry.source.metrics_reliable {
                unreliable.insert(path.clone());
            }
            languages.insert(path, outcome.entry.source.language);
            findings.extend(outcome.findings);
            report.warnings.extend(outcome.warnings);
            shingles.push(outcome.shingles);
            file_imports.extend(outcome.imports);
            report.declared_dependencies.extend(outcome.declared);
            report.files.push(outcome.entry);
        }

        let mut cross_file = Vec::new();
        report.duplicates = duplicates::find_duplicates(&shingles, &self.config.thresholds);
        if self.config.emit_duplicate_findings {
            cross_file.extend(duplicates::duplicate_findings(
                &report.duplicates,
                &self.config.thresholds,
            ));
        }
        report.dependencies = graph::build(&file_imports);
        cross_file.extend(graph::graph_findings(&report.dependencies, &file_imports));
        if !self.advisories.is_empty() {
            cross_file.extend(advisory::advisory_findings(
                &report.declared_dependencies,
                &self.advisories,
            ));
        }
        let toggles = &self.config.detectors;
        findings.extend(cross_file.into_iter().filter(|f| {
            let language = languages.get(&f.path).copied().unwrap_or(Language::Unknown);
            toggles.is_enabled(&f.detector, language)
        }));
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        aggregate::lower_unreliable(
            &mut findings,
            &unreliable,
            self.config.unreliable_confidence_factor,
        );
        report.findings = aggregate::group_by_path(aggregate::merge_findings(findings));
        report
            .warnings
            .sort_by(|a, b| (&a.path, &a.detector, &a.message).cmp(&(&b.path, &b.detector, &b.message)));

        report.summary.duration_ms = started.elapsed().as_millis() as u64;
        aggregate::summarize(&mut report, inputs.len(), &self.config.debt);

        let summary = &report.summary;
        info!(
            files = summary.files_analyzed,
            skipped = report.skipped.len(),
            findings = summary.findings_total,
            duplicate_groups = summary.duplicate_groups,
            cycles = summary.cycles,
            duration_ms = summary.duration_ms,
            "analysis finished"
        );
        Ok(report)
    }

    fn analyze_file(&self, path: &str, input: &FileInput) -> FileOutcome {
        let head = &input.bytes[..input.bytes.len().min(4096)];
        let language = classify(Path::new(path), head);
        let (text, lossy) = decode(&input.bytes);
        let stream = normalize(&text, language);
        let metrics = metrics::extract(&stream);

        let mut degraded = Vec::new();
        if lossy {
            degraded.push(Degradation::LossyDecoding);
        }
        if !language.is_known() {
            degraded.push(Degradation::UnsupportedLanguage);
        }
        if !metrics.is_reliable() {
            degraded.push(Degradation::MetricsUnreliable);
        }

        let ctx = FileContext {
            path,
            language,
            stream: &stream,
            metrics: &metrics,
            config: &self.config,
        };
        let (findings, warnings) = self.registry.run(&ctx);
        if !warnings.is_empty() {
            degraded.push(Degradation::DetectorFailure);
        }

        // Unknown files still take part in duplicate detection.
        let shingles =
            duplicates::shingle(path, &stream, self.config.thresholds.duplicate_window_size);
        let imports = language.is_known().then(|| FileImports {
            path: path.to_string(),
            language,
            imports: imports::extract(&stream),
        });
        let declared = advisory::parse_manifest(path, &text);

        debug!(
            path,
            language = language.as_str(),
            lines = stream.len(),
            functions = metrics.functions.len(),
            findings = findings.len(),
            "analysed file"
        );

        FileOutcome {
            entry: FileEntry {
                source: SourceFile {
                    path: path.to_string(),
                    language,
                    byte_len: input.bytes.len() as u64,
                    line_count: metrics.total_lines,
                    encoding: input.encoding.clone(),
                    metrics_reliable: metrics.is_reliable(),
                },
                stats: metrics.stats(),
                degraded,
            },
            findings,
            warnings,
            shingles,
            imports,
            declared,
        }
    }
}
