//! Output types: findings, per-file entries, run warnings and the aggregated report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::advisory::DeclaredDependency;
use crate::config::ExitPolicy;
use crate::duplicates::DuplicateGroup;
use crate::graph::DependencyGraph;
use crate::language::Language;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Size,
    Complexity,
    Nesting,
    Security,
    Performance,
    Style,
    Trivial,
    Comments,
    AntiPattern,
    Duplication,
    Dependency,
    Advisory,
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn line(line: u32) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn union(&self, other: &LineRange) -> LineRange {
        LineRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub detector: String,
    pub category: Category,
    pub severity: Severity,
    pub path: String,
    pub range: LineRange,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub confidence: f64,
}

impl Finding {
    pub fn new(
        detector: impl Into<String>,
        category: Category,
        severity: Severity,
        path: &str,
        range: LineRange,
        message: impl Into<String>,
    ) -> Self {
        Self {
            detector: detector.into(),
            category,
            severity,
            path: path.to_string(),
            range,
            message: message.into(),
            snippet: None,
            confidence: 1.0,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        let trimmed = snippet.trim();
        if !trimmed.is_empty() {
            self.snippet = Some(trimmed.to_string());
        }
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Total order used everywhere findings are listed.
    pub fn sort_key(&self) -> (&str, u32, u32, &str, std::cmp::Reverse<Severity>, &str) {
        (
            self.path.as_str(),
            self.range.start,
            self.range.end,
            self.detector.as_str(),
            std::cmp::Reverse(self.severity),
            self.message.as_str(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub language: Language,
    pub byte_len: u64,
    pub line_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub metrics_reliable: bool,
}

/// Line statistics carried into the report for each analysed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FileStats {
    pub code_lines: u32,
    pub comment_lines: u32,
    pub blank_lines: u32,
    pub functions: usize,
    pub max_line_length: usize,
    pub avg_line_length: f64,
    pub comment_density: f64,
    pub avg_complexity: f64,
    pub max_nesting_depth: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Ignored,
    TooLarge,
    DuplicatePath,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Degradation {
    UnsupportedLanguage,
    MetricsUnreliable,
    DetectorFailure,
    LossyDecoding,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub source: SourceFile,
    pub stats: FileStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunWarning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HealthRating {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl HealthRating {
    pub fn from_index(index: f64) -> Self {
        if index >= 80.0 {
            HealthRating::Excellent
        } else if index >= 60.0 {
            HealthRating::Good
        } else if index >= 40.0 {
            HealthRating::Fair
        } else if index >= 20.0 {
            HealthRating::Poor
        } else {
            HealthRating::VeryPoor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub maintainability_index: f64,
    pub rating: HealthRating,
    pub debt_hours: f64,
    pub avg_complexity: f64,
    pub avg_line_length: f64,
    pub comment_density: f64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            maintainability_index: 100.0,
            rating: HealthRating::Excellent,
            debt_hours: 0.0,
            avg_complexity: 0.0,
            avg_line_length: 0.0,
            comment_density: 0.0,
        }
    }
}

/// Area a recommendation addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationTopic {
    Findings,
    Security,
    Performance,
    Style,
    Project,
}

/// Project-level advice derived from the summary counts and health.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub topic: RecommendationTopic,
    pub message: String,
}

impl Recommendation {
    pub fn new(topic: RecommendationTopic, message: impl Into<String>) -> Self {
        Self {
            topic,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Summary {
    pub files_total: usize,
    pub files_analyzed: usize,
    pub files_skipped: BTreeMap<SkipReason, usize>,
    pub files_degraded: BTreeMap<Degradation, usize>,
    pub lines_total: u64,
    pub code_lines: u64,
    pub comment_lines: u64,
    pub blank_lines: u64,
    pub functions: usize,
    pub findings_total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_detector: BTreeMap<String, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub by_language: BTreeMap<Language, usize>,
    pub duplicate_groups: usize,
    pub duplicated_lines: u64,
    pub dependency_edges: usize,
    pub resolved_edges: usize,
    pub external_modules: usize,
    pub cycles: usize,
    pub health: Health,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
    /// Wall-clock time; the only field that differs between identical runs.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportModel {
    pub files: Vec<FileEntry>,
    pub skipped: Vec<SkippedFile>,
    pub findings: BTreeMap<String, Vec<Finding>>,
    pub duplicates: Vec<DuplicateGroup>,
    pub dependencies: DependencyGraph,
    pub declared_dependencies: Vec<DeclaredDependency>,
    pub warnings: Vec<RunWarning>,
    pub summary: Summary,
}

impl ReportModel {
    pub fn iter_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.values().flatten()
    }

    pub fn finding_count(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn findings_for(&self, path: &str) -> &[Finding] {
        self.findings.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.iter_findings().map(|f| f.severity).max()
    }

    /// Process exit code for this report under `policy`: `policy.exit_code` when any finding is at
    /// or above `policy.fail_on`, otherwise 0.
    pub fn exit_code(&self, policy: &ExitPolicy) -> i32 {
        match self.max_severity() {
            Some(max) if max >= policy.fail_on => policy.exit_code,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding::new(
            "size/long-file",
            Category::Size,
            severity,
            "a.rs",
            LineRange::new(1, 3),
            "long",
        )
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn ranges_normalise_and_overlap() {
        let r = LineRange::new(9, 4);
        assert_eq!((r.start, r.end), (4, 9));
        assert!(r.overlaps(&LineRange::line(9)));
        assert!(!r.overlaps(&LineRange::new(10, 12)));
        assert_eq!(r.union(&LineRange::new(10, 12)), LineRange::new(4, 12));
        assert_eq!(r.len(), 6);
    }

    #[test]
    fn exit_code_follows_policy() {
        let mut report = ReportModel::default();
        let policy = ExitPolicy::default();
        assert_eq!(report.exit_code(&policy), 0);

        report
            .findings
            .insert("a.rs".into(), vec![finding(Severity::Warning)]);
        assert_eq!(report.exit_code(&policy), 0);

        let strict = ExitPolicy {
            fail_on: Severity::Warning,
            exit_code: 3,
        };
        assert_eq!(report.exit_code(&strict), 3);

        report
            .findings
            .get_mut("a.rs")
            .unwrap()
            .push(finding(Severity::Critical));
        assert_eq!(report.exit_code(&policy), 1);
    }

    #[test]
    fn confidence_is_clamped_and_snippets_trimmed() {
        let f = finding(Severity::Info)
            .with_confidence(1.7)
            .with_snippet("   ");
        assert_eq!(f.confidence, 1.0);
        assert!(f.snippet.is_none());
    }

    #[test]
    fn enum_keys_serialise_as_strings() {
        let mut summary = Summary::default();
        summary.by_severity.insert(Severity::Critical, 2);
        summary.files_skipped.insert(SkipReason::TooLarge, 1);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_severity"]["critical"], 2);
        assert_eq!(json["files_skipped"]["too-large"], 1);
    }
}
