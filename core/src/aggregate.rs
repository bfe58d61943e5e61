//! Cross-file aggregation: finding merge, confidence adjustment, summary and health.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::DebtWeights;
use crate::metrics::round2;
use crate::report::{
    Category, FileEntry, Finding, Health, HealthRating, Recommendation, RecommendationTopic,
    ReportModel, Severity, Summary,
};

/// Merge findings of the same detector on the same path whose ranges overlap.
///
/// The merged finding spans the union of the ranges and keeps the highest severity and
/// confidence. Distinct messages are joined with `; ` in order of appearance.
pub fn merge_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut buckets: BTreeMap<(String, String), Vec<Finding>> = BTreeMap::new();
    for finding in findings {
        buckets
            .entry((finding.path.clone(), finding.detector.clone()))
            .or_default()
            .push(finding);
    }

    let mut out = Vec::new();
    for (_, mut bucket) in buckets {
        bucket.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut current: Option<Finding> = None;
        for finding in bucket {
            match current.as_mut() {
                Some(acc) if acc.range.overlaps(&finding.range) => absorb(acc, finding),
                _ => {
                    if let Some(done) = current.replace(finding) {
                        out.push(done);
                    }
                }
            }
        }
        out.extend(current);
    }
    sort_findings(&mut out);
    out
}

fn absorb(acc: &mut Finding, other: Finding) {
    acc.range = acc.range.union(&other.range);
    if other.severity > acc.severity {
        acc.severity = other.severity;
    }
    acc.confidence = acc.confidence.max(other.confidence);
    if !acc.message.split("; ").any(|m| m == other.message) {
        acc.message.push_str("; ");
        acc.message.push_str(&other.message);
    }
    if acc.snippet.is_none() {
        acc.snippet = other.snippet;
    }
}

pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a.confidence.total_cmp(&b.confidence))
    });
}

/// Scale the confidence of every finding on a path in `unreliable` by `factor`.
pub fn lower_unreliable(findings: &mut [Finding], unreliable: &BTreeSet<String>, factor: f64) {
    for finding in findings.iter_mut() {
        if unreliable.contains(&finding.path) {
            finding.confidence = (finding.confidence * factor).clamp(0.0, 1.0);
        }
    }
}

pub fn group_by_path(findings: Vec<Finding>) -> BTreeMap<String, Vec<Finding>> {
    let mut grouped: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    for finding in findings {
        grouped.entry(finding.path.clone()).or_default().push(finding);
    }
    grouped
}

/// `171 - 5.2(cc - 1) - 0.23 * line_len - 16.2 * kloc + 50 * comment_density`, clamped to
/// `[0, 100]`.
pub fn maintainability_index(
    avg_complexity: f64,
    avg_line_length: f64,
    code_lines: u64,
    comment_density: f64,
) -> f64 {
    let cc = avg_complexity.max(1.0);
    let kloc = code_lines as f64 / 1000.0;
    let index =
        171.0 - 5.2 * (cc - 1.0) - 0.23 * avg_line_length - 16.2 * kloc + 50.0 * comment_density;
    index.clamp(0.0, 100.0)
}

/// Estimated remediation hours. Duplication findings are charged per group instead of per
/// member.
pub fn debt_hours<'a>(
    findings: impl IntoIterator<Item = &'a Finding>,
    duplicate_groups: usize,
    weights: &DebtWeights,
) -> f64 {
    let per_finding: f64 = findings
        .into_iter()
        .filter(|f| f.category != Category::Duplication)
        .map(|f| {
            let hours = weights.hours_for(f.severity);
            if f.category == Category::Security {
                hours * weights.security_multiplier
            } else {
                hours
            }
        })
        .sum();
    per_finding + weights.duplicate_group_hours * duplicate_groups as f64
}

/// Health over all analysed files. Per-file indices are averaged, weighted by code lines.
pub fn health(files: &[FileEntry], debt_hours: f64) -> Health {
    let weighted: Vec<(&FileEntry, f64)> = files
        .iter()
        .filter(|f| f.stats.code_lines > 0)
        .map(|f| (f, f.stats.code_lines as f64))
        .collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    if total == 0.0 {
        return Health {
            debt_hours: round2(debt_hours),
            ..Health::default()
        };
    }

    let mean = |value: &dyn Fn(&FileEntry) -> f64| -> f64 {
        weighted.iter().map(|(f, w)| value(f) * w).sum::<f64>() / total
    };
    let index = mean(&|f| {
        maintainability_index(
            f.stats.avg_complexity,
            f.stats.avg_line_length,
            u64::from(f.stats.code_lines),
            f.stats.comment_density,
        )
    });

    Health {
        maintainability_index: round2(index),
        rating: HealthRating::from_index(index),
        debt_hours: round2(debt_hours),
        avg_complexity: round2(mean(&|f| f.stats.avg_complexity)),
        avg_line_length: round2(mean(&|f| f.stats.avg_line_length)),
        comment_density: round2(mean(&|f| f.stats.comment_density)),
    }
}

/// Fill `report.summary` from the rest of the report. `files_total` counts skipped inputs too.
pub fn summarize(report: &mut ReportModel, files_total: usize, weights: &DebtWeights) {
    let mut summary = Summary {
        files_total,
        files_analyzed: report.files.len(),
        duration_ms: report.summary.duration_ms,
        ..Summary::default()
    };

    for skipped in &report.skipped {
        *summary.files_skipped.entry(skipped.reason).or_default() += 1;
    }
    for file in &report.files {
        let degraded: BTreeSet<_> = file.degraded.iter().copied().collect();
        for reason in degraded {
            *summary.files_degraded.entry(reason).or_default() += 1;
        }
        summary.lines_total += u64::from(file.source.line_count);
        summary.code_lines += u64::from(file.stats.code_lines);
        summary.comment_lines += u64::from(file.stats.comment_lines);
        summary.blank_lines += u64::from(file.stats.blank_lines);
        summary.functions += file.stats.functions;
        *summary.by_language.entry(file.source.language).or_default() += 1;
    }

    for finding in report.iter_findings() {
        summary.findings_total += 1;
        *summary.by_severity.entry(finding.severity).or_default() += 1;
        *summary.by_detector.entry(finding.detector.clone()).or_default() += 1;
        *summary.by_category.entry(finding.category).or_default() += 1;
    }

    summary.duplicate_groups = report.duplicates.len();
    summary.duplicated_lines = report.duplicates.iter().map(|g| g.duplicated_lines()).sum();

    let graph = &report.dependencies;
    summary.dependency_edges = graph.edges.len();
    summary.resolved_edges = graph.resolved_edges();
    summary.external_modules = graph.external_modules();
    summary.cycles = graph.cycles.len();

    let debt = debt_hours(report.iter_findings(), report.duplicates.len(), weights);
    summary.health = health(&report.files, debt);
    summary.recommendations = recommendations(&summary);
    report.summary = summary;
}

/// Security detectors with dedicated advice, in the order the advice is listed.
const SECURITY_ADVICE: &[(&str, &str)] = &[
    (
        "security/sql-concatenation",
        "Use parameterized statements or a query builder instead of concatenating SQL",
    ),
    (
        "security/dom-xss",
        "Sanitize output and prefer textContent or safe DOM APIs over innerHTML",
    ),
    (
        "security/hardcoded-credential",
        "Move hardcoded credentials to environment variables or a secret store",
    ),
];

/// Debt above this many hours (ten working days) earns its own recommendation.
const HIGH_DEBT_HOURS: f64 = 80.0;

/// Actionable advice for the whole run, computed from the finished summary.
///
/// The three most frequent detectors come first (ties by id), then security, performance and
/// style advice, then project-level advice on documentation, debt and maintainability.
pub fn recommendations(summary: &Summary) -> Vec<Recommendation> {
    let mut out = Vec::new();

    let mut top: Vec<(&str, usize)> = summary
        .by_detector
        .iter()
        .map(|(id, &n)| (id.as_str(), n))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    for (id, n) in top.into_iter().take(3) {
        out.push(Recommendation::new(RecommendationTopic::Findings, detector_advice(id, n)));
    }

    let count = |category: Category| summary.by_category.get(&category).copied().unwrap_or(0);
    let seen = |id: &str| summary.by_detector.contains_key(id);

    for (id, advice) in SECURITY_ADVICE {
        if seen(*id) {
            out.push(Recommendation::new(RecommendationTopic::Security, *advice));
        }
    }
    if count(Category::Security) > 3 {
        out.push(Recommendation::new(
            RecommendationTopic::Security,
            "Schedule a thorough security review and run a dedicated scanner in CI",
        ));
    }

    if seen("performance/nested-loops") {
        out.push(Recommendation::new(
            RecommendationTopic::Performance,
            "Restructure nested loops with lookups or indexes to lower algorithmic cost",
        ));
    }
    let other_performance = summary
        .by_detector
        .keys()
        .any(|id| id.starts_with("performance/") && id != "performance/nested-loops");
    if other_performance {
        out.push(Recommendation::new(
            RecommendationTopic::Performance,
            "Hoist repeated work out of loop bodies and conditions",
        ));
    }

    if count(Category::Style) > 10 {
        out.push(Recommendation::new(
            RecommendationTopic::Style,
            "Enforce one code style with a formatter and linter",
        ));
    }

    let health = &summary.health;
    if summary.code_lines > 0 && health.comment_density < 0.1 {
        out.push(Recommendation::new(
            RecommendationTopic::Project,
            format!(
                "Improve documentation: comment density is {:.0}%",
                health.comment_density * 100.0
            ),
        ));
    }
    if health.debt_hours > HIGH_DEBT_HOURS {
        out.push(Recommendation::new(
            RecommendationTopic::Project,
            format!(
                "Set aside time for technical debt, estimated at {:.1} days",
                health.debt_hours / 8.0
            ),
        ));
    }
    if matches!(health.rating, HealthRating::Poor | HealthRating::VeryPoor) {
        out.push(Recommendation::new(
            RecommendationTopic::Project,
            "Plan a significant refactoring to improve maintainability",
        ));
    }
    out
}

fn detector_advice(id: &str, n: usize) -> String {
    match id {
        "size/long-function" => format!("Split {n} long functions into smaller, focused units"),
        "size/too-many-parameters" => {
            format!("Reduce parameters in {n} functions with parameter objects")
        }
        "nesting/deep-nesting" => {
            format!("Flatten {n} deeply nested functions with early returns or helpers")
        }
        "complexity/high-complexity" => {
            format!("Simplify {n} functions with high cyclomatic complexity")
        }
        "duplication/block" => format!("Extract {n} duplicated blocks into shared functions"),
        _ => format!("Address {n} `{id}` findings"),
    }
}

/// Severity counts in `critical, warning, info` order, for terminal summaries.
pub fn severity_counts(summary: &Summary) -> [(Severity, usize); 3] {
    [Severity::Critical, Severity::Warning, Severity::Info]
        .map(|s| (s, summary.by_severity.get(&s).copied().unwrap_or(0)))
}
