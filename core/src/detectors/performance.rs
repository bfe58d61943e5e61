use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DetectorError;
use crate::language::Language;
use crate::metrics::LoopRegion;
use crate::normalize::Line;
use crate::report::{Category, Finding, LineRange, Severity};

use super::{Detector, FileContext};

static CONCAT_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\w\]\)]\s*\+=\s*(?:[fFrRbu]?["'`]|str\(|String\(|\w+\.toString\(\))"#).unwrap()
});
static CONCAT_SELF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(\w+)\s*=\s*(\w+)\s*\+\s*(?:["'`]|\w+\s*\+\s*["'`])"#).unwrap());
static PHP_CONCAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\w+\s*\.=").unwrap());
static RANGE_LEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:async\s+)?for\s+\w+\s+in\s+range\s*\(\s*len\s*\(").unwrap());
static FOR_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfor\s*\(([^;]*);([^;]*);").unwrap());
static STRLEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:strlen|wcslen)\s*\(").unwrap());
static SIZE_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.(?:length|size\(\)|count\(\)|Count\b|Length\b)|\b(?:count|sizeof|len)\s*\(").unwrap()
});
static REGEX_COMPILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bre\.compile\s*\(|\bnew\s+RegExp\s*\(|\bRegex::new\s*\(|\bPattern\.compile\s*\(|\bnew\s+Regex\s*\(|\bregexp\.(?:MustCompile|Compile)\s*\(|\bRegexp\.new\s*\(|\bNSRegularExpression\s*\(|\bstd::regex\s+\w+\s*\(",
    )
    .unwrap()
});
static DOM_QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bdocument\.(?:querySelector(?:All)?|getElementById|getElementsBy\w+)\s*\(|\$\(\s*['\x22]").unwrap()
});

/// Work repeated on every loop iteration.
pub struct PerformanceDetector;

impl PerformanceDetector {
    fn concat_in_loop(language: Language, line: &Line) -> bool {
        match language {
            Language::Php => PHP_CONCAT_RE.is_match(&line.masked),
            Language::Rust | Language::C | Language::Cpp => false,
            _ => {
                CONCAT_ASSIGN_RE.is_match(&line.masked)
                    || CONCAT_SELF_RE
                        .captures(&line.masked)
                        .is_some_and(|caps| caps[1] == caps[2])
            }
        }
    }
}

/// Innermost loop whose body (not header) contains `line`.
fn in_loop_body<'m>(ctx: &'m FileContext<'_>, line: u32) -> Option<&'m LoopRegion> {
    ctx.metrics
        .loop_at(line)
        .filter(|region| line > region.range.start)
}

fn snippet(line: &Line) -> &str {
    line.code.trim()
}

impl Detector for PerformanceDetector {
    fn id(&self) -> &'static str {
        "performance"
    }

    fn base_confidence(&self) -> f64 {
        0.75
    }

    fn rule_ids(&self) -> Vec<String> {
        vec![
            "performance/string-concat-in-loop".into(),
            "performance/nested-loops".into(),
            "performance/range-len".into(),
            "performance/loop-condition-recompute".into(),
            "performance/regex-in-loop".into(),
            "performance/dom-query-in-loop".into(),
        ]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let language = ctx.language;
        let mut findings = Vec::new();

        for region in &ctx.metrics.loops {
            if region.depth < 2 {
                continue;
            }
            // Report the innermost loop of each nest only.
            let has_deeper = ctx.metrics.loops.iter().any(|other| {
                other.depth == region.depth + 1
                    && other.range.start >= region.range.start
                    && other.range.end <= region.range.end
            });
            if has_deeper {
                continue;
            }
            let severity = if region.depth >= 3 {
                Severity::Warning
            } else {
                Severity::Info
            };
            findings.push(Finding::new(
                "performance/nested-loops",
                Category::Performance,
                severity,
                ctx.path,
                region.range,
                format!(
                    "loop nested {} deep; consider an index or a single pass",
                    region.depth
                ),
            ));
        }

        for line in &ctx.stream.lines {
            if line.is_blank || line.is_comment_only {
                continue;
            }
            let here = LineRange::line(line.number);
            let looped = in_loop_body(ctx, line.number).is_some();

            if looped && Self::concat_in_loop(language, line) {
                findings.push(
                    Finding::new(
                        "performance/string-concat-in-loop",
                        Category::Performance,
                        Severity::Warning,
                        ctx.path,
                        here,
                        "string built by repeated concatenation inside a loop; collect the parts and join once",
                    )
                    .with_snippet(snippet(line)),
                );
            }

            if language == Language::Python && RANGE_LEN_RE.is_match(&line.masked) {
                findings.push(
                    Finding::new(
                        "performance/range-len",
                        Category::Performance,
                        Severity::Info,
                        ctx.path,
                        here,
                        "`range(len(..))` iteration; iterate directly or use `enumerate()`",
                    )
                    .with_snippet(snippet(line)),
                );
            }

            if language.has_ternary() {
                if let Some(caps) = FOR_HEADER_RE.captures(&line.masked) {
                    let condition = &caps[2];
                    let severity = if STRLEN_RE.is_match(condition) {
                        Some(Severity::Warning)
                    } else if SIZE_CALL_RE.is_match(condition) {
                        Some(Severity::Info)
                    } else {
                        None
                    };
                    if let Some(severity) = severity {
                        findings.push(
                            Finding::new(
                                "performance/loop-condition-recompute",
                                Category::Performance,
                                severity,
                                ctx.path,
                                here,
                                format!(
                                    "loop condition `{}` is re-evaluated on every iteration; hoist it",
                                    condition.trim()
                                ),
                            )
                            .with_snippet(snippet(line)),
                        );
                    }
                }
            }

            if looped && REGEX_COMPILE_RE.is_match(&line.masked) {
                findings.push(
                    Finding::new(
                        "performance/regex-in-loop",
                        Category::Performance,
                        Severity::Warning,
                        ctx.path,
                        here,
                        "regular expression compiled inside a loop; compile it once outside",
                    )
                    .with_snippet(snippet(line)),
                );
            }

            if looped
                && matches!(
                    language,
                    Language::JavaScript | Language::TypeScript | Language::Html | Language::Php
                )
                && DOM_QUERY_RE.is_match(&line.code)
            {
                findings.push(
                    Finding::new(
                        "performance/dom-query-in-loop",
                        Category::Performance,
                        Severity::Info,
                        ctx.path,
                        here,
                        "DOM lookup repeated inside a loop; query once and reuse the element",
                    )
                    .with_snippet(snippet(line)),
                );
            }
        }
        Ok(findings)
    }
}
