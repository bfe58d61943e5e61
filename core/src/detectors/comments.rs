use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DetectorError;
use crate::language::LexRules;
use crate::normalize::Line;
use crate::report::{Category, Finding, LineRange, Severity};

use super::{Detector, FileContext};

const MARKERS: &[(&str, Severity)] = &[
    ("TODO", Severity::Info),
    ("FIXME", Severity::Warning),
    ("HACK", Severity::Warning),
    ("XXX", Severity::Warning),
];

static CODE_LIKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^(?:
            (?:if|for|while|switch|return|let|var|const|def|fn|function|import|from|class|print|echo|using|package|\#include)\b.*[;:{(=)]
          | [\w.$\[\]]+\s*(?:=|\+=|-=|\*=|/=)\s*[^=\s].*
          | [\w.$:]+\(.*\)\s*;?
          | [{}\])]+\s*;?
          | .*;
        )\s*$",
    )
    .unwrap()
});

/// Task markers and commented-out code.
pub struct CommentsDetector {
    markers: AhoCorasick,
}

impl CommentsDetector {
    pub fn new() -> Self {
        Self {
            markers: AhoCorasickBuilder::new()
                .ascii_case_insensitive(false)
                .build(MARKERS.iter().map(|(m, _)| *m)),
        }
    }

    fn task_marker(&self, ctx: &FileContext<'_>, line: &Line) -> Option<Finding> {
        let text = line.comment.as_str();
        let bytes = text.as_bytes();
        let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
        let mut best: Option<(usize, usize, Severity)> = None;
        for mat in self.markers.find_iter(bytes) {
            let before = mat.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(mat.end()).copied();
            if before.is_some_and(is_word) || after.is_some_and(is_word) {
                continue;
            }
            let severity = MARKERS[mat.pattern()].1;
            if best.map_or(true, |(_, _, s)| severity > s) {
                best = Some((mat.start(), mat.end(), severity));
            }
        }
        let (start, end, severity) = best?;
        let marker = &text[start..end];
        let note = text[end..]
            .trim_start_matches(|c: char| c == ':' || c == '(' || c.is_whitespace())
            .trim_end_matches("*/")
            .trim();
        let message = if note.is_empty() {
            format!("`{marker}` marker")
        } else {
            format!("`{marker}` marker: {note}")
        };
        Some(
            Finding::new(
                "comments/task-marker",
                Category::Comments,
                severity,
                ctx.path,
                LineRange::line(line.number),
                message,
            )
            .with_snippet(text),
        )
    }
}

impl Default for CommentsDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Comment text without its markers.
fn comment_body<'a>(comment: &'a str, rules: Option<&LexRules>) -> &'a str {
    let mut text = comment.trim();
    if let Some(rules) = rules {
        for marker in rules.line_comments {
            if let Some(rest) = text.strip_prefix(marker) {
                text = rest;
                break;
            }
        }
        for (open, close) in rules.block_comments {
            text = text.strip_prefix(open).unwrap_or(text);
            text = text.strip_suffix(close).unwrap_or(text);
        }
    }
    text.trim().trim_start_matches('*').trim()
}

fn is_doc_comment(raw: &str) -> bool {
    let t = raw.trim_start();
    t.starts_with("///") || t.starts_with("//!") || t.starts_with("/**") || t.starts_with("#!")
}

impl Detector for CommentsDetector {
    fn id(&self) -> &'static str {
        "comments"
    }

    fn needs_comments(&self) -> bool {
        true
    }

    fn rule_ids(&self) -> Vec<String> {
        vec!["comments/task-marker".into(), "comments/commented-out-code".into()]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let rules = ctx.language.lex_rules();
        let mut findings = Vec::new();
        let mut run: Vec<u32> = Vec::new();
        let mut in_doc_block = false;

        let flush = |run: &mut Vec<u32>, findings: &mut Vec<Finding>| {
            if run.len() >= 2 {
                let range = LineRange::new(run[0], run[run.len() - 1]);
                findings.push(Finding::new(
                    "comments/commented-out-code",
                    Category::Comments,
                    Severity::Info,
                    ctx.path,
                    range,
                    format!("{} lines of commented-out code; delete it, history keeps it", run.len()),
                ));
            }
            run.clear();
        };

        for line in &ctx.stream.lines {
            if line.comment.is_empty() {
                flush(&mut run, &mut findings);
                continue;
            }
            if let Some(finding) = self.task_marker(ctx, line) {
                findings.push(finding);
            }

            let doc = in_doc_block || is_doc_comment(&line.raw);
            if line.raw.trim_start().starts_with("/**") {
                in_doc_block = true;
            }
            if in_doc_block && line.comment.contains("*/") {
                in_doc_block = false;
            }

            let body = comment_body(&line.comment, rules);
            if line.is_comment_only && !doc && !body.is_empty() && CODE_LIKE_RE.is_match(body) {
                run.push(line.number);
            } else {
                flush(&mut run, &mut findings);
            }
        }
        flush(&mut run, &mut findings);
        Ok(findings)
    }
}
