use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DetectorError;
use crate::metrics::FunctionUnit;
use crate::report::{Category, Finding, Severity};

use super::{Detector, FileContext};

static FORWARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:return\s+)?(?:await\s+)?(?P<callee>[A-Za-z_$][\w$]*(?:(?:\.|::|->)[A-Za-z_$][\w$]*)*!?)\s*\((?P<args>.*)\)\s*;?$",
    )
    .unwrap()
});

const PLACEHOLDER_STATEMENTS: &[&str] = &[
    "pass",
    "...",
    "return",
    "return;",
    "return None",
    "return nil",
    "return null;",
];

/// Bodies that do nothing and wrappers that only forward their arguments.
pub struct TrivialDetector;

fn is_empty_body(unit: &FunctionUnit) -> bool {
    match unit.statement_count {
        0 => true,
        1 => unit
            .first_statement
            .as_deref()
            .is_some_and(|s| PLACEHOLDER_STATEMENTS.contains(&s)),
        _ => false,
    }
}

fn strip_argument(arg: &str) -> &str {
    let arg = arg.trim();
    let arg = arg
        .strip_prefix("&mut ")
        .or_else(|| arg.strip_prefix('&'))
        .or_else(|| arg.strip_prefix('*'))
        .unwrap_or(arg)
        .trim();
    arg.strip_suffix(".clone()").unwrap_or(arg)
}

fn split_arguments(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (pos, ch) in args.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&args[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    let tail = &args[start..];
    if !tail.trim().is_empty() {
        out.push(tail);
    }
    out
}

/// Callee name when `unit` forwards exactly its own parameters to another function.
fn forwarded_callee(unit: &FunctionUnit, max_statements: usize) -> Option<String> {
    if unit.parameters.is_empty() || unit.statement_count > max_statements || unit.complexity > 1 {
        return None;
    }
    let first = unit.first_statement.as_deref()?;
    let caps = FORWARD_RE.captures(first)?;
    let callee = caps.name("callee")?.as_str();
    let last_segment = callee
        .rsplit(|c: char| c == '.' || c == ':' || c == '>')
        .next()
        .unwrap_or(callee);
    if last_segment == unit.name {
        return None;
    }
    let args: Vec<&str> = split_arguments(caps.name("args")?.as_str())
        .into_iter()
        .map(strip_argument)
        .collect();
    (args == unit.parameters).then(|| callee.to_string())
}

impl Detector for TrivialDetector {
    fn id(&self) -> &'static str {
        "trivial"
    }

    fn base_confidence(&self) -> f64 {
        0.8
    }

    fn rule_ids(&self) -> Vec<String> {
        vec!["trivial/empty-body".into(), "trivial/pass-through".into()]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let max_statements = ctx.config.thresholds.trivial_max_statements;
        let mut findings = Vec::new();
        for unit in &ctx.metrics.functions {
            if is_empty_body(unit) {
                findings.push(Finding::new(
                    "trivial/empty-body",
                    Category::Trivial,
                    Severity::Info,
                    ctx.path,
                    unit.range(),
                    format!("`{}` has an empty body", unit.name),
                ));
            } else if let Some(callee) = forwarded_callee(unit, max_statements) {
                findings.push(
                    Finding::new(
                        "trivial/pass-through",
                        Category::Trivial,
                        Severity::Info,
                        ctx.path,
                        unit.range(),
                        format!(
                            "`{}` only forwards its arguments to `{callee}`; call it directly",
                            unit.name
                        ),
                    )
                    .with_snippet(unit.first_statement.clone().unwrap_or_default()),
                );
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::language::Language;
    use crate::metrics::extract;
    use crate::normalize::normalize;

    fn run(text: &str, language: Language) -> Vec<Finding> {
        let config = Config::default();
        let stream = normalize(text, language);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "wrap",
            language,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        TrivialDetector.detect(&ctx).unwrap()
    }

    #[test]
    fn python_placeholders_and_wrappers() {
        let src = "\
def todo(x):
    pass

def load(path, mode):
    return open_file(path, mode)

def loud(path):
    if path:
        return open_file(path)
";
        let findings = run(src, Language::Python);
        let ids: Vec<_> = findings.iter().map(|f| f.detector.as_str()).collect();
        assert_eq!(ids, vec!["trivial/empty-body", "trivial/pass-through"]);
        assert!(findings[1].message.contains("`open_file`"));
    }

    #[test]
    fn rust_forwarding_strips_borrows() {
        let src = "fn size(items: &[u8], limit: usize) -> usize {\n    count_items(&items, limit)\n}\n";
        let findings = run(src, Language::Rust);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "trivial/pass-through");
    }

    #[test]
    fn different_arguments_are_not_forwarding() {
        let src = "function area(w, h) {\n  return multiply(h, w);\n}\nfunction fact(n) {\n  return fact(n);\n}\n";
        assert!(run(src, Language::JavaScript).is_empty());
    }

    #[test]
    fn argument_splitting() {
        assert_eq!(split_arguments("a, f(b, c), d"), vec!["a", " f(b, c)", " d"]);
        assert!(split_arguments("  ").is_empty());
        assert_eq!(strip_argument(" &mut buf "), "buf");
        assert_eq!(strip_argument("name.clone()"), "name");
    }
}
