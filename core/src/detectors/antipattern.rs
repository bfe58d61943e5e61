//! Language-specific constructs that are legal but almost always a mistake.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DetectorError;
use crate::language::{BlockStyle, Language};
use crate::normalize::Line;
use crate::report::{Category, Finding, LineRange, Severity};

use super::{Detector, FileContext};

static BARE_EXCEPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*except\s*:").unwrap());
static EXCEPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*except\b[^:]*:\s*(\S.*)?$").unwrap());
static IMPORT_STAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+[\w.]+\s+import\s+\*").unwrap());
static MUTABLE_DEFAULT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+\w+\s*\(.*\w\s*(?::\s*[^=,]+)?=\s*(?:\[|\{|list\(\)|dict\(\)|set\(\))").unwrap()
});
static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[;{(\s])var\s+[A-Za-z_$]").unwrap());
static WITH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[;{\s])with\s*\(").unwrap());
static CATCH_INLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcatch\b\s*(?:\([^)]*\))?\s*\{\s*\}").unwrap());
static CATCH_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcatch\b\s*(?:\([^)]*\))?\s*\{\s*$").unwrap());
static SELF_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_$][\w.$\[\]]*)\s*=\s*([A-Za-z_$][\w.$\[\]]*)\s*;?\s*$").unwrap()
});
static CONSTANT_IF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[^\w.])(?:el)?if\s*(?:\(\s*(?:true|false|True|False|0|1)\s*\)|\s(?:true|false|True|False|0|1)\s*(?::|\{|\bthen\b|$))",
    )
    .unwrap()
});
static EVAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^\w.$])eval\s*\(").unwrap());

/// `==`/`!=` that are not `===`/`!==` and not the `== null` idiom.
fn loose_equality(masked: &str) -> bool {
    let bytes = masked.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let op = (bytes[i], bytes[i + 1]);
        if op == (b'=', b'=') || op == (b'!', b'=') {
            let prev = if i > 0 { bytes[i - 1] } else { b' ' };
            let next = bytes.get(i + 2).copied();
            let strict = next == Some(b'=');
            let part_of_other = op.0 == b'=' && matches!(prev, b'=' | b'!' | b'<' | b'>');
            if !strict && !part_of_other {
                let rest = masked[i + 2..].trim_start();
                if !rest.starts_with("null") && !rest.starts_with("undefined") {
                    return true;
                }
            }
            i += if strict { 3 } else { 2 };
            continue;
        }
        i += 1;
    }
    false
}

fn next_code_line<'a>(lines: &'a [Line], idx: usize) -> Option<&'a Line> {
    lines[idx + 1..].iter().find(|l| !l.is_blank)
}

/// Python mutable defaults, bare excepts, JS `var`/`==`/`with`, empty catch blocks, self
/// assignment and constant `if` conditions.
pub struct AntiPatternDetector;

impl AntiPatternDetector {
    fn python(&self, line: &Line, next: Option<&Line>, push: &mut impl FnMut(&'static str, Severity, String)) {
        if BARE_EXCEPT_RE.is_match(&line.masked) {
            push(
                "antipattern/bare-except",
                Severity::Warning,
                "bare `except:` also catches `KeyboardInterrupt` and `SystemExit`; name the exception".into(),
            );
        }
        if let Some(caps) = EXCEPT_RE.captures(&line.masked) {
            let inline = caps.get(1).map(|m| m.as_str().trim());
            let swallowed = match inline {
                Some(stmt) => stmt == "pass",
                None => next.is_some_and(|l| l.masked.trim() == "pass"),
            };
            if swallowed {
                push(
                    "antipattern/empty-catch",
                    Severity::Warning,
                    "exception handler swallows the error with `pass`".into(),
                );
            }
        }
        if IMPORT_STAR_RE.is_match(&line.masked) {
            push(
                "antipattern/import-star",
                Severity::Warning,
                "`import *` hides where names come from".into(),
            );
        }
        if MUTABLE_DEFAULT_RE.is_match(&line.masked) {
            push(
                "antipattern/mutable-default",
                Severity::Warning,
                "mutable default argument is shared between calls; default to `None`".into(),
            );
        }
    }

    fn javascript(&self, line: &Line, push: &mut impl FnMut(&'static str, Severity, String)) {
        if VAR_RE.is_match(&line.masked) {
            push(
                "antipattern/var-declaration",
                Severity::Info,
                "`var` is function scoped; use `let` or `const`".into(),
            );
        }
        if loose_equality(&line.masked) {
            push(
                "antipattern/loose-equality",
                Severity::Info,
                "loose equality coerces types; use `===` or `!==`".into(),
            );
        }
        if WITH_RE.is_match(&line.masked) {
            push(
                "antipattern/with-statement",
                Severity::Warning,
                "`with` makes name resolution ambiguous".into(),
            );
        }
    }
}

impl Detector for AntiPatternDetector {
    fn id(&self) -> &'static str {
        "antipattern"
    }

    fn base_confidence(&self) -> f64 {
        0.85
    }

    fn rule_ids(&self) -> Vec<String> {
        [
            "bare-except",
            "import-star",
            "mutable-default",
            "var-declaration",
            "loose-equality",
            "with-statement",
            "empty-catch",
            "self-assignment",
            "constant-condition",
            "eval",
        ]
        .iter()
        .map(|rule| format!("antipattern/{rule}"))
        .collect()
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let language = ctx.language;
        let lines = &ctx.stream.lines;
        let mut findings = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if line.is_blank || line.is_comment_only {
                continue;
            }
            let snippet = line.code.trim();
            let mut push = |id: &'static str, severity: Severity, message: String| {
                findings.push(
                    Finding::new(
                        id,
                        Category::AntiPattern,
                        severity,
                        ctx.path,
                        LineRange::line(line.number),
                        message,
                    )
                    .with_snippet(snippet),
                );
            };
            let next = next_code_line(lines, idx);

            match language {
                Language::Python => self.python(line, next, &mut push),
                Language::JavaScript | Language::TypeScript => self.javascript(line, &mut push),
                _ => {}
            }

            if language.block_style() == BlockStyle::Braces {
                let empty = CATCH_INLINE_RE.is_match(&line.masked)
                    || (CATCH_OPEN_RE.is_match(&line.masked)
                        && next.is_some_and(|l| l.masked.trim().starts_with('}')));
                if empty {
                    push(
                        "antipattern/empty-catch",
                        Severity::Warning,
                        "empty catch block silently discards the error".into(),
                    );
                }
            }

            if language != Language::Shell && language.block_style() != BlockStyle::None {
                if let Some(caps) = SELF_ASSIGN_RE.captures(&line.masked) {
                    let strip = |s: &str| s.trim_start_matches('$').to_string();
                    if strip(&caps[1]) == strip(&caps[2]) {
                        push(
                            "antipattern/self-assignment",
                            Severity::Warning,
                            format!("`{}` is assigned to itself", &caps[1]),
                        );
                    }
                }
                if CONSTANT_IF_RE.is_match(&line.masked) {
                    push(
                        "antipattern/constant-condition",
                        Severity::Warning,
                        "condition is a constant; the branch is always or never taken".into(),
                    );
                }
            }

            if matches!(
                language,
                Language::JavaScript | Language::TypeScript | Language::Python | Language::Php | Language::Ruby
            ) && EVAL_RE.is_match(&line.masked)
            {
                push(
                    "antipattern/eval",
                    Severity::Info,
                    "`eval` runs arbitrary code and defeats static analysis".into(),
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
    use crate::metrics::extract;
    use crate::normalize::normalize;

    fn run(text: &str, language: Language) -> Vec<(String, u32)> {
        let config = Config::default();
        let stream = normalize(text, language);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "legacy",
            language,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        AntiPatternDetector
            .detect(&ctx)
            .unwrap()
            .into_iter()
            .map(|f| (f.detector, f.range.start))
            .collect()
    }

    fn hit(id: &str, line: u32) -> (String, u32) {
        (format!("antipattern/{id}"), line)
    }

    #[test]
    fn python_patterns() {
        let src = "\
from os import *
def add(item, bucket=[]):
    try:
        bucket.append(item)
    except:
        pass
    if True:
        bucket = bucket
    return bucket
";
        assert_eq!(
            run(src, Language::Python),
            vec![
                hit("import-star", 1),
                hit("mutable-default", 2),
                hit("bare-except", 5),
                hit("empty-catch", 5),
                hit("constant-condition", 7),
                hit("self-assignment", 8),
            ]
        );
    }

    #[test]
    fn javascript_patterns() {
        let src = "\
var total = 0;
if (a == b || c === d || e == null) {}
try { run(); } catch (e) {}
with (obj) { x = 1; }
if (false) {
  eval(code);
}
";
        assert_eq!(
            run(src, Language::JavaScript),
            vec![
                hit("var-declaration", 1),
                hit("loose-equality", 2),
                hit("empty-catch", 3),
                hit("with-statement", 4),
                hit("constant-condition", 5),
                hit("eval", 6),
            ]
        );
    }

    #[test]
    fn strings_do_not_trigger() {
        let src = "const msg = \"var x == y; eval(1)\";\n";
        assert!(run(src, Language::JavaScript).is_empty());
    }

    #[test]
    fn multi_line_empty_catch() {
        let src = "try {\n  work();\n} catch (IOException e) {\n}\n";
        assert_eq!(run(src, Language::Java), vec![hit("empty-catch", 3)]);
    }

    #[test]
    fn loose_equality_scanner() {
        assert!(loose_equality("if (a == b)"));
        assert!(loose_equality("if (a != b)"));
        assert!(!loose_equality("if (a === b && c !== d)"));
        assert!(!loose_equality("if (a <= b || c >= d)"));
        assert!(!loose_equality("if (x != null)"));
    }
}
