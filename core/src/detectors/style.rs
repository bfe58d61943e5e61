use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::DetectorError;
use crate::language::Language;
use crate::report::{Category, Finding, LineRange, Severity};

use super::{Detector, FileContext};

static TYPE_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|public|private|protected|internal|abstract|final|sealed|data|open|static|partial|default)\s+)*(?:class|struct|enum|trait|interface|protocol|module)\s+([A-Za-z_]\w*)",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Convention {
    Snake,
    LowerCamel,
    UpperCamel,
    /// Go: either camel form, no underscores.
    MixedCaps,
}

fn function_convention(language: Language) -> Option<Convention> {
    match language {
        Language::Rust | Language::Python | Language::Ruby | Language::Shell => {
            Some(Convention::Snake)
        }
        Language::JavaScript
        | Language::TypeScript
        | Language::Java
        | Language::Kotlin
        | Language::Swift => Some(Convention::LowerCamel),
        Language::CSharp => Some(Convention::UpperCamel),
        Language::Go => Some(Convention::MixedCaps),
        _ => None,
    }
}

/// `Some(suggestion)` when `name` breaks `convention`.
fn naming_violation(name: &str, convention: Convention) -> Option<String> {
    let core = name.trim_matches(|c: char| c == '_' || c == '$');
    if core.is_empty() || core.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
        // SCREAMING or non-alphabetic names are constants or operators.
        return None;
    }
    let starts_upper = core.chars().next().is_some_and(char::is_uppercase);
    let (broken, suggestion) = match convention {
        Convention::Snake => (core.chars().any(char::is_uppercase), core.to_snake_case()),
        Convention::LowerCamel => (
            core.contains('_') || starts_upper,
            core.to_lower_camel_case(),
        ),
        Convention::UpperCamel => (
            core.contains('_') || !starts_upper,
            core.to_upper_camel_case(),
        ),
        Convention::MixedCaps => {
            let suggestion = if starts_upper {
                core.to_upper_camel_case()
            } else {
                core.to_lower_camel_case()
            };
            (core.contains('_'), suggestion)
        }
    };
    (broken && suggestion != core).then_some(suggestion)
}

fn type_violation(name: &str) -> Option<String> {
    let core = name.trim_start_matches('_');
    let starts_lower = core.chars().next().is_some_and(char::is_lowercase);
    let broken = core.contains('_') || starts_lower;
    let suggestion = core.to_upper_camel_case();
    (broken && !core.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) && suggestion != core)
        .then_some(suggestion)
}

fn convention_label(convention: Convention) -> &'static str {
    match convention {
        Convention::Snake => "snake_case",
        Convention::LowerCamel => "lowerCamelCase",
        Convention::UpperCamel => "PascalCase",
        Convention::MixedCaps => "MixedCaps",
    }
}

/// Consecutive line numbers collapsed into ranges.
fn runs(lines: &[u32]) -> Vec<LineRange> {
    let mut out: Vec<LineRange> = Vec::new();
    for &n in lines {
        match out.last_mut() {
            Some(range) if range.end + 1 == n => range.end = n,
            _ => out.push(LineRange::line(n)),
        }
    }
    out
}

/// Line length, whitespace hygiene and naming conventions.
pub struct StyleDetector;

impl StyleDetector {
    fn whitespace(&self, ctx: &FileContext<'_>, findings: &mut Vec<Finding>) {
        let mut trailing = Vec::new();
        let mut mixed = Vec::new();
        let mut tab_led = Vec::new();
        let mut space_led = Vec::new();

        for line in &ctx.stream.lines {
            if line.raw.ends_with([' ', '\t']) {
                trailing.push(line.number);
            }
            if line.is_blank || line.is_comment_only {
                continue;
            }
            let indent: String = line.raw.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if indent.contains(' ') && indent.contains('\t') {
                mixed.push(line.number);
            } else if indent.starts_with('\t') {
                tab_led.push(line.number);
            } else if indent.starts_with(' ') {
                space_led.push(line.number);
            }
        }

        for range in runs(&trailing) {
            findings.push(Finding::new(
                "style/trailing-whitespace",
                Category::Style,
                Severity::Info,
                ctx.path,
                range,
                "trailing whitespace",
            ));
        }
        for range in runs(&mixed) {
            findings.push(Finding::new(
                "style/mixed-indentation",
                Category::Style,
                Severity::Info,
                ctx.path,
                range,
                "indentation mixes tabs and spaces",
            ));
        }
        if !tab_led.is_empty() && !space_led.is_empty() {
            let (minority, label) = if tab_led.len() < space_led.len() {
                (&tab_led, "tabs")
            } else {
                (&space_led, "spaces")
            };
            findings.push(Finding::new(
                "style/mixed-indentation",
                Category::Style,
                Severity::Info,
                ctx.path,
                LineRange::line(minority[0]),
                format!(
                    "file indents {} lines with tabs and {} with spaces; {} lines use {label}",
                    tab_led.len(),
                    space_led.len(),
                    minority.len()
                ),
            ));
        }
    }

    fn naming(&self, ctx: &FileContext<'_>, findings: &mut Vec<Finding>) {
        if let Some(convention) = function_convention(ctx.language) {
            for unit in &ctx.metrics.functions {
                if let Some(suggestion) = naming_violation(&unit.name, convention) {
                    findings.push(Finding::new(
                        "style/naming",
                        Category::Style,
                        Severity::Info,
                        ctx.path,
                        LineRange::line(unit.start_line),
                        format!(
                            "function `{}` is not {}; consider `{suggestion}`",
                            unit.name,
                            convention_label(convention)
                        ),
                    ));
                }
            }
        }

        // C structs are conventionally snake_case; Go types use `type X struct`.
        if matches!(ctx.language, Language::C | Language::Cpp | Language::Go) {
            return;
        }
        for line in &ctx.stream.lines {
            let Some(caps) = TYPE_DECL_RE.captures(&line.masked) else {
                continue;
            };
            let name = &caps[1];
            if let Some(suggestion) = type_violation(name) {
                findings.push(Finding::new(
                    "style/naming",
                    Category::Style,
                    Severity::Info,
                    ctx.path,
                    LineRange::line(line.number),
                    format!("type `{name}` is not PascalCase; consider `{suggestion}`"),
                ));
            }
        }
    }
}

impl Detector for StyleDetector {
    fn id(&self) -> &'static str {
        "style"
    }

    /// Line length and whitespace apply to any text file.
    fn applies_to(&self, _language: Language) -> bool {
        true
    }

    fn rule_ids(&self) -> Vec<String> {
        vec![
            "style/line-length".into(),
            "style/trailing-whitespace".into(),
            "style/mixed-indentation".into(),
            "style/naming".into(),
        ]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let limit = ctx.config.thresholds.style_line_length;
        let mut findings = Vec::new();

        for line in &ctx.stream.lines {
            let width = line.raw.graphemes(true).count();
            if let Some(severity) = ctx.config.severity.classify(width, limit) {
                findings.push(Finding::new(
                    "style/line-length",
                    Category::Style,
                    severity,
                    ctx.path,
                    LineRange::line(line.number),
                    format!("line is {width} characters long (limit {limit})"),
                ));
            }
        }

        self.whitespace(ctx, &mut findings);
        if ctx.language.is_known() {
            self.naming(ctx, &mut findings);
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

    fn run(text: &str, language: Language, config: &Config) -> Vec<Finding> {
        let stream = normalize(text, language);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "style",
            language,
            stream: &stream,
            metrics: &metrics,
            config,
        };
        let mut findings = StyleDetector.detect(&ctx).unwrap();
        findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        findings
    }

    #[test]
    fn line_length_counts_graphemes() {
        let mut config = Config::default();
        config.thresholds.style_line_length = 4;
        // Four user-perceived characters, more than four bytes and chars.
        let findings = run("e\u{301}e\u{301}e\u{301}e\u{301}\nabcdef\n", Language::Unknown, &config);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].range, LineRange::line(2));
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn trailing_whitespace_groups_runs() {
        let findings = run("a = 1  \nb = 2\t\nc = 3\nd = 4 \n", Language::Python, &Config::default());
        let ranges: Vec<_> = findings
            .iter()
            .filter(|f| f.detector == "style/trailing-whitespace")
            .map(|f| f.range)
            .collect();
        assert_eq!(ranges, vec![LineRange::new(1, 2), LineRange::line(4)]);
    }

    #[test]
    fn mixed_indentation_per_line_and_file() {
        let src = "def f():\n\tx = 1\n\t y = 2\n    return x\n";
        let findings = run(src, Language::Python, &Config::default());
        let mixed: Vec<_> = findings
            .iter()
            .filter(|f| f.detector == "style/mixed-indentation")
            .collect();
        assert_eq!(mixed.len(), 2);
        assert_eq!(mixed[0].range, LineRange::line(3));
        // One tab-led line against one space-led line: the space-led one is reported.
        assert_eq!(mixed[1].range, LineRange::line(4));
    }

    #[test]
    fn naming_suggestions() {
        let findings = run("fn parseInput(raw: &str) {\n    let _ = raw;\n}\n", Language::Rust, &Config::default());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("`parse_input`"));

        let findings = run(
            "class user_account {\n  load_all() {\n    return 1;\n  }\n}\n",
            Language::JavaScript,
            &Config::default(),
        );
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("`UserAccount`")));
    }

    #[test]
    fn conventions_accept_idiomatic_names() {
        assert_eq!(naming_violation("__init__", Convention::Snake), None);
        assert_eq!(naming_violation("MAX_SIZE", Convention::LowerCamel), None);
        assert_eq!(naming_violation("loadAll", Convention::LowerCamel), None);
        assert_eq!(naming_violation("ServeHTTP", Convention::MixedCaps), None);
        assert_eq!(
            naming_violation("get_user", Convention::UpperCamel).as_deref(),
            Some("GetUser")
        );
        assert_eq!(type_violation("HttpServer"), None);
    }
}
