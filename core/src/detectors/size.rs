use crate::error::DetectorError;
use crate::language::Language;
use crate::report::{Category, Finding, LineRange};

use super::{Detector, FileContext};

/// Long functions, long files and long parameter lists.
pub struct SizeDetector;

impl Detector for SizeDetector {
    fn id(&self) -> &'static str {
        "size"
    }

    /// `size/long-file` is purely line based, so unknown files are measured too.
    fn applies_to(&self, _language: Language) -> bool {
        true
    }

    fn rule_ids(&self) -> Vec<String> {
        vec![
            "size/long-function".into(),
            "size/long-file".into(),
            "size/too-many-parameters".into(),
        ]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let thresholds = &ctx.config.thresholds;
        let scale = &ctx.config.severity;
        let mut findings = Vec::new();

        let total = ctx.metrics.total_lines as usize;
        if let Some(severity) = scale.classify(total, thresholds.long_file_lines) {
            findings.push(Finding::new(
                "size/long-file",
                Category::Size,
                severity,
                ctx.path,
                LineRange::new(1, ctx.metrics.total_lines),
                format!(
                    "file has {total} lines (threshold {}); consider splitting it by responsibility",
                    thresholds.long_file_lines
                ),
            ));
        }

        for unit in &ctx.metrics.functions {
            let lines = unit.line_count();
            if let Some(severity) = scale.classify(lines, thresholds.long_function_lines) {
                findings.push(Finding::new(
                    "size/long-function",
                    Category::Size,
                    severity,
                    ctx.path,
                    unit.range(),
                    format!(
                        "`{}` spans {lines} lines (threshold {})",
                        unit.name, thresholds.long_function_lines
                    ),
                ));
            }
            if let Some(severity) = scale.classify(unit.parameter_count, thresholds.max_parameters)
            {
                findings.push(Finding::new(
                    "size/too-many-parameters",
                    Category::Size,
                    severity,
                    ctx.path,
                    LineRange::line(unit.start_line),
                    format!(
                        "`{}` takes {} parameters (threshold {}); group related values into a type",
                        unit.name, unit.parameter_count, thresholds.max_parameters
                    ),
                ));
            }
        }
        Ok(findings)
    }
}

/// Functions whose decision-point count exceeds `max_complexity`.
pub struct ComplexityDetector;

impl Detector for ComplexityDetector {
    fn id(&self) -> &'static str {
        "complexity"
    }

    /// Complexity is a keyword count, not a control-flow measurement.
    fn base_confidence(&self) -> f64 {
        0.8
    }

    fn rule_ids(&self) -> Vec<String> {
        vec!["complexity/high-complexity".into()]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let max = ctx.config.thresholds.max_complexity;
        Ok(ctx
            .metrics
            .functions
            .iter()
            .filter_map(|unit| {
                let severity = ctx.config.severity.classify(unit.complexity, max)?;
                Some(Finding::new(
                    "complexity/high-complexity",
                    Category::Complexity,
                    severity,
                    ctx.path,
                    unit.range(),
                    format!(
                        "`{}` has complexity {} (threshold {max})",
                        unit.name, unit.complexity
                    ),
                ))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::extract;
    use crate::normalize::normalize;
    use crate::report::Severity;

    fn run(detector: &dyn Detector, text: &str, language: Language, config: &Config) -> Vec<Finding> {
        let stream = normalize(text, language);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "src/lib.rs",
            language,
            stream: &stream,
            metrics: &metrics,
            config,
        };
        detector.detect(&ctx).unwrap()
    }

    #[test]
    fn long_function_and_parameters() {
        let mut config = Config::default();
        config.thresholds.long_function_lines = 4;
        config.thresholds.max_parameters = 2;
        let src = "fn big(a: u8, b: u8, c: u8, d: u8) {\n    let x = 1;\n    let y = 2;\n    let z = 3;\n    let w = 4;\n}\n";
        let findings = run(&SizeDetector, src, Language::Rust, &config);
        let ids: Vec<_> = findings.iter().map(|f| f.detector.as_str()).collect();
        assert_eq!(ids, vec!["size/long-function", "size/too-many-parameters"]);
        assert_eq!(findings[0].range, LineRange::new(1, 6));
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[1].severity, Severity::Critical);
    }

    #[test]
    fn long_unknown_files_are_measured() {
        let mut config = Config::default();
        config.thresholds.long_file_lines = 3;
        let findings = run(&SizeDetector, "a\nb\nc\nd\n", Language::Unknown, &config);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "size/long-file");
        assert_eq!(findings[0].range, LineRange::new(1, 4));
    }

    #[test]
    fn complexity_over_threshold() {
        let mut config = Config::default();
        config.thresholds.max_complexity = 2;
        let src = "def f(a, b):\n    if a and b:\n        return 1\n    return 2\n";
        let findings = run(&ComplexityDetector, src, Language::Python, &config);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("complexity 3"));
    }
}
