//! Detector registry.
//!
//! Each detector is an independent pass over one file's [`FileContext`]. The registry runs them in
//! a fixed order, filters them through the configured toggles and contains failures: an error or
//! a panic inside one detector becomes a [`RunWarning`] and the other detectors still run.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::config::{toggle_matches, Config};
use crate::error::{ConfigError, DetectorError};
use crate::language::Language;
use crate::metrics::FileMetrics;
use crate::normalize::NormalizedStream;
use crate::report::{Finding, RunWarning};

mod antipattern;
mod comments;
mod nesting;
mod performance;
mod security;
mod size;
mod style;
mod trivial;

pub use antipattern::AntiPatternDetector;
pub use comments::CommentsDetector;
pub use nesting::NestingDetector;
pub use performance::PerformanceDetector;
pub use security::{SecurityDetector, SecurityRule};
pub use size::{ComplexityDetector, SizeDetector};
pub use style::StyleDetector;
pub use trivial::TrivialDetector;

/// Everything a detector may look at for one file.
pub struct FileContext<'a> {
    pub path: &'a str,
    pub language: Language,
    pub stream: &'a NormalizedStream,
    pub metrics: &'a FileMetrics,
    pub config: &'a Config,
}

pub trait Detector: Send + Sync {
    /// Family id; emitted findings use `<id>/<rule>`.
    fn id(&self) -> &'static str;

    /// Multiplied into every finding's confidence.
    fn base_confidence(&self) -> f64 {
        1.0
    }

    fn applies_to(&self, language: Language) -> bool {
        language.is_known()
    }

    /// Detectors that read comment text are skipped on streams without lexical rules.
    fn needs_comments(&self) -> bool {
        false
    }

    /// Every rule id this detector can emit.
    fn rule_ids(&self) -> Vec<String>;

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError>;
}

/// Ids emitted by the cross-file stages rather than by registry detectors.
pub const CROSS_FILE_IDS: &[&str] = &[
    "duplication/block",
    "dependency/cycle",
    "dependency/unresolved-import",
    "advisory",
];

pub struct Registry {
    detectors: Vec<Box<dyn Detector>>,
}

impl Registry {
    /// The built-in detector set, validated against the toggles in `config`.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(SizeDetector),
            Box::new(ComplexityDetector),
            Box::new(NestingDetector),
            Box::new(SecurityDetector::new(&config.security_rules)?),
            Box::new(PerformanceDetector),
            Box::new(StyleDetector),
            Box::new(TrivialDetector),
            Box::new(CommentsDetector::new()),
            Box::new(AntiPatternDetector),
        ];
        let registry = Self { detectors };
        registry.validate_toggles(config)?;
        Ok(registry)
    }

    /// Build a registry from an explicit detector list.
    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .detectors
            .iter()
            .flat_map(|d| d.rule_ids())
            .chain(CROSS_FILE_IDS.iter().map(|s| s.to_string()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn validate_toggles(&self, config: &Config) -> Result<(), ConfigError> {
        let known = self.known_ids();
        for entry in config.detectors.referenced_ids() {
            // Advisory ids come from the feed and cannot be known up front.
            let matched = entry.starts_with("advisory/")
                || known
                    .iter()
                    .any(|id| toggle_matches(entry, id) || toggle_matches(entry, id_family(id)));
            if !matched {
                return Err(ConfigError::UnknownDetector(entry.to_string()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every applicable detector over one file.
    pub fn run(&self, ctx: &FileContext<'_>) -> (Vec<Finding>, Vec<RunWarning>) {
        let toggles = &ctx.config.detectors;
        let mut findings = Vec::new();
        let mut warnings = Vec::new();

        for detector in &self.detectors {
            if !detector.applies_to(ctx.language)
                || (detector.needs_comments() && !ctx.stream.comment_aware)
            {
                continue;
            }
            let id = detector.id();
            let enabled = detector
                .rule_ids()
                .iter()
                .any(|rule| toggles.is_enabled(rule, ctx.language));
            if !enabled {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(ctx)))
                .unwrap_or_else(|payload| Err(DetectorError::Panicked(panic_message(&*payload))));

            match outcome {
                Ok(found) => {
                    let base = detector.base_confidence();
                    for mut finding in found {
                        if !toggles.is_enabled(&finding.detector, ctx.language) {
                            continue;
                        }
                        finding.confidence = (finding.confidence * base).clamp(0.0, 1.0);
                        findings.push(finding);
                    }
                }
                Err(err) => {
                    warn!(detector = id, path = ctx.path, error = %err, "detector failed");
                    warnings.push(RunWarning {
                        detector: Some(id.to_string()),
                        path: Some(ctx.path.to_string()),
                        message: err.to_string(),
                    });
                }
            }
        }
        (findings, warnings)
    }
}

fn id_family(id: &str) -> &str {
    id.split('/').next().unwrap_or(id)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::extract;
    use crate::normalize::normalize;
    use crate::report::{Category, LineRange, Severity};

    struct Exploding;

    impl Detector for Exploding {
        fn id(&self) -> &'static str {
            "explode"
        }
        fn rule_ids(&self) -> Vec<String> {
            vec!["explode/boom".into()]
        }
        fn detect(&self, _ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
            panic!("boom");
        }
    }

    struct Failing;

    impl Detector for Failing {
        fn id(&self) -> &'static str {
            "fail"
        }
        fn rule_ids(&self) -> Vec<String> {
            vec!["fail/always".into()]
        }
        fn detect(&self, _ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
            Err(DetectorError::Internal("no luck".into()))
        }
    }

    struct Constant;

    impl Detector for Constant {
        fn id(&self) -> &'static str {
            "constant"
        }
        fn base_confidence(&self) -> f64 {
            0.5
        }
        fn rule_ids(&self) -> Vec<String> {
            vec!["constant/one".into()]
        }
        fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
            Ok(vec![Finding::new(
                "constant/one",
                Category::Style,
                Severity::Info,
                ctx.path,
                LineRange::line(1),
                "always",
            )])
        }
    }

    #[test]
    fn failures_are_contained() {
        let config = Config::default();
        let stream = normalize("fn main() {}\n", Language::Rust);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "src/main.rs",
            language: Language::Rust,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        let registry = Registry::with_detectors(vec![
            Box::new(Exploding),
            Box::new(Failing),
            Box::new(Constant),
        ]);
        let (findings, warnings) = registry.run(&ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, 0.5);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].detector.as_deref(), Some("explode"));
        assert!(warnings[0].message.contains("boom"));
        assert_eq!(warnings[1].message, "no luck");
    }

    #[test]
    fn unknown_toggle_ids_are_rejected() {
        let mut config = Config::default();
        config.detectors.disable.push("style/line-length".into());
        config.detectors.disable.push("security".into());
        config.detectors.disable.push("duplication".into());
        assert!(Registry::new(&config).is_ok());

        config.detectors.disable.push("style/no-such-rule".into());
        assert!(matches!(
            Registry::new(&config),
            Err(ConfigError::UnknownDetector(id)) if id == "style/no-such-rule"
        ));
    }

    #[test]
    fn disabled_rules_are_filtered() {
        let mut config = Config::default();
        config.detectors.disable.push("constant/one".into());
        let stream = normalize("x\n", Language::Rust);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "a.rs",
            language: Language::Rust,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        let registry = Registry::with_detectors(vec![Box::new(Constant)]);
        let (findings, warnings) = registry.run(&ctx);
        assert!(findings.is_empty());
        assert!(warnings.is_empty());
    }
}
