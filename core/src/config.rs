//! Engine configuration. Every field has a default so a partial YAML/JSON document is enough.

use std::collections::BTreeMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::language::Language;
use crate::report::Severity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub severity: SeverityScale,
    pub detectors: DetectorToggles,
    pub security_rules: Vec<PatternRuleConfig>,
    pub ignore_globs: Vec<String>,
    pub max_file_bytes: u64,
    pub unreliable_confidence_factor: f64,
    pub emit_duplicate_findings: bool,
    pub debt: DebtWeights,
    pub exit_policy: ExitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            severity: SeverityScale::default(),
            detectors: DetectorToggles::default(),
            security_rules: Vec::new(),
            ignore_globs: Vec::new(),
            max_file_bytes: 2 * 1024 * 1024,
            unreliable_confidence_factor: 0.75,
            emit_duplicate_findings: true,
            debt: DebtWeights::default(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

/// Numeric limits used by the detectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub long_function_lines: usize,
    pub long_file_lines: usize,
    pub max_nesting_depth: usize,
    pub max_parameters: usize,
    pub max_complexity: usize,
    pub duplicate_window_size: usize,
    pub duplicate_min_merged_length: usize,
    pub duplicate_min_similarity: f64,
    pub duplicate_max_postings: usize,
    pub style_line_length: usize,
    pub trivial_max_statements: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            long_function_lines: 50,
            long_file_lines: 1000,
            max_nesting_depth: 4,
            max_parameters: 5,
            max_complexity: 10,
            duplicate_window_size: 5,
            duplicate_min_merged_length: 5,
            duplicate_min_similarity: 0.5,
            duplicate_max_postings: 64,
            style_line_length: 120,
            trivial_max_statements: 1,
        }
    }
}

/// Maps "how far past the threshold" onto a severity.
///
/// A value over its threshold is `info`; at `warning_ratio` times the threshold it becomes a
/// `warning` and at `critical_ratio` times it becomes `critical`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeverityScale {
    pub warning_ratio: f64,
    pub critical_ratio: f64,
}

impl Default for SeverityScale {
    fn default() -> Self {
        Self {
            warning_ratio: 1.25,
            critical_ratio: 2.0,
        }
    }
}

impl SeverityScale {
    /// `None` while `value` is within `threshold`.
    pub fn classify(&self, value: usize, threshold: usize) -> Option<Severity> {
        if value <= threshold {
            return None;
        }
        let value = value as f64;
        let threshold = threshold as f64;
        if value >= threshold * self.critical_ratio {
            Some(Severity::Critical)
        } else if value >= threshold * self.warning_ratio {
            Some(Severity::Warning)
        } else {
            Some(Severity::Info)
        }
    }
}

/// Detector enable/disable switches.
///
/// Entries are detector ids (`style/line-length`) or whole families (`style`). A language's
/// `enable` list overrides both disable lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DetectorToggles {
    pub disable: Vec<String>,
    pub languages: BTreeMap<String, LanguageToggles>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LanguageToggles {
    pub disable: Vec<String>,
    pub enable: Vec<String>,
}

impl DetectorToggles {
    pub fn is_enabled(&self, detector: &str, language: Language) -> bool {
        let per_lang = self
            .languages
            .iter()
            .find(|(name, _)| Language::parse(name) == Some(language))
            .map(|(_, toggles)| toggles);
        if let Some(toggles) = per_lang {
            if toggles.enable.iter().any(|e| toggle_matches(e, detector)) {
                return true;
            }
            if toggles.disable.iter().any(|e| toggle_matches(e, detector)) {
                return false;
            }
        }
        !self.disable.iter().any(|e| toggle_matches(e, detector))
    }

    /// Every id or family named anywhere in the toggles.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &str> {
        self.disable.iter().map(String::as_str).chain(
            self.languages
                .values()
                .flat_map(|t| t.disable.iter().chain(t.enable.iter()))
                .map(String::as_str),
        )
    }
}

pub(crate) fn toggle_matches(entry: &str, detector: &str) -> bool {
    let entry = entry.trim().trim_end_matches("/*");
    detector == entry
        || detector
            .strip_prefix(entry)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// A user supplied security pattern, compiled next to the built-in catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternRuleConfig {
    pub id: String,
    pub pattern: String,
    pub message: String,
    pub severity: Severity,
    /// Empty means every known language.
    pub languages: Vec<Language>,
    pub case_insensitive: bool,
}

impl Default for PatternRuleConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            pattern: String::new(),
            message: String::new(),
            severity: Severity::Warning,
            languages: Vec::new(),
            case_insensitive: false,
        }
    }
}

/// Hours of remediation charged per finding when estimating technical debt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebtWeights {
    pub critical_hours: f64,
    pub warning_hours: f64,
    pub info_hours: f64,
    pub security_multiplier: f64,
    pub duplicate_group_hours: f64,
}

impl Default for DebtWeights {
    fn default() -> Self {
        Self {
            critical_hours: 8.0,
            warning_hours: 4.0,
            info_hours: 1.0,
            security_multiplier: 1.5,
            duplicate_group_hours: 3.0,
        }
    }
}

impl DebtWeights {
    pub fn hours_for(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical_hours,
            Severity::Warning => self.warning_hours,
            Severity::Info => self.info_hours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExitPolicy {
    pub fail_on: Severity,
    pub exit_code: i32,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            fail_on: Severity::Critical,
            exit_code: 1,
        }
    }
}

impl Config {
    /// Check every numeric field and compile every user pattern once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        positive("thresholds.long_function_lines", t.long_function_lines)?;
        positive("thresholds.long_file_lines", t.long_file_lines)?;
        positive("thresholds.max_nesting_depth", t.max_nesting_depth)?;
        positive("thresholds.max_parameters", t.max_parameters)?;
        positive("thresholds.max_complexity", t.max_complexity)?;
        positive("thresholds.duplicate_window_size", t.duplicate_window_size)?;
        positive("thresholds.style_line_length", t.style_line_length)?;
        if t.duplicate_min_merged_length < t.duplicate_window_size {
            return Err(ConfigError::InvalidThreshold {
                name: "thresholds.duplicate_min_merged_length",
                value: t.duplicate_min_merged_length.to_string(),
                reason: "must be at least duplicate_window_size",
            });
        }
        if t.duplicate_max_postings < 2 {
            return Err(ConfigError::InvalidThreshold {
                name: "thresholds.duplicate_max_postings",
                value: t.duplicate_max_postings.to_string(),
                reason: "must be at least 2",
            });
        }
        probability("thresholds.duplicate_min_similarity", t.duplicate_min_similarity)?;
        probability(
            "unreliable_confidence_factor",
            self.unreliable_confidence_factor,
        )?;

        let s = &self.severity;
        if !s.warning_ratio.is_finite() || s.warning_ratio < 1.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "severity.warning_ratio",
                value: s.warning_ratio.to_string(),
                reason: "must be a finite number >= 1",
            });
        }
        if !s.critical_ratio.is_finite() || s.critical_ratio < s.warning_ratio {
            return Err(ConfigError::InvalidThreshold {
                name: "severity.critical_ratio",
                value: s.critical_ratio.to_string(),
                reason: "must be a finite number >= warning_ratio",
            });
        }

        if self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "max_file_bytes",
                value: "0".into(),
                reason: "must be positive",
            });
        }

        let d = &self.debt;
        for (name, value) in [
            ("debt.critical_hours", d.critical_hours),
            ("debt.warning_hours", d.warning_hours),
            ("debt.info_hours", d.info_hours),
            ("debt.security_multiplier", d.security_multiplier),
            ("debt.duplicate_group_hours", d.duplicate_group_hours),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    name,
                    value: value.to_string(),
                    reason: "must be a finite, non-negative number",
                });
            }
        }

        for name in self.detectors.languages.keys() {
            if Language::parse(name).is_none() {
                return Err(ConfigError::UnknownLanguage(name.clone()));
            }
        }

        for rule in &self.security_rules {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::InvalidThreshold {
                    name: "security_rules.id",
                    value: format!("{:?}", rule.id),
                    reason: "must not be empty",
                });
            }
            RegexBuilder::new(&rule.pattern)
                .case_insensitive(rule.case_insensitive)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    rule: rule.id.clone(),
                    source,
                })?;
        }

        build_ignore_set(&self.ignore_globs)?;
        Ok(())
    }
}

fn positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidThreshold {
            name,
            value: value.to_string(),
            reason: "must be positive",
        });
    }
    Ok(())
}

fn probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold {
            name,
            value: value.to_string(),
            reason: "must be within [0, 1]",
        });
    }
    Ok(())
}

pub fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|source| ConfigError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn severity_scale_bands() {
        let scale = SeverityScale::default();
        assert_eq!(scale.classify(4, 4), None);
        assert_eq!(scale.classify(5, 4), Some(Severity::Warning));
        assert_eq!(scale.classify(51, 50), Some(Severity::Info));
        assert_eq!(scale.classify(63, 50), Some(Severity::Warning));
        assert_eq!(scale.classify(100, 50), Some(Severity::Critical));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = Config::default();
        config.thresholds.duplicate_min_similarity = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let mut config = Config::default();
        config.severity.critical_ratio = 1.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thresholds.max_nesting_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_patterns_and_globs() {
        let mut config = Config::default();
        config.security_rules.push(PatternRuleConfig {
            id: "broken".into(),
            pattern: "(unclosed".into(),
            ..PatternRuleConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));

        let mut config = Config::default();
        config.ignore_globs.push("a[".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn language_toggles_override_global_disable() {
        let mut toggles = DetectorToggles::default();
        toggles.disable.push("style".into());
        toggles.languages.insert(
            "python".into(),
            LanguageToggles {
                disable: vec!["security/eval-of-input".into()],
                enable: vec!["style/naming".into()],
            },
        );
        assert!(!toggles.is_enabled("style/line-length", Language::Rust));
        assert!(toggles.is_enabled("style/naming", Language::Python));
        assert!(!toggles.is_enabled("style/line-length", Language::Python));
        assert!(!toggles.is_enabled("security/eval-of-input", Language::Python));
        assert!(toggles.is_enabled("security/eval-of-input", Language::JavaScript));
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"thresholds": {"max_nesting_depth": 3}}"#).unwrap();
        assert_eq!(config.thresholds.max_nesting_depth, 3);
        assert_eq!(config.thresholds.long_function_lines, 50);
        assert_eq!(config.exit_policy.fail_on, Severity::Critical);
    }
}
