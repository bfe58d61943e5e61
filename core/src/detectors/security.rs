//! Regex catalog of insecure constructs.
//!
//! Patterns run over comment-stripped code with string literals intact, since credentials and
//! SQL fragments live inside strings. The matched text becomes the finding's snippet.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::config::PatternRuleConfig;
use crate::error::{ConfigError, DetectorError};
use crate::language::Language;
use crate::report::{Category, Finding, LineRange, Severity};

use super::{Detector, FileContext};

/// One compiled catalog entry. Several entries may share an id.
pub struct SecurityRule {
    pub id: String,
    /// Empty means every known language.
    pub languages: Vec<Language>,
    pub regex: Regex,
    pub severity: Severity,
    pub message: String,
}

impl SecurityRule {
    fn applies_to(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }
}

use Language::*;

const SCRIPTING: &[Language] = &[Python, JavaScript, TypeScript, Php, Ruby];
const WEB: &[Language] = &[JavaScript, TypeScript, Html, Php];

struct Builtin {
    id: &'static str,
    languages: &'static [Language],
    pattern: &'static str,
    severity: Severity,
    message: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "command-exec",
        languages: &[Python],
        pattern: r"\bos\.(?:system|popen)\s*\(|\bsubprocess\.\w+\s*\([^)]*shell\s*=\s*True|\bcommands\.getoutput\s*\(",
        severity: Severity::Warning,
        message: "shell command execution; pass an argument list instead of a shell string",
    },
    Builtin {
        id: "command-exec",
        languages: &[JavaScript, TypeScript],
        pattern: r"\bchild_process\.(?:exec|execSync|spawn|spawnSync|execFile)\s*\(|\bexecSync\s*\(",
        severity: Severity::Warning,
        message: "child process execution; validate every argument that reaches the command",
    },
    Builtin {
        id: "command-exec",
        languages: &[Php],
        pattern: r"\b(?:shell_exec|exec|system|passthru|popen|proc_open)\s*\(",
        severity: Severity::Warning,
        message: "shell command execution",
    },
    Builtin {
        id: "command-exec",
        languages: &[Ruby],
        pattern: r"\b(?:system|exec|spawn)\s*\(|\bIO\.popen\b|%x[({\[]",
        severity: Severity::Warning,
        message: "shell command execution",
    },
    Builtin {
        id: "command-exec",
        languages: &[Java, Kotlin],
        pattern: r"Runtime\.getRuntime\(\)\.exec\s*\(|\bProcessBuilder\s*\(",
        severity: Severity::Warning,
        message: "process execution; validate every argument that reaches the command",
    },
    Builtin {
        id: "command-exec",
        languages: &[C, Cpp],
        pattern: r"\b(?:system|popen|execl|execlp|execv|execvp)\s*\(",
        severity: Severity::Warning,
        message: "process execution through the C library",
    },
    Builtin {
        id: "command-exec",
        languages: &[Go],
        pattern: r#"\bexec\.Command\s*\(\s*"(?:sh|bash|cmd|powershell)""#,
        severity: Severity::Warning,
        message: "command executed through a shell",
    },
    Builtin {
        id: "command-exec",
        languages: &[Rust],
        pattern: r#"\bCommand::new\s*\(\s*"(?:sh|bash|cmd|powershell)(?:\.exe)?""#,
        severity: Severity::Warning,
        message: "command executed through a shell",
    },
    Builtin {
        id: "command-exec",
        languages: &[CSharp],
        pattern: r"\bProcess\.Start\s*\(",
        severity: Severity::Warning,
        message: "process execution",
    },
    Builtin {
        id: "hardcoded-credential",
        languages: &[],
        pattern: r#"(?i)\b(?:password|passwd|pwd|secret|api_?key|apikey|access_?token|auth_?token|private_?key)\b["']?\s*(?::|=|:=|=>)\s*["'][^"'\s]{4,}["']"#,
        severity: Severity::Critical,
        message: "hard-coded credential; load secrets from the environment or a secret store",
    },
    Builtin {
        id: "hardcoded-credential",
        languages: &[],
        pattern: r"\bAKIA[0-9A-Z]{16}\b",
        severity: Severity::Critical,
        message: "hard-coded AWS access key id",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Python],
        pattern: r"\bverify\s*=\s*False\b|ssl\._create_unverified_context\s*\(|\bCERT_NONE\b",
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[JavaScript, TypeScript],
        pattern: r#"\brejectUnauthorized\s*:\s*false\b|NODE_TLS_REJECT_UNAUTHORIZED\s*=\s*['"]?0"#,
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Go],
        pattern: r"\bInsecureSkipVerify\s*:\s*true\b",
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Rust],
        pattern: r"\bdanger_accept_invalid_(?:certs|hostnames)\s*\(\s*true\s*\)",
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Java, Kotlin, CSharp],
        pattern: r"\bALLOW_ALL_HOSTNAME_VERIFIER\b|\bServerCertificateValidationCallback\s*=.*=>\s*true|\bTrustAllCerts\b",
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Php],
        pattern: r"CURLOPT_SSL_VERIFY(?:PEER|HOST)\s*,\s*(?:false|0)\b",
        severity: Severity::Critical,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "disabled-certificate-validation",
        languages: &[Shell],
        pattern: r"\bcurl\b.*\s(?:-k|--insecure)\b|\bwget\b.*--no-check-certificate",
        severity: Severity::Warning,
        message: "TLS certificate validation disabled",
    },
    Builtin {
        id: "sql-concatenation",
        languages: &[],
        pattern: r#"(?i)["'`](?:select\b[^"'`]*\bfrom|insert\s+into|update\b[^"'`]*\bset|delete\s+from)\b[^"'`]*["'`]\s*(?:\+|\.\s*\$|%\s*[\w(])"#,
        severity: Severity::Critical,
        message: "SQL built by string concatenation; use parameterised queries",
    },
    Builtin {
        id: "sql-concatenation",
        languages: &[Python],
        pattern: r#"(?i)\bf["'](?:select|insert\s+into|update|delete\s+from)\b[^"']*\{|(?i)["'](?:select|insert|update|delete)\b[^"']*["']\s*\.format\s*\("#,
        severity: Severity::Critical,
        message: "SQL built by string formatting; use parameterised queries",
    },
    Builtin {
        id: "sql-concatenation",
        languages: &[JavaScript, TypeScript],
        pattern: r"(?i)`(?:select|insert\s+into|update|delete\s+from)\b[^`]*\$\{",
        severity: Severity::Critical,
        message: "SQL built by template interpolation; use parameterised queries",
    },
    Builtin {
        id: "dom-xss",
        languages: WEB,
        pattern: r"\.(?:innerHTML|outerHTML)\s*=[^=]|\bdocument\.write(?:ln)?\s*\(|\binsertAdjacentHTML\s*\(|\bdangerouslySetInnerHTML\b",
        severity: Severity::Warning,
        message: "HTML sink that can execute injected markup; prefer textContent or sanitise first",
    },
    Builtin {
        id: "eval-of-input",
        languages: SCRIPTING,
        pattern: r"\b(?:eval|exec|Function)\s*\([^)]*\b(?:input|raw_input|request|req|argv|params|query|body|location|stdin|cookie)\b",
        severity: Severity::Critical,
        message: "evaluates data that comes from user input",
    },
    Builtin {
        id: "eval-of-input",
        languages: &[Shell],
        pattern: r#"\beval\s+["']?\$"#,
        severity: Severity::Warning,
        message: "evaluates the contents of a variable",
    },
    Builtin {
        id: "weak-hash",
        languages: &[],
        pattern: r#"\bhashlib\.(?:md5|sha1)\b|MessageDigest\.getInstance\(\s*"(?:MD5|SHA-?1)"|createHash\(\s*['"](?:md5|sha1)['"]|\b(?:MD5|SHA1)\.Create\s*\(|"crypto/(?:md5|sha1)"|\b(?:Md5|Sha1)::new\s*\(|\b(?:md5|sha1)\s*\("#,
        severity: Severity::Warning,
        message: "MD5/SHA-1 are broken for security purposes; use SHA-256 or a password hash",
    },
    Builtin {
        id: "insecure-deserialization",
        languages: &[Python, Java, Php, Ruby],
        pattern: r"\bpickle\.loads?\s*\(|\bmarshal\.loads?\s*\(|\bObjectInputStream\s*\(|\bunserialize\s*\(|\bMarshal\.load\s*\(",
        severity: Severity::Warning,
        message: "deserialising untrusted data can execute code",
    },
];

static COMPILED_BUILTINS: Lazy<Vec<(&'static Builtin, Regex)>> = Lazy::new(|| {
    BUILTINS
        .iter()
        .map(|b| (b, Regex::new(b.pattern).expect("static security pattern")))
        .collect()
});

pub struct SecurityDetector {
    rules: Vec<SecurityRule>,
}

impl SecurityDetector {
    /// Built-in catalog plus the user rules from config.
    pub fn new(extra: &[PatternRuleConfig]) -> Result<Self, ConfigError> {
        let mut rules: Vec<SecurityRule> = COMPILED_BUILTINS
            .iter()
            .map(|(b, regex)| SecurityRule {
                id: format!("security/{}", b.id),
                languages: b.languages.to_vec(),
                regex: regex.clone(),
                severity: b.severity,
                message: b.message.to_string(),
            })
            .collect();

        for rule in extra {
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(rule.case_insensitive)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    rule: rule.id.clone(),
                    source,
                })?;
            let message = if rule.message.is_empty() {
                format!("matched custom rule `{}`", rule.id)
            } else {
                rule.message.clone()
            };
            rules.push(SecurityRule {
                id: format!("security/{}", rule.id.trim_start_matches("security/")),
                languages: rule.languages.clone(),
                regex,
                severity: rule.severity,
                message,
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }
}

impl Detector for SecurityDetector {
    fn id(&self) -> &'static str {
        "security"
    }

    fn base_confidence(&self) -> f64 {
        0.7
    }

    fn rule_ids(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self.rules.iter().map(|r| r.id.as_str()).collect();
        ids.into_iter().map(str::to_string).collect()
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let rules: Vec<&SecurityRule> = self
            .rules
            .iter()
            .filter(|r| r.applies_to(ctx.language))
            .collect();
        let mut findings = Vec::new();
        let mut seen: BTreeSet<(&str, u32)> = BTreeSet::new();

        for line in &ctx.stream.lines {
            if line.is_blank || line.is_comment_only {
                continue;
            }
            for rule in &rules {
                let Some(m) = rule.regex.find(&line.code) else {
                    continue;
                };
                if !seen.insert((rule.id.as_str(), line.number)) {
                    continue;
                }
                findings.push(
                    Finding::new(
                        rule.id.clone(),
                        Category::Security,
                        rule.severity,
                        ctx.path,
                        LineRange::line(line.number),
                        rule.message.clone(),
                    )
                    .with_snippet(m.as_str()),
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

    fn scan(detector: &SecurityDetector, text: &str, language: Language) -> Vec<Finding> {
        let config = Config::default();
        let stream = normalize(text, language);
        let metrics = extract(&stream);
        let ctx = FileContext {
            path: "app",
            language,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        detector.detect(&ctx).unwrap()
    }

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.detector.as_str()).collect()
    }

    #[test]
    fn python_catalog() {
        let detector = SecurityDetector::new(&[]).unwrap();
        let src = "import os\nos.system('rm -rf ' + path)\npassword = \"hunter22\"\nrequests.get(url, verify=False)\ncur.execute(\"SELECT * FROM users WHERE id = \" + uid)\nh = hashlib.md5(data)\n";
        let findings = scan(&detector, src, Language::Python);
        assert_eq!(
            ids(&findings),
            vec![
                "security/command-exec",
                "security/hardcoded-credential",
                "security/disabled-certificate-validation",
                "security/sql-concatenation",
                "security/weak-hash",
            ]
        );
        assert_eq!(findings[0].snippet.as_deref(), Some("os.system("));
        assert_eq!(findings[1].range, LineRange::line(3));
    }

    #[test]
    fn comments_are_not_scanned() {
        let detector = SecurityDetector::new(&[]).unwrap();
        let findings = scan(&detector, "// el.innerHTML = x;\nel.textContent = x;\n", Language::JavaScript);
        assert!(findings.is_empty());
        let findings = scan(&detector, "el.innerHTML = userText;\n", Language::JavaScript);
        assert_eq!(ids(&findings), vec!["security/dom-xss"]);
    }

    #[test]
    fn rules_are_language_scoped() {
        let detector = SecurityDetector::new(&[]).unwrap();
        assert!(scan(&detector, "os.system(cmd)\n", Language::Rust).is_empty());
        let go = "cfg := &tls.Config{InsecureSkipVerify: true}\n";
        assert_eq!(
            ids(&scan(&detector, go, Language::Go)),
            vec!["security/disabled-certificate-validation"]
        );
    }

    #[test]
    fn custom_rules_extend_the_catalog() {
        let rule = PatternRuleConfig {
            id: "no-unwrap".into(),
            pattern: r"\.unwrap\(\)".into(),
            languages: vec![Language::Rust],
            ..PatternRuleConfig::default()
        };
        let detector = SecurityDetector::new(&[rule]).unwrap();
        assert!(detector.rule_ids().contains(&"security/no-unwrap".to_string()));
        let findings = scan(&detector, "let v = x.unwrap();\n", Language::Rust);
        assert_eq!(ids(&findings), vec!["security/no-unwrap"]);
        assert_eq!(findings[0].message, "matched custom rule `no-unwrap`");
    }
}
