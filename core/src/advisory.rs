//! Declared dependencies and external vulnerability records.
//!
//! Manifests are parsed line by line so every dependency keeps the line it was declared on. The
//! engine never looks advisories up itself: callers load an [`AdvisoryFeed`] and hand it over.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::report::{Category, Finding, LineRange, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ecosystem {
    Cargo,
    Npm,
    Pypi,
}

impl Ecosystem {
    /// Ecosystem of a manifest, judged by its file name.
    pub fn of_manifest(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name {
            "Cargo.toml" => Some(Self::Cargo),
            "package.json" => Some(Self::Npm),
            _ if name.starts_with("requirements") && name.ends_with(".txt") => Some(Self::Pypi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DeclaredDependency {
    pub ecosystem: Ecosystem,
    pub name: String,
    /// Requirement as written (`^1.2`, `==2.0.1`, `1.0`); `None` for path/git dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub manifest: String,
    pub line: u32,
}

static PLAIN_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[=v]?\s*(\d+(?:\.\d+)*(?:[-+.][0-9A-Za-z.-]+)?)$").unwrap());
static LEADING_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*").unwrap());

impl DeclaredDependency {
    /// True when the requirement names exactly one version.
    pub fn pinned(&self) -> bool {
        let Some(version) = self.version.as_deref() else {
            return false;
        };
        match self.ecosystem {
            Ecosystem::Pypi => version.starts_with("==") && !version.contains('*'),
            Ecosystem::Cargo => version.starts_with('=') && PLAIN_VERSION_RE.is_match(version),
            Ecosystem::Npm => PLAIN_VERSION_RE.is_match(version),
        }
    }

    /// Version used to query the feed: the first version number in the requirement.
    pub fn lookup_version(&self) -> Option<&str> {
        let version = self.version.as_deref()?;
        PLAIN_VERSION_RE
            .captures(version.trim_start_matches("=="))
            .and_then(|caps| caps.get(1))
            .or_else(|| LEADING_VERSION_RE.find(version))
            .map(|m| m.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vulnerability {
    pub id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl Vulnerability {
    fn finding_severity(&self) -> Severity {
        match self.severity.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("critical" | "high") => Severity::Critical,
            Some("low") => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

/// Vulnerability records keyed by `name@version`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AdvisoryFeed {
    entries: BTreeMap<String, Vec<Vulnerability>>,
}

impl AdvisoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn insert(&mut self, name: &str, version: &str, vulnerability: Vulnerability) {
        self.entries
            .entry(format!("{name}@{version}"))
            .or_default()
            .push(vulnerability);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, name: &str, version: &str) -> &[Vulnerability] {
        let key = format!("{name}@{version}");
        self.entries
            .get(&key)
            .or_else(|| self.entries.get(&key.to_ascii_lowercase()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Parse `text` as the manifest at `path`. Files that are not manifests yield nothing.
pub fn parse_manifest(path: &str, text: &str) -> Vec<DeclaredDependency> {
    match Ecosystem::of_manifest(path) {
        Some(Ecosystem::Cargo) => parse_cargo(path, text),
        Some(Ecosystem::Npm) => parse_package_json(path, text),
        Some(Ecosystem::Pypi) => parse_requirements(path, text),
        None => Vec::new(),
    }
}

static TOML_SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").unwrap());
static TOML_INLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*([A-Za-z0-9_-]+)\s*=\s*(.+?)\s*$"#).unwrap());
static TOML_STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"([^"]*)""#).unwrap());
static TOML_VERSION_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bversion\s*=\s*"([^"]*)""#).unwrap());

fn is_dependency_table(section: &str) -> bool {
    let last = section.rsplit('.').next().unwrap_or(section);
    matches!(last, "dependencies" | "dev-dependencies" | "build-dependencies")
}

fn parse_cargo(path: &str, text: &str) -> Vec<DeclaredDependency> {
    let mut out = Vec::new();
    let mut in_table = false;
    // `[dependencies.name]` tables: the name and its header line, version filled in later.
    let mut named: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = raw.split('#').next().unwrap_or("");
        if let Some(caps) = TOML_SECTION_RE.captures(line) {
            let section = caps[1].trim();
            named = None;
            in_table = is_dependency_table(section);
            if let Some((table, name)) = section.rsplit_once('.') {
                if is_dependency_table(table) {
                    out.push(DeclaredDependency {
                        ecosystem: Ecosystem::Cargo,
                        name: name.trim_matches('"').to_string(),
                        version: None,
                        manifest: path.to_string(),
                        line: line_no,
                    });
                    named = Some(out.len() - 1);
                }
            }
            continue;
        }
        if let Some(idx) = named {
            if let Some(caps) = TOML_VERSION_KEY_RE.captures(line) {
                out[idx].version = Some(caps[1].to_string());
            }
            continue;
        }
        if !in_table {
            continue;
        }
        let Some(caps) = TOML_INLINE_RE.captures(line) else {
            continue;
        };
        let value = &caps[2];
        let version = TOML_STRING_RE
            .captures(value)
            .or_else(|| TOML_VERSION_KEY_RE.captures(value))
            .map(|c| c[1].to_string());
        out.push(DeclaredDependency {
            ecosystem: Ecosystem::Cargo,
            name: caps[1].to_string(),
            version,
            manifest: path.to_string(),
            line: line_no,
        });
    }
    out
}

const NPM_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

fn parse_package_json(path: &str, text: &str) -> Vec<DeclaredDependency> {
    let Ok(serde_json::Value::Object(root)) = serde_json::from_str::<serde_json::Value>(text)
    else {
        return Vec::new();
    };
    let lines: Vec<&str> = text.lines().collect();
    let line_of = |needle: &str, from: usize| -> Option<usize> {
        lines
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, l)| l.contains(needle))
            .map(|(i, _)| i)
    };

    let mut out = Vec::new();
    for section in NPM_SECTIONS {
        let Some(serde_json::Value::Object(deps)) = root.get(*section) else {
            continue;
        };
        let section_line = line_of(&format!("\"{section}\""), 0).unwrap_or(0);
        for (name, version) in deps {
            let line = line_of(&format!("\"{name}\""), section_line + 1).unwrap_or(section_line);
            out.push(DeclaredDependency {
                ecosystem: Ecosystem::Npm,
                name: name.clone(),
                version: version.as_str().map(str::to_string),
                manifest: path.to_string(),
                line: line as u32 + 1,
            });
        }
    }
    out
}

static REQUIREMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*((?:==|>=|<=|~=|!=|>|<|===)\s*[^;\s#,]+(?:\s*,\s*(?:==|>=|<=|~=|!=|>|<)\s*[^;\s#,]+)*)?").unwrap()
});

fn parse_requirements(path: &str, text: &str) -> Vec<DeclaredDependency> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with('-') || line.contains("://") {
                return None;
            }
            let caps = REQUIREMENT_RE.captures(line)?;
            Some(DeclaredDependency {
                ecosystem: Ecosystem::Pypi,
                name: caps[1].to_ascii_lowercase().replace('_', "-"),
                version: caps.get(2).map(|m| m.as_str().replace(' ', "")),
                manifest: path.to_string(),
                line: idx as u32 + 1,
            })
        })
        .collect()
}

/// One `advisory/<id>` finding per vulnerability of every declared dependency.
pub fn advisory_findings(dependencies: &[DeclaredDependency], feed: &AdvisoryFeed) -> Vec<Finding> {
    let mut findings = Vec::new();
    for dep in dependencies {
        let Some(version) = dep.lookup_version() else {
            continue;
        };
        for vuln in feed.lookup(&dep.name, version) {
            // A range only probably resolves to the version it starts from.
            let confidence = if dep.pinned() { 1.0 } else { 0.6 };
            findings.push(
                Finding::new(
                    format!("advisory/{}", vuln.id),
                    Category::Advisory,
                    vuln.finding_severity(),
                    &dep.manifest,
                    LineRange::line(dep.line),
                    format!("{} {version}: {} ({})", dep.name, vuln.summary, vuln.id),
                )
                .with_confidence(confidence),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(deps: &[DeclaredDependency]) -> Vec<(&str, Option<&str>, u32)> {
        deps.iter()
            .map(|d| (d.name.as_str(), d.version.as_deref(), d.line))
            .collect()
    }

    #[test]
    fn cargo_manifest() {
        let text = r#"[package]
name = "demo"
version = "0.1.0"

[dependencies]
serde = { version = "1.0.100", features = ["derive"] }
regex = "=1.5.4" # pinned
local = { path = "../local" }

[dependencies.tokio]
features = ["full"]
version = "1.28"

[dev-dependencies]
proptest = "1"
"#;
        let deps = parse_manifest("crates/demo/Cargo.toml", text);
        assert_eq!(
            names(&deps),
            vec![
                ("serde", Some("1.0.100"), 6),
                ("regex", Some("=1.5.4"), 7),
                ("local", None, 8),
                ("tokio", Some("1.28"), 10),
                ("proptest", Some("1"), 15),
            ]
        );
        assert!(deps[1].pinned());
        assert!(!deps[0].pinned());
        assert_eq!(deps[1].lookup_version(), Some("1.5.4"));
    }

    #[test]
    fn package_json() {
        let text = "{\n  \"name\": \"web\",\n  \"dependencies\": {\n    \"lodash\": \"4.17.20\",\n    \"react\": \"^18.2.0\"\n  },\n  \"devDependencies\": {\n    \"jest\": \"~29.0.0\"\n  }\n}\n";
        let deps = parse_manifest("web/package.json", text);
        assert_eq!(
            names(&deps),
            vec![
                ("lodash", Some("4.17.20"), 4),
                ("react", Some("^18.2.0"), 5),
                ("jest", Some("~29.0.0"), 8),
            ]
        );
        assert!(deps[0].pinned());
        assert_eq!(deps[1].lookup_version(), Some("18.2.0"));
    }

    #[test]
    fn requirements_txt() {
        let text = "# pinned\nDjango==3.2.0\nrequests[socks] >= 2.0, <3\n-r base.txt\nsome_pkg\n";
        let deps = parse_manifest("requirements-dev.txt", text);
        assert_eq!(
            names(&deps),
            vec![
                ("django", Some("==3.2.0"), 2),
                ("requests", Some(">=2.0,<3"), 3),
                ("some-pkg", None, 5),
            ]
        );
        assert!(deps[0].pinned());
        assert_eq!(deps[0].lookup_version(), Some("3.2.0"));
    }

    #[test]
    fn feed_hits_become_findings() {
        let feed = AdvisoryFeed::from_json(
            r#"{"lodash@4.17.20": [{"id": "GHSA-35jh-r3h4-6jhm", "summary": "command injection", "severity": "HIGH"}]}"#,
        )
        .unwrap();
        let deps = parse_manifest(
            "package.json",
            "{\n  \"dependencies\": {\n    \"lodash\": \"4.17.20\"\n  }\n}\n",
        );
        let findings = advisory_findings(&deps, &feed);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "advisory/GHSA-35jh-r3h4-6jhm");
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].range, LineRange::line(3));
        assert_eq!(findings[0].confidence, 1.0);
    }
}
