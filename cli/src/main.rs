use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Parser};
use console::style;
use serde_yaml::Value as YamlValue;
use sniff_core::{
    aggregate::severity_counts, AdvisoryFeed, Config, Engine, FileInput, Finding, ReportModel,
    Severity,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// sniff CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "sniff",
    about = "Static analysis for size, complexity, security, duplication and dependency problems."
)]
struct Args {
    /// Path to config file (YAML). Used when present.
    #[arg(long, default_value = ".sniff.yml")]
    config: PathBuf,

    /// Emit the full report as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Only print the summary line.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Files or directories to analyse.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,

    /// Disable detectors or families (comma-separated), e.g. `style,security/weak-hash`.
    #[arg(long, value_delimiter = ',', value_name = "ID[,ID]")]
    disable: Vec<String>,

    /// Set config overrides (repeatable as key=value). Example: --set thresholds.max_nesting_depth=3
    #[arg(long = "set", value_name = "KEY=VALUE", num_args = 0..)]
    sets: Vec<String>,

    /// JSON advisory feed mapping `name@version` to vulnerability records.
    #[arg(long, value_name = "FILE")]
    advisories: Option<PathBuf>,

    /// Exit non-zero when a finding reaches this severity (info, warning, critical).
    #[arg(long, value_name = "SEVERITY")]
    fail_on: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Directories that never hold sources worth analysing.
const SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules", "target", "__pycache__"];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let (mut cfg, config_root) = load_config(&args.config)?;
    apply_overrides(&mut cfg, &args.sets)?;
    cfg.detectors.disable.extend(args.disable.iter().cloned());
    if let Some(level) = &args.fail_on {
        cfg.exit_policy.fail_on = parse_severity(level)?;
    }

    let mut engine = Engine::new(cfg.clone()).context("Invalid configuration")?;
    if let Some(path) = &args.advisories {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read advisories {}", path.display()))?;
        let feed = AdvisoryFeed::from_json(&text)
            .with_context(|| format!("Failed to parse advisories {}", path.display()))?;
        debug!(entries = feed.len(), "loaded advisory feed");
        engine = engine.with_advisories(feed);
    }

    let mut files = collect_files(&args.paths)?;
    files.sort();
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let rel_path = pathdiff::diff_paths(&path, &config_root).unwrap_or_else(|| path.clone());
        inputs.push(FileInput::new(
            rel_path.to_string_lossy().replace('\\', "/"),
            bytes,
        ));
    }

    let report = engine.run(&inputs)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if !args.quiet {
            print_human_report(&report);
        }
        print_summary(&report);
    }

    let code = report.exit_code(&cfg.exit_policy);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut walker = WalkDir::new(path).into_iter();
            while let Some(entry_res) = walker.next() {
                let entry = entry_res?;
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    if entry.depth() > 0 && SKIP_DIRS.contains(&&*name) {
                        walker.skip_current_dir();
                    }
                    continue;
                }
                if entry.file_type().is_file() {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn load_config(path: &Path) -> anyhow::Result<(Config, PathBuf)> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let value: YamlValue = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML {}", path.display()))?;
        let cfg: Config = serde_yaml::from_value(value)
            .with_context(|| format!("Invalid config structure in {}", path.display()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };
        Ok((cfg, dir))
    } else {
        Ok((Config::default(), env::current_dir()?))
    }
}

/// Apply `a.b.c=value` overrides on the config's YAML tree. Values are parsed as YAML scalars.
fn apply_overrides(cfg: &mut Config, sets: &[String]) -> anyhow::Result<()> {
    if sets.is_empty() {
        return Ok(());
    }
    let mut tree = serde_yaml::to_value(&*cfg)?;
    for kv in sets {
        let (key, val) = kv
            .split_once('=')
            .ok_or_else(|| anyhow!("Override `{kv}` is not in KEY=VALUE form"))?;
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value: YamlValue = serde_yaml::from_str(val.trim())
            .with_context(|| format!("Failed to parse value for `{key}`"))?;
        let mut node = &mut tree;
        for part in key.split('.') {
            let map = node
                .as_mapping_mut()
                .ok_or_else(|| anyhow!("Unknown config key `{key}`"))?;
            node = map
                .get_mut(part)
                .ok_or_else(|| anyhow!("Unknown config key `{key}`"))?;
        }
        *node = value;
    }
    *cfg = serde_yaml::from_value(tree).context("Invalid config override")?;
    Ok(())
}

fn parse_severity(name: &str) -> anyhow::Result<Severity> {
    match name.trim().to_ascii_lowercase().as_str() {
        "info" => Ok(Severity::Info),
        "warning" | "warn" => Ok(Severity::Warning),
        "critical" => Ok(Severity::Critical),
        other => bail!("Unknown severity `{other}` (expected info, warning or critical)"),
    }
}

fn severity_label(severity: Severity) -> console::StyledObject<&'static str> {
    match severity {
        Severity::Critical => style("critical").red().bold(),
        Severity::Warning => style("warning").yellow(),
        Severity::Info => style("info").cyan(),
    }
}

fn print_finding(finding: &Finding) {
    let range = if finding.range.start == finding.range.end {
        finding.range.start.to_string()
    } else {
        format!("{}-{}", finding.range.start, finding.range.end)
    };
    println!(
        "  {:>5} [{}] {} {}",
        range,
        severity_label(finding.severity),
        style(&finding.detector).dim(),
        finding.message
    );
    if let Some(snippet) = &finding.snippet {
        println!("        → {}", snippet);
    }
}

fn print_human_report(report: &ReportModel) {
    for (path, findings) in &report.findings {
        println!("{}", style(path).bold());
        for finding in findings {
            print_finding(finding);
        }
        println!();
    }
    if !report.warnings.is_empty() {
        println!("{}", style("Warnings:").bold());
        for warning in &report.warnings {
            match &warning.path {
                Some(path) => println!("  - {}: {}", style(path).cyan(), warning.message),
                None => println!("  - {}", warning.message),
            }
        }
        println!();
    }
}

fn print_summary(report: &ReportModel) {
    let s = &report.summary;
    let counts = severity_counts(s)
        .iter()
        .map(|(severity, n)| format!("{n} {severity}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "{} files analysed ({} skipped), {} findings ({}), {} duplicate groups, {} cycles",
        s.files_analyzed,
        report.skipped.len(),
        s.findings_total,
        counts,
        s.duplicate_groups,
        s.cycles
    );
    println!(
        "maintainability {:.1} ({:?}), estimated debt {:.1}h, {} ms",
        s.health.maintainability_index, s.health.rating, s.health.debt_hours, s.duration_ms
    );
    if !s.recommendations.is_empty() {
        println!("{}", style("Recommendations:").bold());
        for rec in &s.recommendations {
            println!("  - {}", rec.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_reach_nested_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &[
                "thresholds.max_nesting_depth=3".to_string(),
                "exit_policy.fail_on=warning".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(cfg.thresholds.max_nesting_depth, 3);
        assert_eq!(cfg.exit_policy.fail_on, Severity::Warning);
    }

    #[test]
    fn unknown_override_keys_fail() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &["thresholds.nope=1".to_string()]).is_err());
        assert!(apply_overrides(&mut cfg, &["no-equals".to_string()]).is_err());
    }

    #[test]
    fn severities_parse() {
        assert_eq!(parse_severity("WARN").unwrap(), Severity::Warning);
        assert!(parse_severity("fatal").is_err());
    }
}
