use sniff_core::aggregate::merge_findings;
use sniff_core::{
    AdvisoryFeed, CancellationToken, Category, Config, Engine, EngineError, FileInput, Finding,
    LineRange, ReportModel, Severity,
};

fn run_with(config: Config, files: &[(&str, &str)]) -> ReportModel {
    let inputs: Vec<FileInput> = files
        .iter()
        .map(|(path, text)| FileInput::new(*path, *text))
        .collect();
    let engine = Engine::new(config).unwrap();
    engine.run(&inputs).unwrap()
}

fn run(files: &[(&str, &str)]) -> ReportModel {
    run_with(Config::default(), files)
}

fn with_detector<'a>(report: &'a ReportModel, detector: &str) -> Vec<&'a Finding> {
    report
        .iter_findings()
        .filter(|f| f.detector == detector)
        .collect()
}

fn without_timing(mut report: ReportModel) -> ReportModel {
    report.summary.duration_ms = 0;
    report
}

const DEEP: &str = "\
function walk(a) {
  if (a) {
    for (const b of a) {
      while (b.next) {
        if (b.ok) {
          try {
            if (b.done) {
              return b;
            }
          } catch (e) {
            return null;
          }
        }
      }
    }
  }
}
";

const BLOCK: &str = "\
let total = items.len();
let mut sum = 0;
for item in items {
    sum += item.price;
}
let average = sum / total;
println!(\"average {average}\");
return average;
";

fn project() -> Vec<(&'static str, &'static str)> {
    vec![
        ("web/walk.js", DEEP),
        ("src/a.rs", BLOCK),
        ("src/b.rs", BLOCK),
        ("pkg/a.py", "import b\n\ndef run(cmd):\n    os.system(cmd)\n"),
        ("pkg/b.py", "import c\n"),
        ("pkg/c.py", "import a\n"),
        (
            "package.json",
            "{\n  \"dependencies\": {\n    \"lodash\": \"4.17.20\"\n  }\n}\n",
        ),
    ]
}

const SHALLOW_BEFORE: &str = "\
const LIMIT = 10;

function clamp(n) {
  if (n > LIMIT) {
    return LIMIT;
  }
  return n;
}

function sum(items) {
  let total = 0;
  for (const item of items) {
    total += clamp(item.value);
  }
  return total;
}

";

const SHALLOW_AFTER: &str = "
function label(node) {
  if (!node) {
    return \"none\";
  }
  return node.name;
}

function report(nodes) {
  const names = [];
  for (const node of nodes) {
    if (node.visible) {
      names.push(label(node));
    }
  }
  return names.join(\", \");
}
";

#[test]
fn deep_nesting_is_reported_once_over_the_function() {
    let text = format!("{SHALLOW_BEFORE}{DEEP}{SHALLOW_AFTER}");
    let report = run(&[("web/tree.js", text.as_str())]);
    assert_eq!(report.files[0].source.line_count, 51);
    let nesting = with_detector(&report, "nesting/deep-nesting");
    assert_eq!(nesting.len(), 1);
    assert_eq!(nesting[0].range, LineRange::new(18, 34));
    assert_eq!(nesting[0].category, Category::Nesting);
    assert!(nesting[0].message.starts_with("`walk`"));
}

#[test]
fn identical_block_in_two_files_forms_one_group() {
    let report = run(&[("a.rs", BLOCK), ("b.rs", BLOCK)]);
    assert_eq!(report.duplicates.len(), 1);
    let group = &report.duplicates[0];
    assert_eq!(group.similarity, 1.0);
    assert_eq!(group.members.len(), 2);
    assert_eq!(with_detector(&report, "duplication/block").len(), 2);
    assert_eq!(report.summary.duplicate_groups, 1);
    assert_eq!(report.summary.duplicated_lines, 16);
}

#[test]
fn unknown_files_still_join_duplicate_groups() {
    let report = run(&[("notes/a.txt", BLOCK), ("notes/b.txt", BLOCK)]);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].members.len(), 2);
    assert!(report.dependencies.nodes.is_empty());
    assert_eq!(with_detector(&report, "duplication/block").len(), 2);
}

#[test]
fn duplicate_findings_can_be_turned_off() {
    let config = Config {
        emit_duplicate_findings: false,
        ..Config::default()
    };
    let report = run_with(config, &[("a.rs", BLOCK), ("b.rs", BLOCK)]);
    assert_eq!(report.duplicates.len(), 1);
    assert!(with_detector(&report, "duplication/block").is_empty());
}

#[test]
fn unterminated_block_comment_runs_to_end_of_file() {
    let report = run(&[("broken.c", "int x = 1;\n/* never closed\nint y = 2;\nint z = 3;\n")]);
    assert_eq!(report.files.len(), 1);
    let entry = &report.files[0];
    assert_eq!(entry.source.line_count, 4);
    assert_eq!(entry.stats.code_lines, 1);
    assert_eq!(entry.stats.comment_lines, 3);
}

#[test]
fn import_cycle_is_reported_once() {
    let report = run(&[
        ("pkg/a.py", "import b\n"),
        ("pkg/b.py", "import c\n"),
        ("pkg/c.py", "import a\n"),
    ]);
    assert_eq!(report.dependencies.cycles.len(), 1);
    assert_eq!(report.summary.cycles, 1);
    let cycles = with_detector(&report, "dependency/cycle");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].path, "pkg/a.py");
}

#[test]
fn advisories_attach_to_manifest_lines() {
    let feed = AdvisoryFeed::from_json(
        r#"{"lodash@4.17.20": [{"id": "GHSA-35jh-r3h4-6jhm", "summary": "command injection", "severity": "high"}]}"#,
    )
    .unwrap();
    let inputs: Vec<FileInput> = project()
        .into_iter()
        .map(|(path, text)| FileInput::new(path, text))
        .collect();
    let report = Engine::new(Config::default())
        .unwrap()
        .with_advisories(feed)
        .run(&inputs)
        .unwrap();
    assert_eq!(report.declared_dependencies.len(), 1);
    let hits = report.findings_for("package.json");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].detector, "advisory/GHSA-35jh-r3h4-6jhm");
    assert_eq!(hits[0].range, LineRange::line(3));
    assert_eq!(hits[0].severity, Severity::Critical);
}

#[test]
fn security_findings_flow_into_the_report() {
    let report = run(&project());
    let exec = with_detector(&report, "security/command-exec");
    assert_eq!(exec.len(), 1);
    assert_eq!(exec[0].path, "pkg/a.py");
    assert_eq!(exec[0].range, LineRange::line(4));
    assert!(report.summary.health.debt_hours > 0.0);
}

#[test]
fn disabled_families_emit_nothing() {
    let mut config = Config::default();
    config.detectors.disable = vec!["style".into(), "dependency".into()];
    let report = run_with(config, &project());
    assert!(report
        .iter_findings()
        .all(|f| !f.detector.starts_with("style/") && !f.detector.starts_with("dependency/")));
    assert_eq!(report.dependencies.cycles.len(), 1);
}

#[test]
fn unknown_detector_ids_are_config_errors() {
    let mut config = Config::default();
    config.detectors.disable.push("nesting/too-deep".into());
    assert!(Engine::new(config).is_err());
}

#[test]
fn runs_are_idempotent() {
    let first = without_timing(run(&project()));
    let second = without_timing(run(&project()));
    assert_eq!(first, second);
    assert!(first.summary.findings_total > 0);
}

#[test]
fn input_order_does_not_matter() {
    let mut reversed = project();
    reversed.reverse();
    assert_eq!(
        without_timing(run(&project())),
        without_timing(run(&reversed))
    );
}

#[test]
fn findings_are_sorted_within_each_file() {
    let report = run(&project());
    for findings in report.findings.values() {
        let keys: Vec<_> = findings.iter().map(Finding::sort_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}

#[test]
fn overlapping_findings_of_one_detector_merge() {
    let finding = |range: LineRange, severity: Severity, message: &str| {
        Finding::new(
            "performance/nested-loops",
            Category::Performance,
            severity,
            "a.py",
            range,
            message,
        )
    };
    let merged = merge_findings(vec![
        finding(LineRange::new(3, 9), Severity::Info, "loop in loop"),
        finding(LineRange::new(5, 12), Severity::Warning, "three loops deep"),
    ]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].range, LineRange::new(3, 12));
    assert_eq!(merged[0].severity, Severity::Warning);
    assert_eq!(merged[0].message, "loop in loop; three loops deep");
}

#[test]
fn cancelled_run_yields_no_partial_report() {
    let token = CancellationToken::new();
    token.cancel();
    let inputs: Vec<FileInput> = project()
        .into_iter()
        .map(|(path, text)| FileInput::new(path, text))
        .collect();
    let result = Engine::new(Config::default())
        .unwrap()
        .run_with_cancel(&inputs, &token);
    assert!(matches!(result, Err(EngineError::Cancelled)));
}

#[test]
fn report_serialises_with_kebab_case_enums() {
    let report = run(&[("walk.js", DEEP)]);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["findings"]["walk.js"][0]["severity"], "warning");
    assert_eq!(json["files"][0]["source"]["language"], "javascript");
}
