//! Property-based tests for the normalizer, duplicate index and engine determinism.

use proptest::prelude::*;
use sniff_core::duplicates::{find_duplicates, shingle};
use sniff_core::{normalize, Config, Engine, FileInput, Language, Thresholds};

const LANGUAGES: &[Language] = &[
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::C,
    Language::Ruby,
    Language::Shell,
    Language::Sql,
    Language::Unknown,
];

fn language() -> impl Strategy<Value = Language> {
    prop::sample::select(LANGUAGES)
}

/// Source-ish text heavy on comment and string delimiters.
fn source_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "let x = 1;", "/*", "*/", "//", "#", "\"", "'", "`", "\\", "{", "}", "\"\"\"", "--",
            "=begin", "=end", "value", "  ", "\t", "\r",
        ]),
        0..40,
    )
    .prop_flat_map(|tokens| {
        prop::collection::vec(prop::bool::weighted(0.3), tokens.len()).prop_map(move |breaks| {
            let mut text = String::new();
            for (token, newline) in tokens.iter().zip(breaks) {
                text.push_str(token);
                text.push(if newline { '\n' } else { ' ' });
            }
            text
        })
    })
}

fn code_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec![
            "total = compute(items)",
            "count += 1",
            "value = lookup(key)",
            "result.append(value)",
            "if ready:",
            "return result",
            "print(total)",
            "}",
        ]),
        0..30,
    )
    .prop_map(|lines| lines.into_iter().map(str::to_string).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn normalizer_keeps_one_line_per_input_line(text in source_text(), lang in language()) {
        let stream = normalize(&text, lang);
        let originals: Vec<&str> = text.lines().collect();
        prop_assert_eq!(stream.lines.len(), originals.len());
        for (idx, (line, original)) in stream.lines.iter().zip(&originals).enumerate() {
            prop_assert_eq!(line.number as usize, idx + 1);
            prop_assert_eq!(line.raw.as_str(), *original);
        }
    }

    #[test]
    fn normalizer_never_panics_on_arbitrary_text(text in "\\PC*", lang in language()) {
        let stream = normalize(&text, lang);
        prop_assert_eq!(stream.lines.len(), text.lines().count());
    }

    #[test]
    fn duplicate_groups_ignore_input_order(a in code_lines(), b in code_lines()) {
        let thresholds = Thresholds::default();
        let left = shingle("a.py", &normalize(&a.join("\n"), Language::Python), thresholds.duplicate_window_size);
        let right = shingle("b.py", &normalize(&b.join("\n"), Language::Python), thresholds.duplicate_window_size);
        let forward = find_duplicates(&[left.clone(), right.clone()], &thresholds);
        let backward = find_duplicates(&[right, left], &thresholds);
        prop_assert_eq!(forward, backward);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn engine_runs_are_idempotent(a in code_lines(), b in code_lines()) {
        let inputs = vec![
            FileInput::new("pkg/a.py", a.join("\n")),
            FileInput::new("pkg/b.py", b.join("\n")),
        ];
        let engine = Engine::new(Config::default()).unwrap();
        let mut first = engine.run(&inputs).unwrap();
        let mut second = engine.run(&inputs).unwrap();
        first.summary.duration_ms = 0;
        second.summary.duration_ms = 0;
        prop_assert_eq!(first, second);
    }
}
