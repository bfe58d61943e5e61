//! Per-file import extraction.
//!
//! Everything here is lexical: regexes over comment-stripped code. Resolution against the set of
//! scanned paths happens later in [`crate::graph`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::language::Language;
use crate::normalize::NormalizedStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    Import,
    Mod,
    Use,
    Include,
    SystemInclude,
    Require,
    Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    pub target: String,
    pub line: u32,
    pub kind: ImportKind,
    /// The reference names a file of the project (relative path, `mod` declaration, quoted
    /// include), so failing to resolve it is worth reporting.
    pub local: bool,
}

impl RawImport {
    fn new(target: impl Into<String>, line: u32, kind: ImportKind, local: bool) -> Self {
        Self {
            target: target.into(),
            line,
            kind,
            local,
        }
    }
}

static JS_IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+(?:type\s+)?[^;]*?\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});
static JS_IMPORT_SIDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static JS_EXPORT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*export\s+[^;]*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());
static JS_REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static JS_DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static PY_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*import\s+(.+)$").unwrap());
static PY_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+(\.*)([\w.]*)\s+import\s+(.+)$").unwrap());

static RS_MOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z0-9_]+)\s*;").unwrap());
static RS_USE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+").unwrap());

static GO_SINGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#).unwrap());
static GO_BLOCK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*import\s*\(").unwrap());
static GO_BLOCK_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

static JVM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)").unwrap());
static C_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*#\s*include\s*([<"])([^>"]+)[>"]"#).unwrap());
static CS_USING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:global\s+)?using\s+(?:static\s+)?(?:\w+\s*=\s*)?([\w.]+)\s*;").unwrap());
static PHP_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:require|include)(?:_once)?\s*\(?\s*(?:__DIR__\s*\.\s*)?['"]([^'"]+)['"]"#).unwrap()
});
static PHP_USE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*use\s+(?:function\s+|const\s+)?([\w\\]+)").unwrap());
static RB_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(require|require_relative|load)\s*\(?\s*['"]([^'"]+)['"]"#).unwrap()
});
static SWIFT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:@\w+\s+)*import\s+(?:class\s+|struct\s+|enum\s+|protocol\s+|func\s+|var\s+|typealias\s+)?([\w.]+)").unwrap()
});
static SH_SOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:source|\.)\s+["']?([^\s"';|&]+)"#).unwrap());

/// Every import-like reference in `stream`, in line order.
pub fn extract(stream: &NormalizedStream) -> Vec<RawImport> {
    match stream.language {
        Language::JavaScript | Language::TypeScript => extract_js(stream),
        Language::Python => extract_python(stream),
        Language::Rust => extract_rust(stream),
        Language::Go => extract_go(stream),
        Language::Java | Language::Kotlin => line_matches(stream, &JVM_IMPORT, ImportKind::Import),
        Language::C | Language::Cpp => extract_c(stream),
        Language::CSharp => line_matches(stream, &CS_USING, ImportKind::Use),
        Language::Php => extract_php(stream),
        Language::Ruby => extract_ruby(stream),
        Language::Swift => line_matches(stream, &SWIFT_IMPORT, ImportKind::Import),
        Language::Shell => extract_shell(stream),
        Language::Html | Language::Css | Language::Sql | Language::Unknown => Vec::new(),
    }
}

fn code_lines(stream: &NormalizedStream) -> impl Iterator<Item = (u32, &str)> {
    stream
        .lines
        .iter()
        .filter(|l| !l.is_blank && !l.is_comment_only)
        .map(|l| (l.number, l.code.as_str()))
}

fn line_matches(stream: &NormalizedStream, re: &Regex, kind: ImportKind) -> Vec<RawImport> {
    code_lines(stream)
        .filter_map(|(line, code)| {
            let caps = re.captures(code)?;
            Some(RawImport::new(caps[1].trim_end_matches(".*"), line, kind, false))
        })
        .collect()
}

fn extract_js(stream: &NormalizedStream) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (line, code) in code_lines(stream) {
        let mut modules = Vec::new();
        if let Some(cap) = JS_IMPORT_FROM.captures(code) {
            modules.push(cap[1].to_string());
        } else if let Some(cap) = JS_IMPORT_SIDE.captures(code) {
            modules.push(cap[1].to_string());
        } else if let Some(cap) = JS_EXPORT_FROM.captures(code) {
            modules.push(cap[1].to_string());
        }
        let mut required = Vec::new();
        for cap in JS_REQUIRE.captures_iter(code) {
            required.push(cap[1].to_string());
        }
        for cap in JS_DYNAMIC_IMPORT.captures_iter(code) {
            modules.push(cap[1].to_string());
        }
        for module in modules {
            let local = module.starts_with('.');
            out.push(RawImport::new(module, line, ImportKind::Import, local));
        }
        for module in required {
            let local = module.starts_with('.');
            out.push(RawImport::new(module, line, ImportKind::Require, local));
        }
    }
    out
}

fn extract_python(stream: &NormalizedStream) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (line, code) in code_lines(stream) {
        if let Some(cap) = PY_FROM.captures(code) {
            let dots = &cap[1];
            let module = &cap[2];
            if module.is_empty() {
                // `from . import a, b` names sibling modules.
                for name in import_names(&cap[3]) {
                    out.push(RawImport::new(format!("{dots}{name}"), line, ImportKind::Import, true));
                }
            } else {
                out.push(RawImport::new(
                    format!("{dots}{module}"),
                    line,
                    ImportKind::Import,
                    !dots.is_empty(),
                ));
            }
        } else if let Some(cap) = PY_IMPORT.captures(code) {
            for name in import_names(&cap[1]) {
                out.push(RawImport::new(name, line, ImportKind::Import, false));
            }
        }
    }
    out
}

/// `a, b as c, (d)` → `[a, b, d]`.
fn import_names(list: &str) -> Vec<String> {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches([')', '\\'])
        .split(',')
        .filter_map(|item| {
            let name = item.split(" as ").next().unwrap_or(item).trim();
            (!name.is_empty() && name != "*").then(|| name.to_string())
        })
        .collect()
}

fn extract_rust(stream: &NormalizedStream) -> Vec<RawImport> {
    let mut out = Vec::new();
    let mut stmt = String::new();
    let mut stmt_line: Option<u32> = None;

    for (line, code) in code_lines(stream) {
        if let Some(cap) = RS_MOD.captures(code) {
            out.push(RawImport::new(&cap[1], line, ImportKind::Mod, true));
            continue;
        }
        let starts = stmt_line.is_none() && RS_USE_START.is_match(code);
        if !starts && stmt_line.is_none() {
            continue;
        }
        if starts {
            stmt_line = Some(line);
        }
        stmt.push_str(code.trim());
        stmt.push(' ');
        if code.contains(';') {
            if let Some(first) = stmt_line.take() {
                for target in expand_use(&stmt) {
                    out.push(RawImport::new(target, first, ImportKind::Use, false));
                }
            }
            stmt.clear();
        }
    }
    out
}

/// Flatten one `use` statement into its full paths, one level of braces deep per step.
fn expand_use(stmt: &str) -> Vec<String> {
    let expr = RS_USE_START.replace(stmt.trim(), "");
    let expr = expr.split(';').next().unwrap_or("").trim();
    if expr.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    expand_use_tree("", expr, &mut out);
    out.sort();
    out.dedup();
    out
}

fn expand_use_tree(prefix: &str, tree: &str, out: &mut Vec<String>) {
    let tree = tree.trim().trim_start_matches("::");
    let join = |rest: &str| {
        if prefix.is_empty() {
            rest.to_string()
        } else if rest.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}::{rest}")
        }
    };

    let Some(open) = tree.find('{') else {
        let item = tree.split(" as ").next().unwrap_or(tree).trim();
        match item {
            "" | "*" => {
                if !prefix.is_empty() {
                    out.push(prefix.to_string());
                }
            }
            "self" => out.push(prefix.to_string()),
            _ => out.push(join(item.trim_end_matches("::*"))),
        }
        return;
    };
    let close = tree.rfind('}').unwrap_or(tree.len());
    let head = join(tree[..open].trim().trim_end_matches("::"));
    let inner = &tree[open + 1..close.max(open + 1)];

    let mut depth = 0usize;
    let mut start = 0;
    let mut items = Vec::new();
    for (pos, ch) in inner.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&inner[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    let before = out.len();
    for item in items {
        if !item.trim().is_empty() {
            expand_use_tree(&head, item, out);
        }
    }
    if out.len() == before && !head.is_empty() {
        out.push(head);
    }
}

fn extract_go(stream: &NormalizedStream) -> Vec<RawImport> {
    let mut out = Vec::new();
    let mut in_block = false;
    for (line, code) in code_lines(stream) {
        if in_block {
            if code.trim_start().starts_with(')') {
                in_block = false;
                continue;
            }
            if let Some(cap) = GO_BLOCK_ITEM.captures(code) {
                out.push(RawImport::new(&cap[1], line, ImportKind::Import, false));
            }
            continue;
        }
        if GO_BLOCK_OPEN.is_match(code) {
            in_block = !code.contains(')');
            continue;
        }
        if let Some(cap) = GO_SINGLE.captures(code) {
            out.push(RawImport::new(&cap[1], line, ImportKind::Import, false));
        }
    }
    out
}

fn extract_c(stream: &NormalizedStream) -> Vec<RawImport> {
    code_lines(stream)
        .filter_map(|(line, code)| {
            let cap = C_INCLUDE.captures(code)?;
            let quoted = &cap[1] == "\"";
            let kind = if quoted {
                ImportKind::Include
            } else {
                ImportKind::SystemInclude
            };
            Some(RawImport::new(&cap[2], line, kind, quoted))
        })
        .collect()
}

fn extract_php(stream: &NormalizedStream) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (line, code) in code_lines(stream) {
        for cap in PHP_REQUIRE.captures_iter(code) {
            out.push(RawImport::new(
                cap[1].trim_start_matches('/'),
                line,
                ImportKind::Require,
                true,
            ));
        }
        if let Some(cap) = PHP_USE.captures(code) {
            out.push(RawImport::new(
                cap[1].trim_start_matches('\\'),
                line,
                ImportKind::Use,
                false,
            ));
        }
    }
    out
}

fn extract_ruby(stream: &NormalizedStream) -> Vec<RawImport> {
    code_lines(stream)
        .filter_map(|(line, code)| {
            let cap = RB_REQUIRE.captures(code)?;
            let relative = &cap[1] == "require_relative";
            let target = if relative && !cap[2].starts_with('.') {
                format!("./{}", &cap[2])
            } else {
                cap[2].to_string()
            };
            let local = relative || target.starts_with('.');
            Some(RawImport::new(target, line, ImportKind::Require, local))
        })
        .collect()
}

fn extract_shell(stream: &NormalizedStream) -> Vec<RawImport> {
    code_lines(stream)
        .filter_map(|(line, code)| {
            let cap = SH_SOURCE.captures(code)?;
            let target = &cap[1];
            // Paths built from variables cannot be resolved lexically.
            if target.contains('$') {
                return None;
            }
            Some(RawImport::new(target, line, ImportKind::Source, true))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn targets(text: &str, language: Language) -> Vec<(String, u32, bool)> {
        extract(&normalize(text, language))
            .into_iter()
            .map(|i| (i.target, i.line, i.local))
            .collect()
    }

    fn t(target: &str, line: u32, local: bool) -> (String, u32, bool) {
        (target.to_string(), line, local)
    }

    #[test]
    fn javascript_forms() {
        let src = "\
import React from 'react';
import './styles.css';
export { a } from \"./a\";
const b = require('./b');
// import gone from './gone';
const c = await import('./c');
";
        assert_eq!(
            targets(src, Language::JavaScript),
            vec![
                t("react", 1, false),
                t("./styles.css", 2, true),
                t("./a", 3, true),
                t("./b", 4, true),
                t("./c", 6, true),
            ]
        );
    }

    #[test]
    fn python_forms() {
        let src = "import os, sys as system\nfrom . import util, models\nfrom ..core.db import Session\nfrom pkg.mod import *\n";
        assert_eq!(
            targets(src, Language::Python),
            vec![
                t("os", 1, false),
                t("sys", 1, false),
                t(".util", 2, true),
                t(".models", 2, true),
                t("..core.db", 3, true),
                t("pkg.mod", 4, false),
            ]
        );
    }

    #[test]
    fn rust_mod_and_nested_use() {
        let src = "\
mod config;
pub(crate) mod report;
use std::collections::{BTreeMap, BTreeSet};
use crate::{
    config::Config,
    report::{self, Finding},
};
mod tests {}
";
        assert_eq!(
            targets(src, Language::Rust),
            vec![
                t("config", 1, true),
                t("report", 2, true),
                t("std::collections::BTreeMap", 3, false),
                t("std::collections::BTreeSet", 3, false),
                t("crate::config::Config", 4, false),
                t("crate::report", 4, false),
                t("crate::report::Finding", 4, false),
            ]
        );
    }

    #[test]
    fn go_import_block() {
        let src = "package main\n\nimport (\n\t\"fmt\"\n\tlog \"example.com/app/log\"\n)\nimport \"os\"\n";
        assert_eq!(
            targets(src, Language::Go),
            vec![
                t("fmt", 4, false),
                t("example.com/app/log", 5, false),
                t("os", 7, false),
            ]
        );
    }

    #[test]
    fn c_and_ruby_and_shell() {
        assert_eq!(
            targets("#include <stdio.h>\n#include \"util.h\"\n", Language::C),
            vec![t("stdio.h", 1, false), t("util.h", 2, true)]
        );
        assert_eq!(
            targets("require 'json'\nrequire_relative 'lib/helper'\n", Language::Ruby),
            vec![t("json", 1, false), t("./lib/helper", 2, true)]
        );
        assert_eq!(
            targets("source ./env.sh\n. \"$HOME/.rc\"\n", Language::Shell),
            vec![t("./env.sh", 1, true)]
        );
    }
}
