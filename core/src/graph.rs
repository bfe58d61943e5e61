//! Import dependency graph.
//!
//! Resolution runs after every file's imports have been extracted and only consults the set of
//! scanned paths, never the file system. References that resolve become edges between internal
//! nodes; everything else becomes an external node named after the package or module.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::imports::{ImportKind, RawImport};
use crate::language::Language;
use crate::report::{Category, Finding, LineRange, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleNode {
    pub id: usize,
    /// File path for internal nodes, package/module name for external ones.
    pub name: String,
    pub internal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyEdge {
    pub source: usize,
    pub target: usize,
    /// First line in `source` that references `target`.
    pub line: u32,
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyGraph {
    pub nodes: Vec<ModuleNode>,
    pub edges: Vec<DependencyEdge>,
    /// Each cycle lists node ids starting at its smallest id; the closing edge is implied.
    pub cycles: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn node(&self, id: usize) -> Option<&ModuleNode> {
        self.nodes.get(id)
    }

    pub fn resolved_edges(&self) -> usize {
        self.edges.iter().filter(|e| e.resolved).count()
    }

    pub fn external_modules(&self) -> usize {
        self.nodes.iter().filter(|n| !n.internal).count()
    }
}

/// One scanned file and the references found in it.
#[derive(Debug, Clone)]
pub struct FileImports {
    pub path: String,
    pub language: Language,
    pub imports: Vec<RawImport>,
}

const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

fn file_name(path: &str) -> &str {
    path.rfind('/').map_or(path, |idx| &path[idx + 1..])
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    name.rfind('.').filter(|&i| i > 0).map_or(name, |i| &name[..i])
}

/// Join `rel` onto `dir`, folding `.` and `..`. `None` when `..` climbs above the root.
fn join(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Lookup structures over the scanned paths.
struct Resolver<'a> {
    paths: BTreeSet<&'a str>,
    by_name: BTreeMap<&'a str, Vec<&'a str>>,
    by_dir: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> Resolver<'a> {
    fn new(files: impl IntoIterator<Item = &'a FileImports>) -> Self {
        let mut resolver = Self {
            paths: BTreeSet::new(),
            by_name: BTreeMap::new(),
            by_dir: BTreeMap::new(),
        };
        for file in files {
            let path = file.path.as_str();
            resolver.paths.insert(path);
            resolver.by_name.entry(file_name(path)).or_default().push(path);
            resolver.by_dir.entry(parent_dir(path)).or_default().push(path);
        }
        for list in resolver
            .by_name
            .values_mut()
            .chain(resolver.by_dir.values_mut())
        {
            list.sort();
        }
        resolver
    }

    fn has(&self, path: &str) -> Option<String> {
        self.paths.contains(path).then(|| path.to_string())
    }

    fn first_of(&self, candidates: impl IntoIterator<Item = String>) -> Option<String> {
        candidates.into_iter().find_map(|c| self.has(&c))
    }

    /// Path whose segments end with `suffix` (slash separated); the shortest such path wins.
    fn by_suffix(&self, suffix: &str, extensions: &[&str]) -> Option<String> {
        let name = file_name(suffix);
        let mut hits: Vec<&str> = Vec::new();
        for ext in extensions {
            let wanted = format!("{name}.{ext}");
            if let Some(list) = self.by_name.get(wanted.as_str()) {
                let full = format!("{suffix}.{ext}");
                hits.extend(
                    list.iter()
                        .copied()
                        .filter(|p| *p == full || p.ends_with(&format!("/{full}"))),
                );
            }
        }
        hits.sort_by_key(|p| (p.len(), *p));
        hits.first().map(|p| p.to_string())
    }

    /// First non-test source file of a directory whose path ends with `suffix`.
    fn package_dir(&self, suffix: &str, extension: &str) -> Option<String> {
        let mut dirs: Vec<&&str> = self
            .by_dir
            .keys()
            .filter(|dir| **dir == suffix || dir.ends_with(&format!("/{suffix}")))
            .collect();
        dirs.sort_by_key(|d| (d.len(), **d));
        dirs.into_iter().find_map(|dir| {
            self.by_dir[*dir]
                .iter()
                .find(|p| p.ends_with(&format!(".{extension}")) && !p.ends_with("_test.go"))
                .map(|p| p.to_string())
        })
    }

    fn resolve(&self, from: &FileImports, import: &RawImport) -> Option<String> {
        let dir = parent_dir(&from.path);
        match from.language {
            Language::JavaScript | Language::TypeScript => self.resolve_js(dir, &import.target),
            Language::Python => self.resolve_python(&from.path, &import.target),
            Language::Rust => self.resolve_rust(&from.path, import),
            Language::Go => self.package_dir(&import.target, "go").or_else(|| {
                // Module-qualified paths: drop leading segments until a directory matches.
                let segs: Vec<&str> = import.target.split('/').collect();
                (1..segs.len()).find_map(|skip| self.package_dir(&segs[skip..].join("/"), "go"))
            }),
            Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => {
                self.resolve_dotted(&import.target, &["java", "kt", "kts", "cs", "swift"])
            }
            Language::C | Language::Cpp => {
                if import.kind == ImportKind::SystemInclude {
                    return None;
                }
                let stem = import.target.trim_end_matches(".hpp").trim_end_matches(".h");
                join(dir, &import.target)
                    .and_then(|p| self.has(&p))
                    .or_else(|| self.by_suffix(stem, &["h", "hpp", "hh"]))
            }
            Language::Php => match import.kind {
                ImportKind::Use => self.by_suffix(&import.target.replace('\\', "/"), &["php"]),
                _ => join(dir, &import.target).and_then(|p| self.has(&p)),
            },
            Language::Ruby => {
                let target = import.target.trim_end_matches(".rb");
                if import.local {
                    join(dir, target).and_then(|p| self.has(&format!("{p}.rb")))
                } else {
                    self.by_suffix(target, &["rb"])
                }
            }
            Language::Shell => join(dir, &import.target).and_then(|p| self.has(&p)),
            Language::Html | Language::Css | Language::Sql | Language::Unknown => None,
        }
    }

    fn resolve_js(&self, dir: &str, target: &str) -> Option<String> {
        if !target.starts_with('.') {
            return None;
        }
        let base = join(dir, target)?;
        let mut candidates = vec![base.clone()];
        candidates.extend(JS_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
        candidates.extend(JS_EXTENSIONS.iter().map(|ext| format!("{base}/index.{ext}")));
        self.first_of(candidates)
    }

    fn resolve_python(&self, from: &str, target: &str) -> Option<String> {
        let dots = target.len() - target.trim_start_matches('.').len();
        let module = &target[dots..];
        let module_path = module.replace('.', "/");
        let candidates = |base: &str| -> Vec<String> {
            if module_path.is_empty() {
                return vec![join_path(base, "__init__.py")];
            }
            let full = join_path(base, &module_path);
            vec![format!("{full}.py"), format!("{full}/__init__.py")]
        };

        if dots > 0 {
            let mut base = parent_dir(from).to_string();
            for _ in 1..dots {
                base = parent_dir(&base).to_string();
            }
            return self
                .first_of(candidates(&base))
                // `from .pkg import name` where `name` is not a module.
                .or_else(|| {
                    let parent = module.rsplit_once('.').map(|(head, _)| head).unwrap_or("");
                    let prefix = ".".repeat(dots);
                    (parent != module)
                        .then(|| self.resolve_python(from, &format!("{prefix}{parent}")))
                        .flatten()
                });
        }

        // Absolute imports: try every ancestor of the importer as a package root.
        let mut base = parent_dir(from).to_string();
        loop {
            if let Some(hit) = self.first_of(candidates(&base)) {
                return Some(hit);
            }
            if base.is_empty() {
                return None;
            }
            base = parent_dir(&base).to_string();
        }
    }

    /// Directory that holds the children of the module defined in `path`.
    fn rust_module_dir(path: &str) -> String {
        let dir = parent_dir(path);
        match file_name(path) {
            "lib.rs" | "main.rs" | "mod.rs" => dir.to_string(),
            _ => join_path(dir, file_stem(path)),
        }
    }

    fn rust_crate_root(&self, from: &str) -> Option<String> {
        let mut dir = parent_dir(from).to_string();
        loop {
            for root in ["lib.rs", "main.rs"] {
                if self.paths.contains(join_path(&dir, root).as_str()) {
                    return Some(dir);
                }
            }
            if dir.is_empty() {
                return None;
            }
            dir = parent_dir(&dir).to_string();
        }
    }

    fn rust_module_file(&self, base: &str, segments: &[&str]) -> Option<String> {
        let mut segments = segments.to_vec();
        while !segments.is_empty() {
            let full = join_path(base, &segments.join("/"));
            if let Some(hit) = self.first_of([format!("{full}.rs"), format!("{full}/mod.rs")]) {
                return Some(hit);
            }
            segments.pop();
        }
        None
    }

    fn resolve_rust(&self, from: &str, import: &RawImport) -> Option<String> {
        if import.kind == ImportKind::Mod {
            let dir = Self::rust_module_dir(from);
            return self.first_of([
                join_path(&dir, &format!("{}.rs", import.target)),
                join_path(&dir, &format!("{}/mod.rs", import.target)),
            ]);
        }

        let segments: Vec<&str> = import.target.split("::").filter(|s| !s.is_empty()).collect();
        let (first, rest) = segments.split_first()?;
        match *first {
            "crate" => {
                let root = self.rust_crate_root(from)?;
                self.rust_module_file(&root, rest)
            }
            "self" => self.rust_module_file(&Self::rust_module_dir(from), rest),
            "super" => {
                let mut base = parent_dir(&Self::rust_module_dir(from)).to_string();
                let mut rest = rest;
                while let Some(("super", tail)) = rest.split_first().map(|(h, t)| (*h, t)) {
                    base = parent_dir(&base).to_string();
                    rest = tail;
                }
                self.rust_module_file(&base, rest)
            }
            _ => {
                // 2018-style paths to a sibling module of the crate root.
                let root = self.rust_crate_root(from)?;
                self.rust_module_file(&root, &segments)
            }
        }
    }

    fn resolve_dotted(&self, target: &str, extensions: &[&str]) -> Option<String> {
        let segments: Vec<&str> = target.split('.').collect();
        if let Some(hit) = self.by_suffix(&segments.join("/"), extensions) {
            return Some(hit);
        }
        // Wildcard or static-member imports: match the package directory instead.
        (2..=segments.len()).rev().find_map(|keep| {
            let dir = segments[..keep].join("/");
            extensions.iter().find_map(|ext| self.package_dir(&dir, ext))
        })
    }
}

/// Name of the external node an unresolved reference becomes.
fn external_name(language: Language, import: &RawImport) -> String {
    let target = import.target.as_str();
    match language {
        Language::Rust => target.split("::").next().unwrap_or(target).to_string(),
        Language::Python => target.trim_start_matches('.').split('.').next().unwrap_or(target).to_string(),
        Language::JavaScript | Language::TypeScript if !target.starts_with('.') => {
            let mut parts = target.split('/');
            match (parts.next(), parts.next()) {
                (Some(scope), Some(pkg)) if scope.starts_with('@') => format!("{scope}/{pkg}"),
                (Some(pkg), _) => pkg.to_string(),
                _ => target.to_string(),
            }
        }
        _ => target.to_string(),
    }
}

/// Build the graph for `files`. Output does not depend on the order of `files`.
pub fn build(files: &[FileImports]) -> DependencyGraph {
    let mut files: Vec<&FileImports> = files.iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    let resolver = Resolver::new(files.iter().copied());

    let mut edge_targets: BTreeMap<(String, Target), u32> = BTreeMap::new();
    let mut externals: BTreeSet<String> = BTreeSet::new();

    for file in &files {
        for import in &file.imports {
            let target = match resolver.resolve(file, import) {
                // `crate::a::Item` written inside `a.rs` names an item, not a module import.
                Some(path)
                    if path == file.path
                        && file.language == Language::Rust
                        && import.kind == ImportKind::Use =>
                {
                    continue
                }
                Some(path) => Target::Internal(path),
                None => {
                    // Missing `mod` files and local Rust paths that name items rather than module
                    // files produce no edge.
                    if import.kind == ImportKind::Mod
                        || (import.kind == ImportKind::Use && is_local_rust_path(&import.target))
                    {
                        continue;
                    }
                    let name = external_name(file.language, import);
                    if name.is_empty() {
                        continue;
                    }
                    externals.insert(name.clone());
                    Target::External(name)
                }
            };
            edge_targets
                .entry((file.path.clone(), target))
                .and_modify(|line| *line = (*line).min(import.line))
                .or_insert(import.line);
        }
    }

    let mut nodes = Vec::new();
    let mut ids: BTreeMap<Target, usize> = BTreeMap::new();
    for file in &files {
        ids.insert(Target::Internal(file.path.clone()), nodes.len());
        nodes.push(ModuleNode {
            id: nodes.len(),
            name: file.path.clone(),
            internal: true,
            language: Some(file.language),
        });
    }
    for name in externals {
        ids.insert(Target::External(name.clone()), nodes.len());
        nodes.push(ModuleNode {
            id: nodes.len(),
            name,
            internal: false,
            language: None,
        });
    }

    let mut edges: Vec<DependencyEdge> = edge_targets
        .into_iter()
        .filter_map(|((source, target), line)| {
            let source = *ids.get(&Target::Internal(source))?;
            let resolved = matches!(target, Target::Internal(_));
            let target = *ids.get(&target)?;
            Some(DependencyEdge {
                source,
                target,
                line,
                resolved,
            })
        })
        .collect();
    edges.sort_by_key(|e| (e.source, e.target));

    let cycles = find_cycles(nodes.len(), &edges);
    DependencyGraph {
        nodes,
        edges,
        cycles,
    }
}

fn is_local_rust_path(target: &str) -> bool {
    matches!(target.split("::").next(), Some("crate" | "self" | "super"))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Internal(String),
    External(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Iterative three-colour DFS over resolved edges. Every back edge closes a cycle; cycles are
/// rotated to start at their smallest node and deduplicated.
pub fn find_cycles(node_count: usize, edges: &[DependencyEdge]) -> Vec<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for edge in edges.iter().filter(|e| e.resolved) {
        if edge.source < node_count && edge.target < node_count {
            adjacency[edge.source].push(edge.target);
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }

    let mut colour = vec![Colour::White; node_count];
    let mut found: BTreeSet<Vec<usize>> = BTreeSet::new();

    for root in 0..node_count {
        if colour[root] != Colour::White {
            continue;
        }
        // (node, index of the next neighbour to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        colour[root] = Colour::Grey;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&neighbour) = adjacency[node].get(top.1) {
                top.1 += 1;
                match colour[neighbour] {
                    Colour::White => {
                        colour[neighbour] = Colour::Grey;
                        stack.push((neighbour, 0));
                    }
                    Colour::Grey => {
                        let start = stack.iter().position(|(n, _)| *n == neighbour).unwrap_or(0);
                        let cycle: Vec<usize> = stack[start..].iter().map(|(n, _)| *n).collect();
                        found.insert(canonical_cycle(cycle));
                    }
                    Colour::Black => {}
                }
            } else {
                colour[node] = Colour::Black;
                stack.pop();
            }
        }
    }
    found.into_iter().collect()
}

fn canonical_cycle(mut cycle: Vec<usize>) -> Vec<usize> {
    if let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
    {
        cycle.rotate_left(min_pos);
    }
    cycle
}

/// `dependency/cycle` per cycle and `dependency/unresolved-import` per local reference that did
/// not resolve.
pub fn graph_findings(graph: &DependencyGraph, files: &[FileImports]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let name = |id: usize| graph.node(id).map_or("?", |n| n.name.as_str());

    for cycle in &graph.cycles {
        let Some(&first) = cycle.first() else {
            continue;
        };
        let second = cycle.get(1).copied().unwrap_or(first);
        let line = graph
            .edges
            .iter()
            .find(|e| e.source == first && e.target == second)
            .map_or(1, |e| e.line);
        let mut chain: Vec<&str> = cycle.iter().map(|&id| name(id)).collect();
        chain.push(name(first));
        findings.push(Finding::new(
            "dependency/cycle",
            Category::Dependency,
            Severity::Warning,
            name(first),
            LineRange::line(line),
            format!("import cycle: {}", chain.join(" -> ")),
        ));
    }

    let resolver = Resolver::new(files);
    for file in files {
        let mut reported = BTreeSet::new();
        for import in file.imports.iter().filter(|i| i.local) {
            if resolver.resolve(file, import).is_some()
                || !reported.insert((import.line, import.target.as_str()))
            {
                continue;
            }
            findings.push(Finding::new(
                "dependency/unresolved-import",
                Category::Dependency,
                Severity::Info,
                &file.path,
                LineRange::line(import.line),
                format!("`{}` does not match any scanned file", import.target),
            ));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, language: Language, imports: &[(&str, ImportKind, bool)]) -> FileImports {
        FileImports {
            path: path.to_string(),
            language,
            imports: imports
                .iter()
                .enumerate()
                .map(|(i, (target, kind, local))| RawImport {
                    target: target.to_string(),
                    line: i as u32 + 1,
                    kind: *kind,
                    local: *local,
                })
                .collect(),
        }
    }

    fn edge_names(graph: &DependencyGraph) -> Vec<(String, String, bool)> {
        graph
            .edges
            .iter()
            .map(|e| {
                (
                    graph.nodes[e.source].name.clone(),
                    graph.nodes[e.target].name.clone(),
                    e.resolved,
                )
            })
            .collect()
    }

    #[test]
    fn javascript_relative_and_packages() {
        let files = vec![
            file(
                "web/app.js",
                Language::JavaScript,
                &[
                    ("./util", ImportKind::Import, true),
                    ("./components", ImportKind::Import, true),
                    ("@scope/pkg/sub", ImportKind::Import, false),
                    ("./missing", ImportKind::Import, true),
                ],
            ),
            file("web/util.ts", Language::TypeScript, &[]),
            file("web/components/index.jsx", Language::JavaScript, &[]),
        ];
        let graph = build(&files);
        assert_eq!(
            edge_names(&graph),
            vec![
                ("web/app.js".into(), "web/components/index.jsx".into(), true),
                ("web/app.js".into(), "web/util.ts".into(), true),
                ("web/app.js".into(), "./missing".into(), false),
                ("web/app.js".into(), "@scope/pkg".into(), false),
            ]
        );
        let findings = graph_findings(&graph, &files);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "dependency/unresolved-import");
        assert_eq!(findings[0].range, LineRange::line(4));
    }

    #[test]
    fn three_file_cycle_reported_once() {
        let files = vec![
            file("c.py", Language::Python, &[("a", ImportKind::Import, false)]),
            file("a.py", Language::Python, &[("b", ImportKind::Import, false)]),
            file("b.py", Language::Python, &[("c", ImportKind::Import, false)]),
        ];
        let graph = build(&files);
        assert_eq!(graph.cycles, vec![vec![0, 1, 2]]);
        let findings = graph_findings(&graph, &files);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "import cycle: a.py -> b.py -> c.py -> a.py");
        assert_eq!(findings[0].path, "a.py");
    }

    #[test]
    fn self_import_is_a_one_file_cycle() {
        let files = vec![file("a.py", Language::Python, &[("a", ImportKind::Import, false)])];
        let graph = build(&files);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, graph.edges[0].target);
        assert_eq!(graph.cycles, vec![vec![0]]);
        let findings = graph_findings(&graph, &files);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "dependency/cycle");
        assert_eq!(findings[0].message, "import cycle: a.py -> a.py");
        assert_eq!(findings[0].range, LineRange::line(1));
    }

    #[test]
    fn python_relative_and_package_roots() {
        let files = vec![
            file(
                "src/app/main.py",
                Language::Python,
                &[
                    (".models", ImportKind::Import, true),
                    ("..shared.db", ImportKind::Import, true),
                    ("app.models", ImportKind::Import, false),
                    ("requests", ImportKind::Import, false),
                ],
            ),
            file("src/app/models/__init__.py", Language::Python, &[]),
            file("src/shared/db.py", Language::Python, &[]),
        ];
        let graph = build(&files);
        assert_eq!(
            edge_names(&graph),
            vec![
                ("src/app/main.py".into(), "src/app/models/__init__.py".into(), true),
                ("src/app/main.py".into(), "src/shared/db.py".into(), true),
                ("src/app/main.py".into(), "requests".into(), false),
            ]
        );
    }

    #[test]
    fn rust_modules_and_crate_paths() {
        let files = vec![
            file(
                "core/src/lib.rs",
                Language::Rust,
                &[
                    ("config", ImportKind::Mod, true),
                    ("detectors", ImportKind::Mod, true),
                    ("serde::Serialize", ImportKind::Use, false),
                ],
            ),
            file("core/src/config.rs", Language::Rust, &[("crate::report::Severity", ImportKind::Use, false)]),
            file("core/src/report.rs", Language::Rust, &[("crate::Engine", ImportKind::Use, false)]),
            file(
                "core/src/detectors/mod.rs",
                Language::Rust,
                &[("size", ImportKind::Mod, true), ("super::config::Config", ImportKind::Use, false)],
            ),
            file("core/src/detectors/size.rs", Language::Rust, &[("super::FileContext", ImportKind::Use, false)]),
        ];
        let graph = build(&files);
        let edges = edge_names(&graph);
        assert!(edges.contains(&("core/src/lib.rs".into(), "core/src/config.rs".into(), true)));
        assert!(edges.contains(&("core/src/lib.rs".into(), "core/src/detectors/mod.rs".into(), true)));
        assert!(edges.contains(&("core/src/lib.rs".into(), "serde".into(), false)));
        assert!(edges.contains(&("core/src/config.rs".into(), "core/src/report.rs".into(), true)));
        assert!(edges.contains(&("core/src/detectors/mod.rs".into(), "core/src/detectors/size.rs".into(), true)));
        assert!(edges.contains(&("core/src/detectors/mod.rs".into(), "core/src/config.rs".into(), true)));
        // `crate::Engine` names an item of the root module and `super::FileContext` one of the
        // parent; neither produces an edge.
        assert!(!edges.iter().any(|(from, _, _)| from == "core/src/report.rs"));
        assert!(!edges.iter().any(|(from, _, _)| from == "core/src/detectors/size.rs"));
    }

    #[test]
    fn dotted_imports_resolve_by_suffix() {
        let files = vec![
            file(
                "src/main/java/com/acme/App.java",
                Language::Java,
                &[
                    ("com.acme.util.Strings", ImportKind::Import, false),
                    ("java.util.List", ImportKind::Import, false),
                ],
            ),
            file("src/main/java/com/acme/util/Strings.java", Language::Java, &[]),
        ];
        let graph = build(&files);
        assert_eq!(
            edge_names(&graph),
            vec![
                (
                    "src/main/java/com/acme/App.java".into(),
                    "src/main/java/com/acme/util/Strings.java".into(),
                    true
                ),
                ("src/main/java/com/acme/App.java".into(), "java.util.List".into(), false),
            ]
        );
    }

    #[test]
    fn cycles_are_canonical() {
        let edge = |source, target| DependencyEdge {
            source,
            target,
            line: 1,
            resolved: true,
        };
        let edges = vec![edge(2, 0), edge(0, 1), edge(1, 2), edge(1, 1)];
        assert_eq!(find_cycles(3, &edges), vec![vec![0, 1, 2], vec![1]]);
        assert_eq!(canonical_cycle(vec![5, 3, 4]), vec![3, 4, 5]);
    }
}
