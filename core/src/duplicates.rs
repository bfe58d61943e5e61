//! Cross-file duplicate block detection.
//!
//! The map phase ([`shingle`]) runs per file in parallel and hashes every K-line window of
//! logical lines. The reduce phase ([`find_duplicates`]) is sequential: it builds a posting list
//! per hash, links repeated windows, merges linked windows into runs and unions runs that are
//! linked to each other. Every connected component with two or more runs is a group.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::metrics::round2;
use crate::normalize::NormalizedStream;
use crate::report::{Category, Finding, LineRange, Severity};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_]{3,}").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DuplicateMember {
    pub path: String,
    /// Physical lines from the first to the last duplicated logical line.
    pub range: LineRange,
    pub logical_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DuplicateGroup {
    pub members: Vec<DuplicateMember>,
    /// Shortest member over longest member, in logical lines.
    pub similarity: f64,
}

impl DuplicateGroup {
    pub fn longest(&self) -> usize {
        self.members.iter().map(|m| m.logical_lines).max().unwrap_or(0)
    }

    /// Logical lines across all members.
    pub fn duplicated_lines(&self) -> u64 {
        self.members.iter().map(|m| m.logical_lines as u64).sum()
    }
}

/// Window hashes of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileShingles {
    pub path: String,
    /// Physical line number of every logical line.
    lines: Vec<u32>,
    /// One entry per window start; `None` for windows without a real word.
    windows: Vec<Option<u64>>,
}

impl FileShingles {
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

fn stable_hash64(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Hash every `window`-line window of logical lines (non-blank, not comment-only, whitespace
/// collapsed).
pub fn shingle(path: &str, stream: &NormalizedStream, window: usize) -> FileShingles {
    let mut lines = Vec::new();
    let mut texts = Vec::new();
    for line in &stream.lines {
        if line.is_blank || line.is_comment_only {
            continue;
        }
        let text = line.code.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        lines.push(line.number);
        texts.push(text);
    }

    let windows = if window == 0 || texts.len() < window {
        Vec::new()
    } else {
        texts
            .windows(window)
            .map(|chunk| {
                if !chunk.iter().any(|t| WORD_RE.is_match(t)) {
                    return None;
                }
                Some(stable_hash64(&chunk.join("\n")))
            })
            .collect()
    };

    FileShingles {
        path: path.to_string(),
        lines,
        windows,
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so components are labelled deterministically.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

struct Run {
    file: usize,
    first_window: usize,
    last_window: usize,
}

/// Group repeated windows across `files`. Output does not depend on the order of `files`.
pub fn find_duplicates(files: &[FileShingles], thresholds: &Thresholds) -> Vec<DuplicateGroup> {
    let k = thresholds.duplicate_window_size;
    let mut order: Vec<&FileShingles> = files.iter().collect();
    order.sort_by(|a, b| a.path.cmp(&b.path));

    let mut postings: BTreeMap<u64, Vec<(usize, usize)>> = BTreeMap::new();
    for (file, shingles) in order.iter().enumerate() {
        for (win, hash) in shingles.windows.iter().enumerate() {
            if let Some(hash) = hash {
                postings.entry(*hash).or_default().push((file, win));
            }
        }
    }

    let mut links: Vec<((usize, usize), (usize, usize))> = Vec::new();
    let mut linked: BTreeSet<(usize, usize)> = BTreeSet::new();
    for occurrences in postings.values() {
        if occurrences.len() < 2 || occurrences.len() > thresholds.duplicate_max_postings {
            continue;
        }
        for (i, a) in occurrences.iter().enumerate() {
            for b in &occurrences[i + 1..] {
                if a.0 == b.0 && b.1.abs_diff(a.1) < k {
                    continue;
                }
                links.push((*a, *b));
                linked.insert(*a);
                linked.insert(*b);
            }
        }
    }
    if links.is_empty() {
        return Vec::new();
    }

    // Contiguous linked windows of one file form a run.
    let mut runs: Vec<Run> = Vec::new();
    let mut run_of: BTreeMap<(usize, usize), usize> = BTreeMap::new();
    for &(file, win) in &linked {
        match runs.last_mut() {
            Some(run) if run.file == file && run.last_window + 1 == win => run.last_window = win,
            _ => runs.push(Run {
                file,
                first_window: win,
                last_window: win,
            }),
        }
        run_of.insert((file, win), runs.len() - 1);
    }

    let mut uf = UnionFind::new(runs.len());
    for (a, b) in &links {
        if let (Some(&ra), Some(&rb)) = (run_of.get(a), run_of.get(b)) {
            uf.union(ra, rb);
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..runs.len() {
        let root = uf.find(idx);
        components.entry(root).or_default().push(idx);
    }

    let mut groups = Vec::new();
    for members in components.values() {
        if members.len() < 2 {
            continue;
        }
        let mut out: Vec<DuplicateMember> = members
            .iter()
            .map(|&idx| {
                let run = &runs[idx];
                let shingles = order[run.file];
                let first = run.first_window;
                let last = run.last_window + k - 1;
                DuplicateMember {
                    path: shingles.path.clone(),
                    range: LineRange::new(shingles.lines[first], shingles.lines[last]),
                    logical_lines: last - first + 1,
                }
            })
            .collect();
        out.sort_by(|a, b| (&a.path, a.range.start).cmp(&(&b.path, b.range.start)));

        let longest = out.iter().map(|m| m.logical_lines).max().unwrap_or(0);
        let shortest = out.iter().map(|m| m.logical_lines).min().unwrap_or(0);
        if longest == 0 || longest < thresholds.duplicate_min_merged_length {
            continue;
        }
        let similarity = round2(shortest as f64 / longest as f64);
        if similarity < thresholds.duplicate_min_similarity {
            continue;
        }
        groups.push(DuplicateGroup {
            members: out,
            similarity,
        });
    }
    groups.sort_by(|a, b| {
        let key = |g: &DuplicateGroup| (g.members[0].path.clone(), g.members[0].range.start);
        key(a).cmp(&key(b))
    });
    groups
}

/// One `duplication/block` finding per group member.
pub fn duplicate_findings(groups: &[DuplicateGroup], thresholds: &Thresholds) -> Vec<Finding> {
    let mut findings = Vec::new();
    for group in groups {
        let severity = if group.longest() >= 4 * thresholds.duplicate_min_merged_length {
            Severity::Warning
        } else {
            Severity::Info
        };
        for (idx, member) in group.members.iter().enumerate() {
            let others: Vec<String> = group
                .members
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != idx)
                .map(|(_, m)| format!("{}:{}-{}", m.path, m.range.start, m.range.end))
                .collect();
            findings.push(
                Finding::new(
                    "duplication/block",
                    Category::Duplication,
                    severity,
                    &member.path,
                    member.range,
                    format!(
                        "{} duplicated lines, also at {}",
                        member.logical_lines,
                        others.join(", ")
                    ),
                )
                .with_confidence(group.similarity),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::normalize::normalize;

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

    fn shingles(path: &str, text: &str) -> FileShingles {
        shingle(path, &normalize(text, Language::Rust), 5)
    }

    #[test]
    fn identical_block_in_two_files() {
        let a = shingles("a.rs", BLOCK);
        let b = shingles("b.rs", &format!("fn other() {{}}\n\n{BLOCK}"));
        let groups = find_duplicates(&[a, b], &Thresholds::default());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.similarity, 1.0);
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.members[0].path, "a.rs");
        assert_eq!(group.members[0].range, LineRange::new(1, 8));
        assert_eq!(group.members[1].range, LineRange::new(3, 10));
        assert_eq!(group.members[1].logical_lines, 8);
    }

    #[test]
    fn order_of_inputs_does_not_matter() {
        let a = shingles("a.rs", BLOCK);
        let b = shingles("b.rs", BLOCK);
        let forward = find_duplicates(&[a.clone(), b.clone()], &Thresholds::default());
        let backward = find_duplicates(&[b, a], &Thresholds::default());
        assert_eq!(forward, backward);
    }

    #[test]
    fn punctuation_only_windows_are_ignored() {
        let text = "}\n}\n}\n}\n}\n}\n";
        let s = shingles("x.rs", text);
        assert!(s.windows.iter().all(Option::is_none));
        let groups = find_duplicates(&[s.clone(), shingles("y.rs", text)], &Thresholds::default());
        assert!(groups.is_empty());
    }

    #[test]
    fn short_matches_are_discarded() {
        let mut thresholds = Thresholds::default();
        thresholds.duplicate_min_merged_length = 9;
        let groups = find_duplicates(&[shingles("a.rs", BLOCK), shingles("b.rs", BLOCK)], &thresholds);
        assert!(groups.is_empty());
    }

    #[test]
    fn findings_point_at_each_other() {
        let groups = find_duplicates(
            &[shingles("a.rs", BLOCK), shingles("b.rs", BLOCK)],
            &Thresholds::default(),
        );
        let findings = duplicate_findings(&groups, &Thresholds::default());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].path, "a.rs");
        assert!(findings[0].message.contains("b.rs:1-8"));
        assert_eq!(findings[0].confidence, 1.0);
        assert_eq!(findings[0].severity, Severity::Info);
    }
}
