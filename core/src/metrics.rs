//! Structural metrics from a normalized stream.
//!
//! Function units, nesting and complexity are heuristics over the masked text: header regexes per
//! language, balanced brace matching for brace languages and indentation tracking for Python and
//! Ruby. Complexity is `1 + decision points`, an approximation of cyclomatic complexity rather than
//! a control-flow-graph measurement.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::language::{BlockStyle, Language};
use crate::normalize::{Line, NormalizedStream};
use crate::report::{FileStats, LineRange};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionUnit {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub parameter_count: usize,
    pub parameters: Vec<String>,
    pub nesting_depth: usize,
    pub statement_count: usize,
    pub complexity: usize,
    /// Code of the first statement in the body, used for pass-through detection.
    pub first_statement: Option<String>,
}

impl FunctionUnit {
    pub fn range(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }

    pub fn line_count(&self) -> usize {
        (self.end_line - self.start_line + 1) as usize
    }
}

/// A loop body. `depth` is 1 for an outermost loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopRegion {
    pub range: LineRange,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Reliability {
    Reliable,
    Unreliable { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetrics {
    pub total_lines: u32,
    pub code_lines: u32,
    pub comment_lines: u32,
    pub blank_lines: u32,
    pub max_line_length: usize,
    pub avg_line_length: f64,
    pub comment_density: f64,
    pub functions: Vec<FunctionUnit>,
    pub loops: Vec<LoopRegion>,
    pub reliability: Reliability,
}

impl FileMetrics {
    pub fn is_reliable(&self) -> bool {
        self.reliability == Reliability::Reliable
    }

    pub fn avg_complexity(&self) -> f64 {
        if self.functions.is_empty() {
            return 0.0;
        }
        let total: usize = self.functions.iter().map(|f| f.complexity).sum();
        total as f64 / self.functions.len() as f64
    }

    pub fn max_nesting(&self) -> usize {
        self.functions
            .iter()
            .map(|f| f.nesting_depth)
            .max()
            .unwrap_or(0)
    }

    /// Innermost loop region containing `line`, if any.
    pub fn loop_at(&self, line: u32) -> Option<&LoopRegion> {
        self.loops
            .iter()
            .filter(|l| l.range.start <= line && line <= l.range.end)
            .max_by_key(|l| l.depth)
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            code_lines: self.code_lines,
            comment_lines: self.comment_lines,
            blank_lines: self.blank_lines,
            functions: self.functions.len(),
            max_line_length: self.max_line_length,
            avg_line_length: round2(self.avg_line_length),
            comment_density: round2(self.comment_density),
            avg_complexity: round2(self.avg_complexity()),
            max_nesting_depth: self.max_nesting(),
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn extract(stream: &NormalizedStream) -> FileMetrics {
    let mut metrics = line_statistics(stream);
    let style = stream.language.block_style();
    if style == BlockStyle::None || !stream.comment_aware {
        return metrics;
    }
    if !delimiters_balanced(stream) {
        metrics.reliability = Reliability::Unreliable {
            reason: "unbalanced delimiters".into(),
        };
        return metrics;
    }

    match style {
        BlockStyle::Braces => {
            let blocks = scan_blocks(stream);
            metrics.functions = brace_units(stream, &blocks);
            metrics.loops = blocks
                .iter()
                .filter(|b| b.is_loop)
                .map(|b| LoopRegion {
                    range: LineRange::new(b.open.0 as u32 + 1, b.close.0 as u32 + 1),
                    depth: b.loop_depth,
                })
                .collect();
        }
        BlockStyle::Indentation => {
            metrics.functions = indent_units(stream);
            metrics.loops = indent_loops(stream);
        }
        BlockStyle::None => {}
    }
    metrics
}

fn line_statistics(stream: &NormalizedStream) -> FileMetrics {
    let mut code_lines = 0u32;
    let mut comment_lines = 0u32;
    let mut blank_lines = 0u32;
    let mut max_len = 0usize;
    let mut total_len = 0usize;
    for line in &stream.lines {
        if line.is_blank {
            blank_lines += 1;
            continue;
        }
        if line.is_comment_only {
            comment_lines += 1;
        } else {
            code_lines += 1;
        }
        let len = line.raw.chars().count();
        max_len = max_len.max(len);
        total_len += len;
    }
    let non_blank = code_lines + comment_lines;
    FileMetrics {
        total_lines: stream.lines.len() as u32,
        code_lines,
        comment_lines,
        blank_lines,
        max_line_length: max_len,
        avg_line_length: if non_blank == 0 {
            0.0
        } else {
            total_len as f64 / non_blank as f64
        },
        comment_density: if non_blank == 0 {
            0.0
        } else {
            comment_lines as f64 / non_blank as f64
        },
        functions: Vec::new(),
        loops: Vec::new(),
        reliability: Reliability::Reliable,
    }
}

fn delimiters_balanced(stream: &NormalizedStream) -> bool {
    // Shell `case` arms close parens that were never opened.
    let braces_only = stream.language == Language::Shell;
    let mut stack = Vec::new();
    for line in &stream.lines {
        for ch in line.masked.chars() {
            let expected = match ch {
                '(' | '[' if braces_only => continue,
                ')' | ']' if braces_only => continue,
                '(' | '[' | '{' => {
                    stack.push(ch);
                    continue;
                }
                ')' => '(',
                ']' => '[',
                '}' => '{',
                _ => continue,
            };
            if stack.pop() != Some(expected) {
                return false;
            }
        }
    }
    stack.is_empty()
}

/// (line index, byte offset into `masked`).
type Pos = (usize, usize);

fn scan_from(lines: &[Line], start: Pos, max_lines: usize) -> impl Iterator<Item = (Pos, char)> + '_ {
    let (first, offset) = start;
    lines
        .iter()
        .enumerate()
        .skip(first)
        .take(max_lines)
        .flat_map(move |(idx, line)| {
            let from = if idx == first {
                offset.min(line.masked.len())
            } else {
                0
            };
            line.masked[from..]
                .char_indices()
                .map(move |(off, ch)| ((idx, from + off), ch))
        })
}

fn match_delim(lines: &[Line], open: Pos, open_ch: char, close_ch: char, max_lines: usize) -> Option<Pos> {
    let mut depth = 0usize;
    for (pos, ch) in scan_from(lines, open, max_lines) {
        if ch == open_ch {
            depth += 1;
        } else if ch == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(pos);
            }
        }
    }
    None
}

/// Masked text strictly between `open` and `close`, lines joined by a space.
fn text_between(lines: &[Line], open: Pos, close: Pos) -> String {
    let mut out = String::new();
    let mut current = open.0;
    for (pos, ch) in scan_from(lines, (open.0, open.1 + 1), close.0 - open.0 + 1) {
        if pos >= close {
            break;
        }
        if pos.0 != current {
            out.push(' ');
            current = pos.0;
        }
        out.push(ch);
    }
    out
}

fn byte_at_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(b, _)| b).unwrap_or(s.len())
}

/// The `code` text matching a byte range of `masked`; both have the same char count.
fn code_slice(line: &Line, from: usize, to: usize) -> &str {
    let from_char = line.masked[..from].chars().count();
    let to_char = line.masked[..to].chars().count();
    let start = byte_at_char(&line.code, from_char);
    let end = byte_at_char(&line.code, to_char);
    &line.code[start..end.max(start)]
}

fn is_statement(masked: &str) -> bool {
    masked
        .chars()
        .any(|c| !c.is_whitespace() && !"{}()[];,\"'`".contains(c))
}

fn indent_width(text: &str) -> usize {
    let mut width = 0;
    for ch in text.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

fn is_decision_word(word: &str, language: Language) -> bool {
    match word {
        "if" | "for" | "while" | "case" | "catch" => true,
        "elif" | "except" => language == Language::Python || language == Language::Shell,
        "elsif" | "unless" | "rescue" => language == Language::Ruby,
        "until" => matches!(language, Language::Ruby | Language::Shell),
        "when" => matches!(language, Language::Ruby | Language::Kotlin),
        "elseif" => language == Language::Php,
        "foreach" => matches!(language, Language::CSharp | Language::Php),
        "guard" => language == Language::Swift,
        "and" | "or" => matches!(language, Language::Python | Language::Ruby),
        _ => false,
    }
}

fn decision_points(masked: &str, language: Language) -> usize {
    let words = WORD_RE
        .find_iter(masked)
        .filter(|m| is_decision_word(m.as_str(), language))
        .count();
    let mut count = words + masked.matches("&&").count() + masked.matches("||").count();
    if language.has_ternary() {
        count += masked.matches(" ? ").count();
    }
    count
}

const CONTROL_WORDS: &[&str] = &[
    "if", "else", "for", "while", "loop", "do", "switch", "match", "try", "catch", "finally",
    "foreach", "when", "guard", "repeat", "select", "forEach", "for_each",
];

const LOOP_WORDS: &[&str] = &[
    "for", "while", "loop", "do", "foreach", "forEach", "for_each", "repeat",
];

#[derive(Debug, Clone)]
struct Block {
    open: Pos,
    close: Pos,
    is_loop: bool,
    control_depth: usize,
    loop_depth: usize,
}

/// Every `{ ... }` block in the file, in opening order, tagged with the control/loop keyword
/// that introduced it.
fn scan_blocks(stream: &NormalizedStream) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut pending_control = false;
    let mut pending_loop = false;
    let mut pending_impl = false;
    let mut parens = 0usize;
    // Line of the pending control keyword; Go headers carry `;` without parentheses.
    let mut control_line: Option<usize> = None;
    let last = stream.lines.len().saturating_sub(1);

    for (idx, line) in stream.lines.iter().enumerate() {
        let mut word_start: Option<usize> = None;
        let masked = line.masked.as_str();
        for (pos, ch) in masked.char_indices().chain(std::iter::once((masked.len(), ' '))) {
            if ch.is_alphanumeric() || ch == '_' {
                word_start.get_or_insert(pos);
                continue;
            }
            if let Some(start) = word_start.take() {
                let word = &masked[start..pos];
                if word == "impl" && stream.language == Language::Rust {
                    pending_impl = true;
                }
                if CONTROL_WORDS.contains(&word) {
                    pending_control = true;
                    control_line = Some(idx);
                }
                if LOOP_WORDS.contains(&word) {
                    pending_loop = true;
                }
            }
            match ch {
                '(' | '[' => parens += 1,
                ')' | ']' => parens = parens.saturating_sub(1),
                ';' if parens == 0
                    && !(stream.language == Language::Go
                        && pending_control
                        && control_line == Some(idx)) =>
                {
                    pending_control = false;
                    pending_loop = false;
                    pending_impl = false;
                }
                '{' => {
                    let (control, looping) = if pending_impl {
                        (false, false)
                    } else {
                        (pending_control, pending_loop)
                    };
                    let (parent_control, parent_loop) = stack
                        .last()
                        .map(|&i| (blocks[i].control_depth, blocks[i].loop_depth))
                        .unwrap_or((0, 0));
                    blocks.push(Block {
                        open: (idx, pos),
                        close: (last, 0),
                        is_loop: looping,
                        control_depth: parent_control + usize::from(control),
                        loop_depth: parent_loop + usize::from(looping),
                    });
                    stack.push(blocks.len() - 1);
                    pending_control = false;
                    pending_loop = false;
                    pending_impl = false;
                }
                '}' => {
                    if let Some(i) = stack.pop() {
                        blocks[i].close = (idx, pos);
                    }
                    pending_control = false;
                    pending_loop = false;
                    pending_impl = false;
                }
                _ => {}
            }
        }
    }
    blocks
}

fn header_patterns(language: Language) -> &'static [Regex] {
    static RUST: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![Regex::new(
            r#"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_]\w*)"#,
        )
        .unwrap()]
    });
    static JS: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![
            Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[\w$]+)").unwrap(),
            Regex::new(
                r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[\w$]+)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b\s*\*?\s*[\w$]*\s*)?",
            )
            .unwrap(),
            Regex::new(
                r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?(?P<name>[\w$]+)",
            )
            .unwrap(),
        ]
    });
    static C_LIKE: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![Regex::new(
            r"^\s*(?:(?:[A-Za-z_][\w:<>,\[\]\*&~\.\?]*|@\w+(?:\([^)]*\))?)\s+|[\*&]+\s*)*(?P<name>~?[A-Za-z_]\w*(?:::~?\w+)*)",
        )
        .unwrap()]
    });
    static GO: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)").unwrap()]
    });
    static KOTLIN: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![Regex::new(
            r"^\s*(?:(?:public|private|protected|internal|override|open|suspend|inline|operator|infix|tailrec|abstract|final|external)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>\w+)",
        )
        .unwrap()]
    });
    static SWIFT: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![
            Regex::new(
                r"^\s*(?:(?:public|private|internal|fileprivate|open|static|class|override|final|mutating|nonmutating|@\w+)\s+)*func\s+(?P<name>\w+)",
            )
            .unwrap(),
            Regex::new(
                r"^\s*(?:(?:public|private|internal|fileprivate|open|override|convenience|required|@\w+)\s+)*(?P<name>init)\??",
            )
            .unwrap(),
        ]
    });
    static PHP: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![Regex::new(
            r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?(?P<name>\w+)",
        )
        .unwrap()]
    });
    static SHELL: Lazy<Vec<Regex>> = Lazy::new(|| {
        vec![
            Regex::new(r"^\s*function\s+(?P<name>[\w\-:.]+)(?:\s*\(\s*\))?").unwrap(),
            Regex::new(r"^\s*(?P<name>[A-Za-z_][\w\-:.]*)\s*\(\s*\)").unwrap(),
        ]
    });

    match language {
        Language::Rust => &RUST,
        Language::JavaScript | Language::TypeScript => &JS,
        Language::C | Language::Cpp | Language::Java | Language::CSharp => &C_LIKE,
        Language::Go => &GO,
        Language::Kotlin => &KOTLIN,
        Language::Swift => &SWIFT,
        Language::Php => &PHP,
        Language::Shell => &SHELL,
        _ => &[],
    }
}

const NOT_FUNCTION_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "else", "do", "sizeof", "typeof",
    "foreach", "using", "lock", "fixed", "synchronized", "when", "match", "function", "try",
    "throw", "await", "yield", "defined", "assert", "elif", "case", "delete", "super", "this",
    "until", "unless", "with", "loop", "import", "export", "require",
];

fn has_angle_generics(language: Language) -> bool {
    matches!(
        language,
        Language::Rust
            | Language::TypeScript
            | Language::Java
            | Language::CSharp
            | Language::Cpp
            | Language::Kotlin
            | Language::Swift
    )
}

/// The parameter list's `(` when it directly follows the function name (generic parameter lists
/// in between are skipped).
fn find_param_open(lines: &[Line], from: Pos, language: Language) -> Option<Pos> {
    let mut angle = 0usize;
    let mut square = 0usize;
    let mut prev = ' ';
    for (pos, ch) in scan_from(lines, from, 4) {
        if angle > 0 {
            match ch {
                '<' => angle += 1,
                '>' if prev != '-' && prev != '=' => angle -= 1,
                _ => {}
            }
        } else if square > 0 {
            match ch {
                '[' => square += 1,
                ']' => square -= 1,
                _ => {}
            }
        } else {
            match ch {
                '(' => return Some(pos),
                '<' if has_angle_generics(language) => angle = 1,
                '[' if language == Language::Go => square = 1,
                '?' | '!' if language == Language::Swift => {}
                c if c.is_whitespace() => {}
                _ => return None,
            }
        }
        prev = ch;
    }
    None
}

/// The `{` opening the body after a parameter list, or `None` for declarations and expression
/// bodies.
fn find_body_open(lines: &[Line], from: Pos) -> Option<Pos> {
    let mut iter = scan_from(lines, from, 8).peekable();
    let mut prev = ' ';
    while let Some((pos, ch)) = iter.next() {
        match ch {
            '{' => return Some(pos),
            ';' | '}' => return None,
            '=' => {
                let next = iter.peek().map(|(_, c)| *c);
                if next == Some('>') {
                    iter.next();
                    return iter
                        .find(|(_, c)| !c.is_whitespace())
                        .filter(|(_, c)| *c == '{')
                        .map(|(p, _)| p);
                }
                if next != Some('=') && !matches!(prev, '=' | '!' | '<' | '>') {
                    return None;
                }
            }
            _ => {}
        }
        prev = ch;
    }
    None
}

fn brace_units(stream: &NormalizedStream, blocks: &[Block]) -> Vec<FunctionUnit> {
    let patterns = header_patterns(stream.language);
    let mut units = Vec::new();
    let mut idx = 0;
    while idx < stream.lines.len() {
        match brace_unit_at(stream, blocks, patterns, idx) {
            Some(unit) => {
                idx = unit.end_line as usize;
                units.push(unit);
            }
            None => idx += 1,
        }
    }
    units
}

fn brace_unit_at(
    stream: &NormalizedStream,
    blocks: &[Block],
    patterns: &[Regex],
    idx: usize,
) -> Option<FunctionUnit> {
    let lines = &stream.lines;
    let language = stream.language;
    let line = &lines[idx];
    if line.is_blank || line.is_comment_only {
        return None;
    }

    for re in patterns {
        let Some(caps) = re.captures(&line.masked) else {
            continue;
        };
        let Some(name) = caps.name("name") else {
            continue;
        };
        if NOT_FUNCTION_NAMES.contains(&name.as_str()) {
            continue;
        }
        let header_end = (idx, caps.get(0).map_or(name.end(), |m| m.end()));

        let (params_text, after_params) = if language == Language::Shell {
            (String::new(), header_end)
        } else {
            let Some(open) = find_param_open(lines, header_end, language) else {
                continue;
            };
            let Some(close) = match_delim(lines, open, '(', ')', 40) else {
                continue;
            };
            (text_between(lines, open, close), (close.0, close.1 + 1))
        };

        let Some(body_open) = find_body_open(lines, after_params) else {
            continue;
        };
        let body_idx = blocks.partition_point(|b| b.open < body_open);
        let Some(body) = blocks.get(body_idx).filter(|b| b.open == body_open) else {
            continue;
        };

        let nesting_depth = blocks[body_idx + 1..]
            .iter()
            .take_while(|b| b.open < body.close)
            .map(|b| b.control_depth.saturating_sub(body.control_depth))
            .max()
            .unwrap_or(0);

        let complexity = 1 + lines[idx..=body.close.0]
            .iter()
            .map(|l| decision_points(&l.masked, language))
            .sum::<usize>();

        let (statement_count, first_statement) = brace_statements(lines, body.open, body.close);
        let parameters = split_parameters(&params_text, language);

        return Some(FunctionUnit {
            name: name.as_str().to_string(),
            start_line: idx as u32 + 1,
            end_line: body.close.0 as u32 + 1,
            parameter_count: parameters.len(),
            parameters,
            nesting_depth,
            statement_count,
            complexity,
            first_statement,
        });
    }
    None
}

fn brace_statements(lines: &[Line], open: Pos, close: Pos) -> (usize, Option<String>) {
    let mut count = 0;
    let mut first = None;
    for idx in open.0..=close.0 {
        let line = &lines[idx];
        if line.is_blank || line.is_comment_only {
            continue;
        }
        let from = if idx == open.0 { open.1 + 1 } else { 0 };
        let to = if idx == close.0 {
            close.1
        } else {
            line.masked.len()
        };
        if from >= to {
            continue;
        }
        if is_statement(&line.masked[from..to]) {
            count += 1;
            if first.is_none() {
                first = Some(code_slice(line, from, to).trim().to_string());
            }
        }
    }
    (count, first)
}

static PARAM_IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

/// Split a parameter list on top-level commas and reduce each entry to its name.
fn split_parameters(text: &str, language: Language) -> Vec<String> {
    let generics = has_angle_generics(language);
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut prev = ' ';
    for ch in text.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            '<' if generics => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if generics && prev != '-' && prev != '=' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                prev = ch;
                continue;
            }
            _ => {}
        }
        current.push(ch);
        prev = ch;
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|part| parameter_name(part, language))
        .collect()
}

fn parameter_name(part: &str, language: Language) -> Option<String> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    let head = match language {
        Language::C | Language::Cpp | Language::Java | Language::CSharp => {
            let head = part.split('=').next().unwrap_or(part);
            head.split('[').next().unwrap_or(head)
        }
        _ => part
            .split(|c: char| c == ':' || c == '=')
            .next()
            .unwrap_or(part),
    };
    let mut idents = PARAM_IDENT_RE.find_iter(head).map(|m| m.as_str());
    let name = if language == Language::Go {
        idents.next()?
    } else {
        idents.last()?
    };
    if matches!(name, "self" | "this" | "void" | "mut") {
        return None;
    }
    if name == "cls" && language == Language::Python {
        return None;
    }
    Some(name.to_string())
}

static PY_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:async\s+)?def\s+(?P<name>\w+)").unwrap());
static RB_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+(?P<name>(?:self\.)?\w+[?!=]?)").unwrap());
static RB_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*end\b").unwrap());
static RB_INLINE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[;\s]end\s*$").unwrap());

/// Lines that carry structure for indentation tracking. Blank lines, comments and the inside of
/// multi-line strings do not.
fn is_structural(line: &Line) -> bool {
    let trimmed = line.masked.trim();
    !trimmed.is_empty() && !trimmed.chars().all(|c| c == '"' || c == '\'')
}

fn indent_units(stream: &NormalizedStream) -> Vec<FunctionUnit> {
    let mut units = Vec::new();
    let mut idx = 0;
    while idx < stream.lines.len() {
        let unit = match stream.language {
            Language::Python => python_unit_at(stream, idx),
            Language::Ruby => ruby_unit_at(stream, idx),
            _ => None,
        };
        match unit {
            Some(unit) => {
                idx = unit.end_line as usize;
                units.push(unit);
            }
            None => idx += 1,
        }
    }
    units
}

/// Last structural line indented deeper than `indent`, scanning from `from`.
fn last_deeper_line(lines: &[Line], from: usize, indent: usize) -> Option<usize> {
    let mut end = None;
    for (idx, line) in lines.iter().enumerate().skip(from) {
        if !is_structural(line) {
            continue;
        }
        if indent_width(&line.raw) <= indent {
            break;
        }
        end = Some(idx);
    }
    end
}

fn python_unit_at(stream: &NormalizedStream, idx: usize) -> Option<FunctionUnit> {
    let lines = &stream.lines;
    let line = &lines[idx];
    let caps = PY_DEF_RE.captures(&line.masked)?;
    let name = caps.name("name")?;
    let indent = indent_width(&line.raw);

    let open = find_param_open(lines, (idx, name.end()), Language::Python)?;
    let close = match_delim(lines, open, '(', ')', 40)?;
    let params_text = text_between(lines, open, close);

    // Header ends at the first top-level `:` after the parameters (skipping `-> T`).
    let mut colon = None;
    let mut depth = 0usize;
    for (pos, ch) in scan_from(lines, (close.0, close.1 + 1), 6) {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                colon = Some(pos);
                break;
            }
            _ => {}
        }
    }
    let colon = colon?;
    let header_line = &lines[colon.0];
    let inline_from = colon.1 + 1;
    let inline = is_statement(&header_line.masked[inline_from..]);

    let body_end = last_deeper_line(lines, colon.0 + 1, indent);
    let end_idx = match (body_end, inline) {
        (Some(end), _) => end,
        (None, true) => colon.0,
        (None, false) => return None,
    };

    let mut count = 0;
    let mut first = None;
    if inline {
        count += 1;
        first = Some(code_slice(header_line, inline_from, header_line.masked.len()).trim().to_string());
    }
    for body_line in &lines[colon.0 + 1..=end_idx.max(colon.0)] {
        if body_line.number as usize > end_idx + 1 || body_line.is_comment_only {
            continue;
        }
        if is_statement(&body_line.masked) {
            count += 1;
            if first.is_none() {
                first = Some(body_line.code.trim().to_string());
            }
        }
    }

    let body = &lines[idx..=end_idx];
    let complexity = 1 + body
        .iter()
        .map(|l| decision_points(&l.masked, Language::Python))
        .sum::<usize>();
    let parameters = split_parameters(&params_text, Language::Python);

    Some(FunctionUnit {
        name: name.as_str().to_string(),
        start_line: idx as u32 + 1,
        end_line: end_idx as u32 + 1,
        parameter_count: parameters.len(),
        parameters,
        nesting_depth: indent_nesting(&lines[colon.0 + 1..=end_idx.max(colon.0)], Language::Python),
        statement_count: count,
        complexity,
        first_statement: first,
    })
}

fn ruby_unit_at(stream: &NormalizedStream, idx: usize) -> Option<FunctionUnit> {
    let lines = &stream.lines;
    let line = &lines[idx];
    let caps = RB_DEF_RE.captures(&line.masked)?;
    let name = caps.name("name")?;
    let indent = indent_width(&line.raw);

    let rest = &line.masked[name.end()..];
    let params_text = if rest.trim_start().starts_with('(') {
        let open = find_param_open(lines, (idx, name.end()), Language::Ruby)?;
        let close = match_delim(lines, open, '(', ')', 40)?;
        text_between(lines, open, close)
    } else {
        rest.split(';').next().unwrap_or("").to_string()
    };

    let end_idx = if RB_INLINE_END_RE.is_match(&line.masked) {
        idx
    } else {
        let mut found = None;
        for (j, candidate) in lines.iter().enumerate().skip(idx + 1) {
            if !is_structural(candidate) {
                continue;
            }
            let candidate_indent = indent_width(&candidate.raw);
            if candidate_indent == indent && RB_END_RE.is_match(&candidate.masked) {
                found = Some(j);
                break;
            }
            if candidate_indent < indent {
                break;
            }
        }
        found?
    };

    let body: &[Line] = if end_idx > idx {
        &lines[idx + 1..end_idx]
    } else {
        &[]
    };
    let mut count = 0;
    let mut first = None;
    if end_idx == idx {
        let inline = line.code.splitn(2, ';').nth(1).unwrap_or("");
        let inline = inline.trim().trim_end_matches("end").trim().trim_end_matches(';');
        if !inline.trim().is_empty() {
            count = 1;
            first = Some(inline.trim().to_string());
        }
    }
    for body_line in body {
        if body_line.is_comment_only {
            continue;
        }
        if is_statement(&body_line.masked) {
            count += 1;
            if first.is_none() {
                first = Some(body_line.code.trim().to_string());
            }
        }
    }

    let complexity = 1 + lines[idx..=end_idx]
        .iter()
        .map(|l| decision_points(&l.masked, Language::Ruby))
        .sum::<usize>();
    let parameters = split_parameters(&params_text, Language::Ruby);

    Some(FunctionUnit {
        name: name.as_str().to_string(),
        start_line: idx as u32 + 1,
        end_line: end_idx as u32 + 1,
        parameter_count: parameters.len(),
        parameters,
        nesting_depth: indent_nesting(body, Language::Ruby),
        statement_count: count,
        complexity,
        first_statement: first,
    })
}

static PY_CONTROL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:if|elif|else|for|while|try|except|finally|with|match|case|async\s+for|async\s+with)\b.*:")
        .unwrap()
});
static RB_CONTROL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:if|unless|while|until|for|case|begin|else|elsif|when|rescue|ensure)\b|\bdo(?:\s*\|[^|]*\|)?\s*$")
        .unwrap()
});

fn indent_nesting(body: &[Line], language: Language) -> usize {
    let control = match language {
        Language::Python => &*PY_CONTROL_RE,
        _ => &*RB_CONTROL_RE,
    };
    let mut stack: Vec<usize> = Vec::new();
    let mut max = 0;
    for line in body {
        if !is_structural(line) {
            continue;
        }
        let indent = indent_width(&line.raw);
        while stack.last().map_or(false, |&top| top >= indent) {
            stack.pop();
        }
        if control.is_match(&line.masked) {
            stack.push(indent);
            max = max.max(stack.len());
        }
    }
    max
}

static PY_LOOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:async\s+)?(?:for|while)\b.*:").unwrap());
static RB_LOOP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:while|until|for)\b|\b(?:loop|each\w*|times|upto|downto|map|select)\s*(?:\([^)]*\))?\s*(?:do|\{)(?:\s*\|[^|]*\|)?\s*$")
        .unwrap()
});

fn indent_loops(stream: &NormalizedStream) -> Vec<LoopRegion> {
    let lines = &stream.lines;
    let loop_re = match stream.language {
        Language::Python => &*PY_LOOP_RE,
        Language::Ruby => &*RB_LOOP_RE,
        _ => return Vec::new(),
    };

    let mut regions = Vec::new();
    let mut open: Vec<u32> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !loop_re.is_match(&line.masked) {
            continue;
        }
        let indent = indent_width(&line.raw);
        let end_idx = if stream.language == Language::Ruby {
            lines
                .iter()
                .enumerate()
                .skip(idx + 1)
                .find(|(_, l)| {
                    is_structural(l)
                        && indent_width(&l.raw) == indent
                        && (RB_END_RE.is_match(&l.masked) || l.masked.trim_start().starts_with('}'))
                })
                .map(|(j, _)| j)
                .or_else(|| last_deeper_line(lines, idx + 1, indent))
        } else {
            last_deeper_line(lines, idx + 1, indent)
        };
        let Some(end_idx) = end_idx else {
            continue;
        };
        let start = idx as u32 + 1;
        open.retain(|&end| end >= start);
        regions.push(LoopRegion {
            range: LineRange::new(start, end_idx as u32 + 1),
            depth: open.len() + 1,
        });
        open.push(end_idx as u32 + 1);
    }
    regions
}
