//! Comment and string aware line stream.
//!
//! The normalizer is a small state machine that runs across line boundaries. It never fails: an
//! unterminated block comment or multi-line string simply extends to the end of the file, and an
//! unterminated single-line string ends with its line.

use serde::{Deserialize, Serialize};

use crate::language::{Language, LexRules, StringRule};

/// One input line after lexical classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Line {
    pub number: u32,
    pub raw: String,
    /// `raw` with comments removed; string literals intact.
    pub code: String,
    /// `code` with string literal bodies blanked; delimiters are kept.
    pub masked: String,
    /// Comment text found on this line, markers included.
    pub comment: String,
    pub is_blank: bool,
    pub is_comment_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedStream {
    pub language: Language,
    /// False when the language has no lexical rules and every line is plain code.
    pub comment_aware: bool,
    pub lines: Vec<Line>,
}

impl NormalizedStream {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 1-based lookup.
    pub fn line(&self, number: u32) -> Option<&Line> {
        let idx = (number as usize).checked_sub(1)?;
        self.lines.get(idx)
    }

    /// Lines `start..=end` (1-based, clamped).
    pub fn span(&self, start: u32, end: u32) -> &[Line] {
        let lo = (start.max(1) as usize - 1).min(self.lines.len());
        let hi = (end as usize).min(self.lines.len()).max(lo);
        &self.lines[lo..hi]
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Code,
    Block {
        open: &'static str,
        close: &'static str,
        depth: usize,
    },
    Str(&'static StringRule),
}

#[derive(Default)]
struct LineParts {
    code: String,
    masked: String,
    comment: String,
}

/// Split `text` into lines (`str::lines` semantics) and classify every character as code, string
/// or comment.
pub fn normalize(text: &str, language: Language) -> NormalizedStream {
    let Some(rules) = language.lex_rules() else {
        return generic(text, language);
    };

    let mut state = State::Code;
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let mut parts = LineParts::default();
        state = lex_line(raw, rules, state, &mut parts);
        let is_blank = raw.trim().is_empty();
        let is_comment_only = !is_blank && parts.code.trim().is_empty();
        lines.push(Line {
            number: (idx + 1) as u32,
            raw: raw.to_string(),
            code: parts.code,
            masked: parts.masked,
            comment: parts.comment,
            is_blank,
            is_comment_only,
        });
    }

    NormalizedStream {
        language,
        comment_aware: true,
        lines,
    }
}

fn generic(text: &str, language: Language) -> NormalizedStream {
    let lines = text
        .lines()
        .enumerate()
        .map(|(idx, raw)| Line {
            number: (idx + 1) as u32,
            raw: raw.to_string(),
            code: raw.to_string(),
            masked: raw.to_string(),
            comment: String::new(),
            is_blank: raw.trim().is_empty(),
            is_comment_only: false,
        })
        .collect();
    NormalizedStream {
        language,
        comment_aware: false,
        lines,
    }
}

fn lex_line(raw: &str, rules: &'static LexRules, mut state: State, out: &mut LineParts) -> State {
    let mut i = 0;
    while i < raw.len() {
        let rest = &raw[i..];
        let Some(ch) = rest.chars().next() else {
            break;
        };
        match state {
            State::Block { open, close, depth } => {
                if rules.nested_block_comments && rest.starts_with(open) {
                    out.comment.push_str(open);
                    i += open.len();
                    state = State::Block {
                        open,
                        close,
                        depth: depth + 1,
                    };
                } else if rest.starts_with(close) {
                    out.comment.push_str(close);
                    i += close.len();
                    state = if depth <= 1 {
                        State::Code
                    } else {
                        State::Block {
                            open,
                            close,
                            depth: depth - 1,
                        }
                    };
                } else {
                    out.comment.push(ch);
                    i += ch.len_utf8();
                }
            }
            State::Str(rule) => {
                if Some(ch) == rule.escape {
                    out.code.push(ch);
                    out.masked.push(' ');
                    i += ch.len_utf8();
                    if let Some(next) = raw[i..].chars().next() {
                        out.code.push(next);
                        out.masked.push(' ');
                        i += next.len_utf8();
                    }
                } else if rest.starts_with(rule.close) {
                    out.code.push_str(rule.close);
                    out.masked.push_str(rule.close);
                    i += rule.close.len();
                    state = State::Code;
                } else {
                    out.code.push(ch);
                    out.masked.push(if ch == '\t' { '\t' } else { ' ' });
                    i += ch.len_utf8();
                }
            }
            State::Code => {
                if line_comment_at(rules, raw, i) {
                    out.comment.push_str(rest);
                    break;
                }
                if let Some(&(open, close)) = rules
                    .block_comments
                    .iter()
                    .find(|(open, _)| rest.starts_with(open))
                {
                    out.comment.push_str(open);
                    i += open.len();
                    state = State::Block {
                        open,
                        close,
                        depth: 1,
                    };
                    continue;
                }
                if let Some(rule) = string_at(rules, raw, i) {
                    if rule.char_literal {
                        if let Some(len) = char_literal_len(rest) {
                            let literal = &rest[..len];
                            out.code.push_str(literal);
                            out.masked.push('\'');
                            let inner = literal.chars().count().saturating_sub(2);
                            out.masked.extend(std::iter::repeat(' ').take(inner));
                            out.masked.push('\'');
                            i += len;
                        } else {
                            out.code.push(ch);
                            out.masked.push(ch);
                            i += ch.len_utf8();
                        }
                        continue;
                    }
                    out.code.push_str(rule.open);
                    out.masked.push_str(rule.open);
                    i += rule.open.len();
                    state = State::Str(rule);
                    continue;
                }
                out.code.push(ch);
                out.masked.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    if let State::Str(rule) = state {
        if !rule.multiline {
            state = State::Code;
        }
    }
    state
}

fn prev_char(raw: &str, i: usize) -> Option<char> {
    raw[..i].chars().next_back()
}

fn line_comment_at(rules: &LexRules, raw: &str, i: usize) -> bool {
    let rest = &raw[i..];
    if !rules.line_comments.iter().any(|m| rest.starts_with(m)) {
        return false;
    }
    if !rules.comment_needs_boundary {
        return true;
    }
    match prev_char(raw, i) {
        None => true,
        Some(c) => c.is_whitespace() || c == ';',
    }
}

fn string_at(rules: &'static LexRules, raw: &str, i: usize) -> Option<&'static StringRule> {
    let rest = &raw[i..];
    rules.strings.iter().find(|rule| {
        if !rest.starts_with(rule.open) {
            return false;
        }
        // Prefixed openers such as `r"` must not start in the middle of an identifier.
        let prefixed = rule
            .open
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic());
        if !prefixed {
            return true;
        }
        match prev_char(raw, i) {
            None => true,
            Some('b') => true,
            Some(c) => !(c.is_alphanumeric() || c == '_'),
        }
    })
}

/// Byte length of a character literal starting at `rest` (which begins with `'`), or `None` for
/// a lifetime or label.
fn char_literal_len(rest: &str) -> Option<usize> {
    let mut chars = rest.char_indices().skip(1);
    let (_, first) = chars.next()?;
    if first == '\\' {
        // '\n', '\'', '\x7f', '\u{1F600}'
        let (_, escaped) = chars.next()?;
        for (idx, c) in chars.take(10) {
            if c == '\'' {
                return Some(idx + 1);
            }
            if c == ' ' || (escaped != 'u' && c == '{') {
                return None;
            }
        }
        return None;
    }
    if first == '\'' {
        return None;
    }
    let (idx, second) = chars.next()?;
    (second == '\'').then_some(idx + 1)
}
