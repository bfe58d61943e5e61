//! Language classification and per-language lexical rules.
//!
//! Lexical rules live in a static table keyed by [`Language`]. Adding a language means adding a
//! row to [`LEX_TABLE`] and an entry to the extension table, nothing else.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Shell,
    Html,
    Css,
    Sql,
    Unknown,
}

/// How a language delimits blocks, which selects the function extraction heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Braces,
    Indentation,
    None,
}

impl Language {
    pub const ALL: [Language; 18] = [
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Go,
        Language::Ruby,
        Language::Php,
        Language::Swift,
        Language::Kotlin,
        Language::Shell,
        Language::Html,
        Language::Css,
        Language::Sql,
        Language::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Shell => "shell",
            Language::Html => "html",
            Language::Css => "css",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }

    pub fn parse(name: &str) -> Option<Language> {
        let lowered = name.trim().to_ascii_lowercase();
        let alias = match lowered.as_str() {
            "js" => "javascript",
            "ts" => "typescript",
            "c++" => "cpp",
            "c#" | "cs" => "csharp",
            "py" => "python",
            "rs" => "rust",
            "sh" | "bash" => "shell",
            other => other,
        };
        Language::ALL.iter().copied().find(|l| l.as_str() == alias)
    }

    pub fn block_style(&self) -> BlockStyle {
        match self {
            Language::Python | Language::Ruby => BlockStyle::Indentation,
            Language::Html | Language::Css | Language::Sql | Language::Unknown => BlockStyle::None,
            _ => BlockStyle::Braces,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Language::Unknown
    }

    /// C-family languages where `a ? b : c` is a decision point.
    pub fn has_ternary(&self) -> bool {
        matches!(
            self,
            Language::JavaScript
                | Language::TypeScript
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Php
                | Language::Swift
        )
    }

    pub fn lex_rules(&self) -> Option<&'static LexRules> {
        LEX_TABLE
            .iter()
            .find(|(lang, _)| lang == self)
            .map(|(_, rules)| rules)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string literal syntax.
#[derive(Debug, Clone, Copy)]
pub struct StringRule {
    pub open: &'static str,
    pub close: &'static str,
    pub escape: Option<char>,
    pub multiline: bool,
    /// Only a literal when it closes right after one (possibly escaped) character, as in Rust
    /// `'x'`, so lifetimes such as `'a` are left alone.
    pub char_literal: bool,
}

/// Comment and string syntax for one language.
#[derive(Debug, Clone, Copy)]
pub struct LexRules {
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
    pub nested_block_comments: bool,
    /// Line comment markers only count at the start of a word (shell `#` vs `$#`).
    pub comment_needs_boundary: bool,
    pub strings: &'static [StringRule],
}

const fn quoted(quote: &'static str, multiline: bool) -> StringRule {
    StringRule {
        open: quote,
        close: quote,
        escape: Some('\\'),
        multiline,
        char_literal: false,
    }
}

const fn raw(quote: &'static str) -> StringRule {
    StringRule {
        open: quote,
        close: quote,
        escape: None,
        multiline: true,
        char_literal: false,
    }
}

const C_BLOCK: &[(&str, &str)] = &[("/*", "*/")];
const SLASH_LINE: &[&str] = &["//"];
const HASH_LINE: &[&str] = &["#"];
const C_STRINGS: &[StringRule] = &[quoted("\"", false), quoted("'", false)];

const RUST_RULES: LexRules = LexRules {
    line_comments: SLASH_LINE,
    block_comments: C_BLOCK,
    nested_block_comments: true,
    comment_needs_boundary: false,
    strings: &[
        StringRule {
            open: "r##\"",
            close: "\"##",
            escape: None,
            multiline: true,
            char_literal: false,
        },
        StringRule {
            open: "r#\"",
            close: "\"#",
            escape: None,
            multiline: true,
            char_literal: false,
        },
        StringRule {
            open: "r\"",
            close: "\"",
            escape: None,
            multiline: true,
            char_literal: false,
        },
        quoted("\"", true),
        StringRule {
            open: "'",
            close: "'",
            escape: Some('\\'),
            multiline: false,
            char_literal: true,
        },
    ],
};

const PYTHON_RULES: LexRules = LexRules {
    line_comments: HASH_LINE,
    block_comments: &[],
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[
        quoted("\"\"\"", true),
        quoted("'''", true),
        quoted("\"", false),
        quoted("'", false),
    ],
};

const JS_RULES: LexRules = LexRules {
    line_comments: SLASH_LINE,
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[quoted("\"", false), quoted("'", false), quoted("`", true)],
};

const C_LIKE_RULES: LexRules = LexRules {
    line_comments: SLASH_LINE,
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: C_STRINGS,
};

const KOTLIN_SWIFT_RULES: LexRules = LexRules {
    line_comments: SLASH_LINE,
    block_comments: C_BLOCK,
    nested_block_comments: true,
    comment_needs_boundary: false,
    strings: &[quoted("\"\"\"", true), quoted("\"", false), quoted("'", false)],
};

const GO_RULES: LexRules = LexRules {
    line_comments: SLASH_LINE,
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[quoted("\"", false), quoted("'", false), raw("`")],
};

const RUBY_RULES: LexRules = LexRules {
    line_comments: HASH_LINE,
    block_comments: &[("=begin", "=end")],
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[quoted("\"", true), quoted("'", true)],
};

const PHP_RULES: LexRules = LexRules {
    line_comments: &["//", "#"],
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[quoted("\"", true), quoted("'", true)],
};

const SHELL_RULES: LexRules = LexRules {
    line_comments: HASH_LINE,
    block_comments: &[],
    nested_block_comments: false,
    comment_needs_boundary: true,
    strings: &[quoted("\"", true), raw("'")],
};

const SQL_RULES: LexRules = LexRules {
    line_comments: &["--"],
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[quoted("'", true)],
};

const CSS_RULES: LexRules = LexRules {
    line_comments: &[],
    block_comments: C_BLOCK,
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: C_STRINGS,
};

const HTML_RULES: LexRules = LexRules {
    line_comments: &[],
    block_comments: &[("<!--", "-->")],
    nested_block_comments: false,
    comment_needs_boundary: false,
    strings: &[],
};

pub static LEX_TABLE: &[(Language, LexRules)] = &[
    (Language::Rust, RUST_RULES),
    (Language::Python, PYTHON_RULES),
    (Language::JavaScript, JS_RULES),
    (Language::TypeScript, JS_RULES),
    (Language::Java, C_LIKE_RULES),
    (Language::C, C_LIKE_RULES),
    (Language::Cpp, C_LIKE_RULES),
    (Language::CSharp, C_LIKE_RULES),
    (Language::Go, GO_RULES),
    (Language::Ruby, RUBY_RULES),
    (Language::Php, PHP_RULES),
    (Language::Swift, KOTLIN_SWIFT_RULES),
    (Language::Kotlin, KOTLIN_SWIFT_RULES),
    (Language::Shell, SHELL_RULES),
    (Language::Html, HTML_RULES),
    (Language::Css, CSS_RULES),
    (Language::Sql, SQL_RULES),
];

const EXTENSIONS: &[(&str, Language)] = &[
    ("rs", Language::Rust),
    ("py", Language::Python),
    ("pyw", Language::Python),
    ("pyi", Language::Python),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("java", Language::Java),
    ("c", Language::C),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hh", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hxx", Language::Cpp),
    ("cs", Language::CSharp),
    ("go", Language::Go),
    ("rb", Language::Ruby),
    ("rake", Language::Ruby),
    ("php", Language::Php),
    ("swift", Language::Swift),
    ("kt", Language::Kotlin),
    ("kts", Language::Kotlin),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("zsh", Language::Shell),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("css", Language::Css),
    ("scss", Language::Css),
    ("less", Language::Css),
    ("sql", Language::Sql),
];

/// Tokens that only show up in C++ headers.
const CPP_HEADER_TOKENS: &[&str] = &[
    "class ",
    "namespace ",
    "template<",
    "template <",
    "std::",
    "public:",
    "private:",
    "virtual ",
];

/// Classify a file from its path and its first bytes. Never fails.
pub fn classify(path: &Path, head: &[u8]) -> Language {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    if let Some(ext) = ext.as_deref() {
        if ext == "h" {
            return classify_header(head);
        }
        if let Some((_, lang)) = EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            return *lang;
        }
    }

    let text = String::from_utf8_lossy(&head[..head.len().min(1024)]);
    if let Some(lang) = classify_shebang(&text) {
        return lang;
    }
    classify_signature(&text).unwrap_or(Language::Unknown)
}

fn classify_header(head: &[u8]) -> Language {
    let text = String::from_utf8_lossy(head);
    if CPP_HEADER_TOKENS.iter().any(|tok| text.contains(tok)) {
        Language::Cpp
    } else {
        Language::C
    }
}

fn classify_shebang(text: &str) -> Option<Language> {
    let first = text.lines().next()?;
    let rest = first.strip_prefix("#!")?;
    // `#!/usr/bin/env python3` and `#!/bin/bash` both name the interpreter in the last word.
    let interpreter = rest
        .split_whitespace()
        .filter(|w| !w.starts_with('-'))
        .last()?
        .rsplit('/')
        .next()?;
    let interpreter = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    match interpreter {
        "python" => Some(Language::Python),
        "node" | "nodejs" | "deno" => Some(Language::JavaScript),
        "bash" | "sh" | "zsh" | "dash" | "ksh" => Some(Language::Shell),
        "ruby" => Some(Language::Ruby),
        "php" => Some(Language::Php),
        _ => None,
    }
}

fn classify_signature(text: &str) -> Option<Language> {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?php") {
        return Some(Language::Php);
    }
    let lowered = trimmed.get(..trimmed.len().min(64))?.to_ascii_lowercase();
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return Some(Language::Html);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(path: &str, head: &str) -> Language {
        classify(Path::new(path), head.as_bytes())
    }

    #[test]
    fn extension_table_wins() {
        assert_eq!(lang("src/main.rs", ""), Language::Rust);
        assert_eq!(lang("app/View.TSX", ""), Language::TypeScript);
        assert_eq!(lang("lib/util.rb", ""), Language::Ruby);
    }

    #[test]
    fn ambiguous_header_uses_signature_tokens() {
        assert_eq!(lang("inc/vec.h", "namespace geo { class Vec; }"), Language::Cpp);
        assert_eq!(lang("inc/vec.h", "struct vec { int x; };"), Language::C);
    }

    #[test]
    fn shebang_decides_extensionless_scripts() {
        assert_eq!(lang("bin/tool", "#!/usr/bin/env python3\nprint(1)"), Language::Python);
        assert_eq!(lang("bin/run", "#!/bin/bash -e\necho hi"), Language::Shell);
        assert_eq!(lang("bin/srv", "#!/usr/bin/env node\n"), Language::JavaScript);
    }

    #[test]
    fn unknown_inputs_degrade() {
        assert_eq!(lang("README", "hello"), Language::Unknown);
        assert_eq!(lang("data.bin", ""), Language::Unknown);
        assert!(Language::Unknown.lex_rules().is_none());
    }

    #[test]
    fn every_known_language_has_lex_rules() {
        for lang in Language::ALL {
            assert_eq!(lang.lex_rules().is_some(), lang.is_known(), "{lang}");
        }
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(Language::parse("TS"), Some(Language::TypeScript));
        assert_eq!(Language::parse("c#"), Some(Language::CSharp));
        assert_eq!(Language::parse("cobol"), None);
    }
}
