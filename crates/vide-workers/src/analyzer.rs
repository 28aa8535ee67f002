//! Analyzers run inside worker threads.

use crate::message::{AnalysisRequest, Completion, Diagnostic, Severity};
use std::collections::BTreeSet;

/// Output of one analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    pub completions: Vec<Completion>,
}

/// Something a worker thread can run requests through.
pub trait Analyzer: Send {
    fn analyze(&mut self, request: &AnalysisRequest) -> Analysis;
}

/// Lexical shape of a language, as far as the syntax checks care.
#[derive(Debug, Clone, Copy)]
struct LexProfile {
    line_comment: &'static str,
    single_quote_strings: bool,
    triple_quotes: bool,
    template_literals: bool,
}

impl LexProfile {
    /// `None` for prose-like languages where brackets and quotes carry no
    /// structure.
    fn for_language(language: &str) -> Option<Self> {
        let profile = match language {
            "python" => Self {
                line_comment: "#",
                single_quote_strings: true,
                triple_quotes: true,
                template_literals: false,
            },
            "ruby" | "shell" | "yaml" | "toml" | "perl" | "r" => Self {
                line_comment: "#",
                single_quote_strings: true,
                triple_quotes: false,
                template_literals: false,
            },
            "javascript" | "typescript" => Self {
                line_comment: "//",
                single_quote_strings: true,
                triple_quotes: false,
                template_literals: true,
            },
            // Single quotes are char literals or lifetimes here
            "rust" => Self {
                line_comment: "//",
                single_quote_strings: false,
                triple_quotes: false,
                template_literals: false,
            },
            "c" | "cpp" | "csharp" | "java" | "go" | "kotlin" | "swift" | "json" | "css" => Self {
                line_comment: "//",
                single_quote_strings: true,
                triple_quotes: false,
                template_literals: false,
            },
            _ => return None,
        };
        Some(profile)
    }
}

/// Result of the lexical pass: structural diagnostics plus each line with
/// strings and comments blanked out.
struct Scan {
    diagnostics: Vec<Diagnostic>,
    code: Vec<String>,
}

fn starts_with_at(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut idx = at;
    for p in pattern.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn scan(text: &str, profile: Option<LexProfile>) -> Scan {
    let mut diagnostics = Vec::new();
    let mut code = Vec::new();
    let Some(profile) = profile else {
        code.extend(text.lines().map(str::to_owned));
        return Scan { diagnostics, code };
    };

    let mut stack: Vec<(char, usize, usize)> = Vec::new();
    // Open multi-line string: delimiter, line, column
    let mut block: Option<(&'static str, usize, usize)> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::with_capacity(line.len());
        let mut quote: Option<(char, usize)> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if let Some((delim, _, _)) = block {
                if starts_with_at(&chars, i, delim) {
                    let width = delim.chars().count();
                    out.extend(std::iter::repeat_n(' ', width));
                    i += width;
                    block = None;
                } else if c == '\\' && i + 1 < chars.len() {
                    out.push_str("  ");
                    i += 2;
                } else {
                    out.push(' ');
                    i += 1;
                }
                continue;
            }

            if let Some((q, _)) = quote {
                if c == '\\' && i + 1 < chars.len() {
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
                out.push(' ');
                i += 1;
                continue;
            }

            if starts_with_at(&chars, i, profile.line_comment) {
                break;
            }

            if profile.triple_quotes {
                if let Some(delim) = ["\"\"\"", "'''"]
                    .into_iter()
                    .find(|d| starts_with_at(&chars, i, d))
                {
                    block = Some((delim, line_no, i + 1));
                    out.push_str("   ");
                    i += 3;
                    continue;
                }
            }

            if profile.template_literals && c == '`' {
                block = Some(("`", line_no, i + 1));
                out.push(' ');
                i += 1;
                continue;
            }

            if c == '"' || (c == '\'' && profile.single_quote_strings) {
                quote = Some((c, i + 1));
                out.push(' ');
                i += 1;
                continue;
            }

            match c {
                '(' | '[' | '{' => stack.push((c, line_no, i + 1)),
                ')' | ']' | '}' => match stack.pop() {
                    Some((open, _, _)) if closing_for(open) == c => {}
                    Some((open, l, col)) => diagnostics.push(Diagnostic::new(
                        line_no,
                        i + 1,
                        Severity::Error,
                        format!(
                            "Mismatched '{c}': expected '{}' to close '{open}' from {l}:{col}",
                            closing_for(open)
                        ),
                    )),
                    None => diagnostics.push(Diagnostic::new(
                        line_no,
                        i + 1,
                        Severity::Error,
                        format!("Unmatched '{c}'"),
                    )),
                },
                _ => {}
            }
            out.push(c);
            i += 1;
        }

        if let Some((_, col)) = quote {
            diagnostics.push(Diagnostic::new(
                line_no,
                col,
                Severity::Error,
                "Unterminated string literal",
            ));
        }
        code.push(out);
    }

    if let Some((delim, line, col)) = block {
        diagnostics.push(Diagnostic::new(
            line,
            col,
            Severity::Error,
            format!("Unterminated {delim} string"),
        ));
    }
    for (open, line, col) in stack {
        diagnostics.push(Diagnostic::new(
            line,
            col,
            Severity::Error,
            format!("Unclosed '{open}'"),
        ));
    }

    Scan { diagnostics, code }
}

fn whitespace_diagnostics(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_end();
        if trimmed.len() != line.len() && !trimmed.is_empty() {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                trimmed.chars().count() + 1,
                Severity::Hint,
                "Trailing whitespace",
            ));
        }
        let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if indent.contains(' ') && indent.contains('\t') {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                1,
                Severity::Warning,
                "Mixed tabs and spaces in indentation",
            ));
        }
    }
    diagnostics
}

/// Identifier-like words with their 1-based columns.
fn words(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    for (col, (byte, c)) in line.char_indices().enumerate() {
        let is_word = c.is_alphanumeric() || c == '_' || c == '$';
        match (start, is_word) {
            (None, true) => start = Some((col, byte)),
            (Some((scol, sbyte)), false) => {
                out.push((scol + 1, &line[sbyte..byte]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some((scol, sbyte)) = start {
        out.push((scol + 1, &line[sbyte..]));
    }
    out.retain(|(_, w)| !w.starts_with(|c: char| c.is_ascii_digit()));
    out
}

fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
}

/// Generic syntax-only analysis: bracket and string structure, whitespace
/// hygiene, and word completions.
#[derive(Debug, Clone, Default)]
pub struct SyntaxAnalyzer;

impl SyntaxAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, request: &AnalysisRequest) -> (Scan, Analysis) {
        let scan = scan(&request.text, LexProfile::for_language(&request.language));
        let mut diagnostics = scan.diagnostics.clone();
        diagnostics.extend(whitespace_diagnostics(&request.text));

        let vocabulary: BTreeSet<&str> = scan
            .code
            .iter()
            .flat_map(|line| words(line))
            .map(|(_, w)| w)
            .filter(|w| w.chars().count() >= 3)
            .collect();
        let completions = vocabulary
            .into_iter()
            .map(|w| Completion {
                label: w.to_string(),
                detail: "word",
            })
            .collect();

        (
            scan,
            Analysis {
                diagnostics,
                completions,
            },
        )
    }
}

impl Analyzer for SyntaxAnalyzer {
    fn analyze(&mut self, request: &AnalysisRequest) -> Analysis {
        let (_, mut analysis) = self.run(request);
        sort_diagnostics(&mut analysis.diagnostics);
        analysis
    }
}

const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "delete", "export", "extends", "finally", "for", "function", "if", "import", "let", "new",
    "return", "switch", "this", "throw", "try", "typeof", "while", "yield",
];

const TS_KEYWORDS: &[&str] = &[
    "abstract", "enum", "implements", "interface", "keyof", "namespace", "readonly", "type",
];

/// TypeScript/JavaScript analysis on top of the syntax checks: loose
/// equality, `var`, `any`, and declaration-aware completions.
#[derive(Debug, Clone, Default)]
pub struct LanguageServiceAnalyzer {
    syntax: SyntaxAnalyzer,
}

impl LanguageServiceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lint_line(line_no: usize, line: &str, typescript: bool, out: &mut Vec<Diagnostic>) {
        let chars: Vec<char> = line.chars().collect();
        for i in 0..chars.len().saturating_sub(1) {
            let next2 = chars.get(i + 2).copied();
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            if chars[i] == '=' && chars[i + 1] == '=' && next2 != Some('=') {
                if !matches!(prev, Some('=' | '!' | '<' | '>')) {
                    out.push(Diagnostic::new(
                        line_no,
                        i + 1,
                        Severity::Warning,
                        "Use '===' instead of '=='",
                    ));
                }
            } else if chars[i] == '!' && chars[i + 1] == '=' && next2 != Some('=') {
                out.push(Diagnostic::new(
                    line_no,
                    i + 1,
                    Severity::Warning,
                    "Use '!==' instead of '!='",
                ));
            }
        }

        for (col, word) in words(line) {
            match word {
                "var" => out.push(Diagnostic::new(
                    line_no,
                    col,
                    Severity::Info,
                    "Prefer 'let' or 'const' over 'var'",
                )),
                "any" if typescript => {
                    let before: String = chars[..col - 1].iter().collect();
                    if before.trim_end().ends_with(':') {
                        out.push(Diagnostic::new(
                            line_no,
                            col,
                            Severity::Warning,
                            "Type annotated as 'any'",
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    fn declarations(code: &[String], typescript: bool) -> Vec<Completion> {
        let mut found = BTreeSet::new();
        for line in code {
            let tokens = words(line);
            for pair in tokens.windows(2) {
                let detail = match pair[0].1 {
                    "function" => "function",
                    "class" => "class",
                    "const" | "let" | "var" => "variable",
                    "interface" | "type" if typescript => "type",
                    _ => continue,
                };
                found.insert(Completion {
                    label: pair[1].1.to_string(),
                    detail,
                });
            }
        }
        found.into_iter().collect()
    }
}

impl Analyzer for LanguageServiceAnalyzer {
    fn analyze(&mut self, request: &AnalysisRequest) -> Analysis {
        let typescript = request.language == "typescript";
        let (scan, mut analysis) = self.syntax.run(request);

        for (idx, line) in scan.code.iter().enumerate() {
            Self::lint_line(idx + 1, line, typescript, &mut analysis.diagnostics);
        }
        sort_diagnostics(&mut analysis.diagnostics);

        let mut completions = Self::declarations(&scan.code, typescript);
        let extra: &[&str] = if typescript { TS_KEYWORDS } else { &[] };
        let keywords = JS_KEYWORDS
            .iter()
            .chain(extra)
            .map(|k| Completion {
                label: (*k).to_string(),
                detail: "keyword",
            });
        completions.extend(keywords);
        analysis.completions = completions;
        analysis
    }
}
