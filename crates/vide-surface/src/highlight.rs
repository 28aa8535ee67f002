//! Keyword-level syntax highlighting into escaped HTML spans.

const PYTHON: &[&str] = &[
    "and", "as", "async", "await", "break", "class", "continue", "def", "elif", "else",
    "except", "False", "finally", "for", "from", "if", "import", "in", "is", "lambda", "None",
    "not", "or", "pass", "raise", "return", "True", "try", "while", "with", "yield",
];

const SCRIPT: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "else", "export", "extends", "false", "finally", "for", "from", "function", "if", "import",
    "interface", "let", "new", "null", "return", "switch", "this", "throw", "true", "try",
    "type", "typeof", "undefined", "var", "while",
];

const RUST: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "else", "enum", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "return", "self",
    "Self", "struct", "trait", "true", "type", "use", "where", "while",
];

fn keywords(language: &str) -> &'static [&'static str] {
    match language {
        "python" => PYTHON,
        "javascript" | "typescript" => SCRIPT,
        "rust" => RUST,
        _ => &[],
    }
}

fn line_comment(language: &str) -> Option<&'static str> {
    match language {
        "python" | "ruby" | "shell" | "yaml" | "toml" => Some("#"),
        "javascript" | "typescript" | "rust" | "c" | "cpp" | "java" | "go" | "csharp" => Some("//"),
        _ => None,
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// HTML-escape text.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

fn span(out: &mut String, class: &str, text: &str) {
    out.push_str("<span class=\"");
    out.push_str(class);
    out.push_str("\">");
    escape_into(out, text);
    out.push_str("</span>");
}

fn highlight_line(out: &mut String, line: &str, keywords: &[&str], comment: Option<&str>) {
    let mut rest = line;
    while !rest.is_empty() {
        if let Some(prefix) = comment {
            if rest.starts_with(prefix) {
                span(out, "tok-comment", rest);
                return;
            }
        }

        let Some(c) = rest.chars().next() else {
            return;
        };
        if c == '"' || c == '\'' || c == '`' {
            let body = &rest[c.len_utf8()..];
            let end = body
                .char_indices()
                .scan(false, |escaped, (i, ch)| {
                    let hit = !*escaped && ch == c;
                    *escaped = !*escaped && ch == '\\';
                    Some((i, hit))
                })
                .find(|(_, hit)| *hit)
                .map(|(i, _)| c.len_utf8() + i + c.len_utf8())
                .unwrap_or(rest.len());
            span(out, "tok-string", &rest[..end]);
            rest = &rest[end..];
        } else if c.is_ascii_digit() {
            let end = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '.' || ch == '_'))
                .unwrap_or(rest.len());
            span(out, "tok-number", &rest[..end]);
            rest = &rest[end..];
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let end = rest
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
                .unwrap_or(rest.len());
            let word = &rest[..end];
            if keywords.contains(&word) {
                span(out, "tok-keyword", word);
            } else {
                escape_into(out, word);
            }
            rest = &rest[end..];
        } else {
            let mut buf = [0u8; 4];
            escape_into(out, c.encode_utf8(&mut buf));
            rest = &rest[c.len_utf8()..];
        }
    }
}

/// Render `text` as escaped HTML with `tok-*` spans for keywords, strings,
/// numbers and comments. Line structure is preserved.
pub fn highlight(language: &str, text: &str) -> String {
    let keywords = keywords(language);
    let comment = line_comment(language);
    let mut out = String::with_capacity(text.len() * 2);
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        highlight_line(&mut out, line, keywords, comment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_tokens() {
        let html = highlight("python", "def f(): return 'x' # done");
        assert_eq!(
            html,
            "<span class=\"tok-keyword\">def</span> f(): \
             <span class=\"tok-keyword\">return</span> \
             <span class=\"tok-string\">&#39;x&#39;</span> \
             <span class=\"tok-comment\"># done</span>"
        );
    }

    #[test]
    fn test_markup_is_escaped() {
        let html = highlight("plaintext", "<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_escaped_quote_stays_in_string() {
        let html = highlight("javascript", r#"s = "a\"b"; x"#);
        assert!(html.contains(r#"<span class="tok-string">&quot;a\&quot;b&quot;</span>; x"#));
    }

    #[test]
    fn test_text_round_trips_without_markup() {
        let source = "print(greet(\"World\"))\n\nx = 42\n";
        let html = highlight("python", source);
        let mut plain = String::new();
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => plain.push(c),
                _ => {}
            }
        }
        let plain = plain.replace("&quot;", "\"");
        assert_eq!(plain, source);
    }
}
