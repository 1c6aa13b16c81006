//! Code block highlighting with syntect.
//!
//! Output uses CSS classes (`ClassStyle::Spaced`), so colours come from the
//! site's stylesheet rather than from an inline theme.

use log::{debug, warn};
use maud::{html, PreEscaped};
use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{ParseState, ScopeStackOp, SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

#[derive(Debug)]
pub struct Highlighter {
    syntax_set: SyntaxSet,
}

/// Syntaxes tried, in order of preference, when a block has to be detected
/// from its content.
const DETECTION_CANDIDATES: &[&str] = &[
    "Rust",
    "Python",
    "JavaScript",
    "Go",
    "C++",
    "C",
    "Java",
    "Ruby",
    "Bourne Again Shell (bash)",
    "HTML",
    "CSS",
    "SQL",
    "YAML",
];
const DETECTION_LINES: usize = 50;
const MIN_DETECTION_SCORE: usize = 2;

/// Fence names people actually write that syntect does not know by token.
fn map_language(language: &str) -> String {
    match language.to_lowercase().as_ref() {
        "shell" | "sh" | "zsh" | "console" => "bash".to_string(),
        "py" | "python3" => "python".to_string(),
        "c++" => "cpp".to_string(),
        "jsx" | "mjs" => "js".to_string(),
        "yml" => "yaml".to_string(),
        other => other.to_string(),
    }
}

/// Language part of a fence info string, e.g. `rust` for `rust,ignore`.
pub(super) fn fence_language(info: &str) -> Option<&str> {
    info.split(|c: char| c.is_whitespace() || c == ',')
        .next()
        .filter(|lang| !lang.is_empty())
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
        }
    }

    /// Picks the syntax for a block and the name to put in its
    /// `language-*` class.
    ///
    /// A declared language wins when it is known. Otherwise the first line is
    /// used for detection (shebangs, modelines), then the content itself, and
    /// plain text is the last resort.
    fn resolve(&self, lang: Option<&str>, code: &str) -> (&SyntaxReference, Option<String>) {
        if let Some(lang) = lang {
            if let Some(syntax) = self.syntax_set.find_syntax_by_token(&map_language(lang)) {
                return (syntax, Some(lang.to_lowercase()));
            }
            debug!("unknown code block language {lang:?}, detecting");
        }
        let detected = self
            .syntax_set
            .find_syntax_by_first_line(code)
            .or_else(|| self.detect(code));
        match detected {
            Some(syntax) => {
                debug!("detected {} code block", syntax.name);
                (syntax, syntax.file_extensions.first().cloned())
            }
            None => (self.syntax_set.find_syntax_plain_text(), None),
        }
    }

    /// How much of `code` the syntax recognises as language constructs:
    /// keywords, types, declared names and builtins. Operators count for
    /// nothing since nearly every language has the same ones, and each
    /// `invalid.*` scope costs three points.
    fn score(&self, syntax: &SyntaxReference, code: &str) -> Option<usize> {
        let mut state = ParseState::new(syntax);
        let (mut hits, mut invalid) = (0usize, 0usize);
        for line in LinesWithEndings::from(code).take(DETECTION_LINES) {
            for (_, op) in state.parse_line(line, &self.syntax_set).ok()? {
                let ScopeStackOp::Push(scope) = op else {
                    continue;
                };
                let name = scope.build_string();
                if name.starts_with("invalid.") {
                    invalid += 1;
                } else if !name.starts_with("keyword.operator")
                    && ["keyword.", "storage.", "entity.name.", "support."]
                        .iter()
                        .any(|prefix| name.starts_with(prefix))
                {
                    hits += 1;
                }
            }
        }
        Some(hits.saturating_sub(invalid * 3))
    }

    /// Best scoring candidate syntax; earlier candidates win ties.
    fn detect(&self, code: &str) -> Option<&SyntaxReference> {
        let mut best: Option<(&SyntaxReference, usize)> = None;
        for name in DETECTION_CANDIDATES {
            let Some(syntax) = self.syntax_set.find_syntax_by_name(name) else {
                continue;
            };
            let Some(score) = self.score(syntax, code) else {
                continue;
            };
            if score >= MIN_DETECTION_SCORE && best.map_or(true, |(_, top)| score > top) {
                best = Some((syntax, score));
            }
        }
        best.map(|(syntax, _)| syntax)
    }

    fn classed(&self, syntax: &SyntaxReference, code: &str) -> Result<String, syntect::Error> {
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, ClassStyle::Spaced);
        for line in LinesWithEndings::from(code) {
            generator.parse_html_for_line_which_includes_newline(line)?;
        }
        Ok(generator.finalize())
    }

    /// Renders a whole `<pre><code>` block.
    pub fn highlight(&self, lang: Option<&str>, code: &str) -> String {
        let (syntax, class) = self.resolve(lang, code);
        let body = match self.classed(syntax, code) {
            Ok(body) => body,
            Err(err) => {
                warn!("failed to highlight {} code block: {err}", syntax.name);
                html! { (code) }.into_string()
            }
        };
        let mut out = html! {
            pre {
                code class=[class.map(|c| format!("language-{c}"))] { (PreEscaped(body)) }
            }
        }
        .into_string();
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fence_info() {
        assert_eq!(fence_language("rust"), Some("rust"));
        assert_eq!(fence_language("rust,ignore"), Some("rust"));
        assert_eq!(fence_language("python title=\"a.py\""), Some("python"));
        assert_eq!(fence_language(""), None);
    }

    #[test]
    fn declared_language() {
        let out = Highlighter::new().highlight(Some("rust"), "fn main() {}\n");
        assert!(out.starts_with("<pre><code class=\"language-rust\">"), "{out}");
        assert!(out.contains("source rust"), "{out}");
        assert!(out.ends_with("</code></pre>\n"), "{out}");
    }

    #[test]
    fn aliases() {
        let highlighter = Highlighter::new();
        let out = highlighter.highlight(Some("shell"), "echo hi\n");
        assert!(out.contains("language-shell"), "{out}");
        assert!(out.contains("source shell"), "{out}");
    }

    #[test]
    fn unknown_language_is_detected() {
        let out = Highlighter::new().highlight(Some("nonsense"), "#!/bin/bash\necho hi\n");
        assert!(out.contains("source shell"), "{out}");
        assert!(!out.contains("language-nonsense"), "{out}");
    }

    #[test]
    fn unknown_language_is_detected_from_content() {
        let code = "import os\n\ndef add(a, b):\n    return a + b\n\nprint(add(1, 2))\n";
        let out = Highlighter::new().highlight(Some("nonsense"), code);
        assert!(out.contains("source python"), "{out}");
    }

    #[test]
    fn missing_language_is_detected_from_content() {
        let out = Highlighter::new().highlight(None, "fn main() { let x: Vec<u8> = vec![]; }\n");
        assert!(out.contains("source rust"), "{out}");
        assert!(out.contains("language-rs"), "{out}");
    }

    #[test]
    fn plain_text_fallback_escapes() {
        let out = Highlighter::new().highlight(None, "a < b && c\n");
        assert!(out.starts_with("<pre><code>"), "{out}");
        assert!(out.contains("a &lt; b &amp;&amp; c"), "{out}");
        assert!(!out.contains("source "), "{out}");
    }
}
