//! `$…$` and `$$…$$` math on top of pulldown-cmark.
//!
//! Math has to be found before pulldown-cmark does its inline parsing, or
//! `$2*3*4$` comes out with `<em>` inside. [`mask`] swaps every formula in the
//! source for a private-use placeholder that pulldown-cmark keeps as plain
//! text. [`MathEvents`] then turns the placeholders in the parsed events into
//! HTML containers for the client-side math renderer. Code spans, code blocks
//! and HTML blocks are located with a first parse and never masked.

use std::{collections::VecDeque, iter::Peekable, ops::Range, sync::LazyLock};

use maud::html;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};

static BLOCK_MATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\$([^$]+)\$\$").unwrap());
static INLINE_MATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$([^$\n]+)\$").unwrap());
static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{E000}(\d+)\x{E001}").unwrap());

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(Range<usize>),
    /// Range of the text between the delimiters.
    InlineMath(Range<usize>),
    BlockMath(Range<usize>),
}

fn match_at(rest: &str) -> Option<(Token, usize)> {
    if let Some(caps) = BLOCK_MATH.captures(rest) {
        let (whole, inner) = (caps.get(0)?, caps.get(1)?);
        // a formula never crosses a paragraph break
        if !BLANK_LINE.is_match(inner.as_str()) {
            return Some((Token::BlockMath(inner.range()), whole.end()));
        }
    }
    let caps = INLINE_MATH.captures(rest)?;
    let (whole, inner) = (caps.get(0)?, caps.get(1)?);
    Some((Token::InlineMath(inner.range()), whole.end()))
}

/// An odd run of backslashes in front of `at` escapes it.
fn is_escaped(src: &str, at: usize) -> bool {
    src[..at].bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}

/// Splits `src` into text and math tokens.
///
/// Every unescaped `$` is a candidate start. Block math is tried before inline
/// math, and a `$` that starts neither is left as text.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = vec![];
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = src[pos..].find('$') {
        let at = pos + offset;
        if is_escaped(src, at) {
            pos = at + 1;
            continue;
        }
        match match_at(&src[at..]) {
            Some((token, len)) => {
                if text_start < at {
                    tokens.push(Token::Text(text_start..at));
                }
                tokens.push(match token {
                    Token::BlockMath(r) => Token::BlockMath(r.start + at..r.end + at),
                    Token::InlineMath(r) => Token::InlineMath(r.start + at..r.end + at),
                    text => text,
                });
                pos = at + len;
                text_start = pos;
            }
            None => pos = at + 1,
        }
    }
    if text_start < src.len() {
        tokens.push(Token::Text(text_start..src.len()));
    }
    tokens
}

pub fn render_inline(text: &str) -> String {
    html! { span.math-inline { "$" (text) "$" } }.into_string()
}

pub fn render_block(text: &str) -> String {
    html! { div.math-block { "$$" (text) "$$" } }.into_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan<'a> {
    pub block: bool,
    /// The formula with its delimiters, as written.
    pub raw: &'a str,
    /// The formula without delimiters, trimmed.
    pub text: &'a str,
}

impl MathSpan<'_> {
    fn render(&self) -> String {
        if self.block {
            render_block(self.text)
        } else {
            render_inline(self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masked<'a> {
    /// The source with every formula replaced by a placeholder.
    pub text: String,
    pub spans: Vec<MathSpan<'a>>,
}

/// Byte ranges that never hold math: code spans, code blocks, HTML blocks.
fn protected_ranges(source: &str, options: Options) -> Vec<Range<usize>> {
    Parser::new_ext(source, options)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_) | Event::Start(Tag::CodeBlock(_) | Tag::HtmlBlock) => Some(range),
            _ => None,
        })
        .collect()
}

/// Ranges of `source` outside of `protected`.
fn open_ranges(len: usize, protected: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut open = vec![];
    let mut cursor = 0;
    for range in protected {
        if cursor < range.start {
            open.push(cursor..range.start);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < len {
        open.push(cursor..len);
    }
    open
}

/// Replaces the formulas of `source` with placeholders.
///
/// `options` must be the ones the masked text is parsed with afterwards.
pub fn mask(source: &str, options: Options) -> Masked<'_> {
    let mut masked = Masked {
        text: String::with_capacity(source.len()),
        spans: vec![],
    };
    // trigger scan: nothing to do without a `$`
    if !source.contains('$') {
        masked.text.push_str(source);
        return masked;
    }

    let mut copied = 0;
    for open in open_ranges(source.len(), &protected_ranges(source, options)) {
        let segment = &source[open.clone()];
        for token in tokenize(segment) {
            let (block, inner, delimiter) = match token {
                Token::Text(_) => continue,
                Token::InlineMath(inner) => (false, inner, 1),
                Token::BlockMath(inner) => (true, inner, 2),
            };
            let whole = open.start + inner.start - delimiter..open.start + inner.end + delimiter;
            masked.text.push_str(&source[copied..whole.start]);
            masked.text.push(PLACEHOLDER_OPEN);
            masked.text.push_str(&masked.spans.len().to_string());
            masked.text.push(PLACEHOLDER_CLOSE);
            masked.spans.push(MathSpan {
                block,
                raw: &source[whole.clone()],
                text: segment[inner].trim(),
            });
            copied = whole.end;
        }
    }
    masked.text.push_str(&source[copied..]);
    masked
}

/// Event adapter turning placeholders back into math.
///
/// Expects merged text events (`TextMergeStream`), so a placeholder is never
/// split across two of them.
pub struct MathEvents<'a, 's, I>
where
    I: Iterator<Item = Event<'a>>,
{
    spans: &'s [MathSpan<'s>],
    inner: Peekable<I>,
    queue: VecDeque<Event<'a>>,
}

impl<'a, 's, I> MathEvents<'a, 's, I>
where
    I: Iterator<Item = Event<'a>>,
{
    pub fn new(spans: &'s [MathSpan<'s>], inner: I) -> Self {
        Self {
            spans,
            inner: inner.peekable(),
            queue: VecDeque::new(),
        }
    }

    fn span(&self, caps: &Captures) -> Option<&'s MathSpan<'s>> {
        let spans: &'s [MathSpan<'s>] = self.spans;
        caps.get(1)?.as_str().parse::<usize>().ok().and_then(|i| spans.get(i))
    }

    /// Puts the written formulas back, for places where markup is not wanted
    /// (link targets, raw HTML).
    fn restore(&self, text: CowStr<'a>) -> CowStr<'a> {
        if !text.contains(PLACEHOLDER_OPEN) {
            return text;
        }
        let restored = PLACEHOLDER.replace_all(&text, |caps: &Captures| match self.span(caps) {
            Some(span) => span.raw.to_string(),
            None => caps[0].to_string(),
        });
        CowStr::from(restored.into_owned())
    }

    fn push_text(&mut self, text: CowStr<'a>) {
        if !text.contains(PLACEHOLDER_OPEN) {
            self.queue.push_back(Event::Text(text));
            return;
        }
        let mut copied = 0;
        for caps in PLACEHOLDER.captures_iter(&text) {
            let (Some(whole), Some(span)) = (caps.get(0), self.span(&caps)) else {
                continue;
            };
            if copied < whole.start() {
                let before = text[copied..whole.start()].to_string();
                self.queue.push_back(Event::Text(CowStr::from(before)));
            }
            let html = CowStr::from(span.render());
            self.queue.push_back(if span.block {
                Event::Html(html)
            } else {
                Event::InlineHtml(html)
            });
            copied = whole.end();
        }
        if copied < text.len() {
            let rest = text[copied..].to_string();
            self.queue.push_back(Event::Text(CowStr::from(rest)));
        }
    }

    /// A paragraph holding nothing but one block formula becomes the bare
    /// block container.
    fn paragraph(&mut self, start: Event<'a>) {
        let Some(Event::Text(text)) = self.inner.next_if(|e| matches!(e, Event::Text(_))) else {
            self.queue.push_back(start);
            return;
        };
        let closes = matches!(self.inner.peek(), Some(Event::End(TagEnd::Paragraph)));
        let lone_block = PLACEHOLDER
            .captures(text.trim())
            .filter(|caps| caps.get(0).map(|m| m.as_str()) == Some(text.trim()))
            .and_then(|caps| self.span(&caps))
            .filter(|span| span.block);

        match lone_block {
            Some(span) if closes => {
                let mut block = span.render();
                block.push('\n');
                self.inner.next();
                self.queue.push_back(Event::Html(CowStr::from(block)));
            }
            _ => {
                self.queue.push_back(start);
                self.push_text(text);
            }
        }
    }
}

impl<'a, I> Iterator for MathEvents<'a, '_, I>
where
    I: Iterator<Item = Event<'a>>,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            let event = match self.inner.next()? {
                Event::Start(Tag::Paragraph) => {
                    self.paragraph(Event::Start(Tag::Paragraph));
                    continue;
                }
                Event::Text(text) => {
                    self.push_text(text);
                    continue;
                }
                Event::Html(html) => Event::Html(self.restore(html)),
                Event::InlineHtml(html) => Event::InlineHtml(self.restore(html)),
                Event::Code(code) => Event::Code(self.restore(code)),
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => Event::Start(Tag::Link {
                    link_type,
                    dest_url: self.restore(dest_url),
                    title: self.restore(title),
                    id,
                }),
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => Event::Start(Tag::Image {
                    link_type,
                    dest_url: self.restore(dest_url),
                    title: self.restore(title),
                    id,
                }),
                event => event,
            };
            return Some(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pulldown_cmark::{html, TextMergeStream};

    fn render(src: &str) -> String {
        let masked = mask(src, Options::empty());
        let events = TextMergeStream::new(Parser::new(&masked.text));
        let mut out = String::new();
        html::push_html(&mut out, MathEvents::new(&masked.spans, events));
        out
    }

    fn texts<'a>(src: &'a str, tokens: &[Token]) -> Vec<(&'static str, &'a str)> {
        tokens
            .iter()
            .map(|t| match t {
                Token::Text(r) => ("text", &src[r.clone()]),
                Token::InlineMath(r) => ("inline", &src[r.clone()]),
                Token::BlockMath(r) => ("block", &src[r.clone()]),
            })
            .collect()
    }

    #[test]
    fn tokenizes_inline_and_block() {
        let src = "area $\\pi r^2$ and $$E = mc^2$$.";
        assert_eq!(
            texts(src, &tokenize(src)),
            vec![
                ("text", "area "),
                ("inline", "\\pi r^2"),
                ("text", " and "),
                ("block", "E = mc^2"),
                ("text", "."),
            ]
        );
    }

    #[test]
    fn no_dollar_is_one_text_token() {
        assert_eq!(tokenize("plain"), vec![Token::Text(0..5)]);
        assert_eq!(tokenize(""), vec![]);
    }

    #[test]
    fn matches_are_non_greedy() {
        let src = "$a$ b $c$";
        assert_eq!(
            texts(src, &tokenize(src)),
            vec![("inline", "a"), ("text", " b "), ("inline", "c")]
        );
    }

    #[test]
    fn inline_math_stays_on_one_line() {
        let src = "$a\nb$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "$a\nb$")]);
        let src = "$$a\nb$$";
        assert_eq!(texts(src, &tokenize(src)), vec![("block", "a\nb")]);
    }

    #[test]
    fn block_math_stops_at_blank_lines() {
        let src = "$$a\n\nb$$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "$$a\n\nb$$")]);
        assert_eq!(render(src), "<p>$$a</p>\n<p>b$$</p>\n");
    }

    #[test]
    fn unmatched_dollars_are_text() {
        let src = "costs $5";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "costs $5")]);
        // a lone opening `$$` falls back to an inline match one `$` later
        let src = "$$x$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "$"), ("inline", "x")]);
    }

    #[test]
    fn escaped_dollars_never_open_math() {
        let src = "\\$a$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "\\$a$")]);
        let src = "\\\\\\$x$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "\\\\\\$x$")]);
        assert_eq!(render("\\$5 and \\$10"), "<p>$5 and $10</p>\n");
    }

    #[test]
    fn escaped_backslash_before_math() {
        let src = "\\\\$x$";
        assert_eq!(texts(src, &tokenize(src)), vec![("text", "\\\\"), ("inline", "x")]);
        assert_eq!(
            render(src),
            "<p>\\<span class=\"math-inline\">$x$</span></p>\n"
        );
    }

    #[test]
    fn currency_is_a_known_false_positive() {
        let src = "between $5 and $10";
        assert_eq!(
            texts(src, &tokenize(src)),
            vec![("text", "between "), ("inline", "5 and "), ("text", "10")]
        );
        assert_eq!(
            render(src),
            "<p>between <span class=\"math-inline\">$5 and$</span>10</p>\n"
        );
    }

    #[test]
    fn masks_formulas_outside_code() {
        let masked = mask("a $x$ `$y$` $$z$$", Options::empty());
        assert_eq!(masked.text, "a \u{E000}0\u{E001} `$y$` \u{E000}1\u{E001}");
        assert_eq!(
            masked.spans,
            vec![
                MathSpan {
                    block: false,
                    raw: "$x$",
                    text: "x",
                },
                MathSpan {
                    block: true,
                    raw: "$$z$$",
                    text: "z",
                },
            ]
        );
    }

    #[test]
    fn inline_container() {
        assert_eq!(
            render("Then $x^2$ grows."),
            "<p>Then <span class=\"math-inline\">$x^2$</span> grows.</p>\n"
        );
    }

    #[test]
    fn emphasis_markers_inside_math() {
        assert_eq!(
            render("$2*3*4$"),
            "<p><span class=\"math-inline\">$2*3*4$</span></p>\n"
        );
        assert_eq!(
            render("$a^*$ vs $b^*$"),
            "<p><span class=\"math-inline\">$a^*$</span> vs <span class=\"math-inline\">$b^*$</span></p>\n"
        );
        assert_eq!(
            render("$$a*b*c$$"),
            "<div class=\"math-block\">$$a*b*c$$</div>\n"
        );
        assert_eq!(
            render("$a_1 + b_1$ and *$c$*"),
            "<p><span class=\"math-inline\">$a_1 + b_1$</span> and <em><span class=\"math-inline\">$c$</span></em></p>\n"
        );
    }

    #[test]
    fn tags_inside_math_are_text() {
        assert_eq!(
            render("$a<b>c$"),
            "<p><span class=\"math-inline\">$a&lt;b&gt;c$</span></p>\n"
        );
    }

    #[test]
    fn formulas_in_raw_html_stay_as_written() {
        assert_eq!(
            render("<span title=\"$x$\">a</span>"),
            "<p><span title=\"$x$\">a</span></p>\n"
        );
    }

    #[test]
    fn block_container_replaces_paragraph() {
        assert_eq!(
            render("$$x^2$$"),
            "<div class=\"math-block\">$$x^2$$</div>\n"
        );
    }

    #[test]
    fn block_container_inside_text() {
        assert_eq!(
            render("so $$x^2$$ holds"),
            "<p>so <div class=\"math-block\">$$x^2$$</div> holds</p>\n"
        );
    }

    #[test]
    fn multi_line_block_keeps_backslashes() {
        let out = render("$$\na \\\\ b\n$$");
        assert_eq!(out, "<div class=\"math-block\">$$a \\\\ b$$</div>\n");
    }

    #[test]
    fn math_text_is_escaped() {
        assert_eq!(
            render("$a<b$"),
            "<p><span class=\"math-inline\">$a&lt;b$</span></p>\n"
        );
    }

    #[test]
    fn code_is_left_alone() {
        assert_eq!(render("`$x$`"), "<p><code>$x$</code></p>\n");
        assert_eq!(
            render("```\n$x$\n```"),
            "<pre><code>$x$\n</code></pre>\n"
        );
        assert_eq!(render("$a `$` b$"), "<p>$a <code>$</code> b$</p>\n");
    }

    #[test]
    fn text_without_math_is_untouched() {
        assert_eq!(render("a *b* c\nd"), "<p>a <em>b</em> c\nd</p>\n");
    }

    #[test]
    fn soft_breaks_survive_around_math() {
        assert_eq!(
            render("one\n$x$ two"),
            "<p>one\n<span class=\"math-inline\">$x$</span> two</p>\n"
        );
    }

    #[test]
    fn math_in_headings_and_lists() {
        assert_eq!(
            render("# About $n$"),
            "<h1>About <span class=\"math-inline\">$n$</span></h1>\n"
        );
        assert_eq!(
            render("- $a$"),
            "<ul>\n<li><span class=\"math-inline\">$a$</span></li>\n</ul>\n"
        );
    }
}
