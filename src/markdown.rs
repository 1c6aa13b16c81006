//! Markdown to HTML on pulldown-cmark, with hard line breaks, syntect
//! highlighting and `$` math.
//!
//! The process-wide renderer is set up once with [`init`] and read back with
//! [`instance`]; [`Renderer::new`] builds an independent one.

use std::sync::OnceLock;

use log::debug;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd, TextMergeStream};

use crate::error::RenderError;

pub mod highlight;
pub mod math;

use highlight::{fence_language, Highlighter};
use math::MathEvents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownOptions {
    /// Render a single newline as `<br />`.
    pub hard_breaks: bool,
    pub highlight: bool,
    pub math: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            hard_breaks: true,
            highlight: true,
            math: true,
        }
    }
}

#[derive(Debug)]
pub struct Renderer {
    options: MarkdownOptions,
    highlighter: Highlighter,
}

static RENDERER: OnceLock<Renderer> = OnceLock::new();

/// Sets up the process-wide renderer. Only the first call succeeds.
pub fn init(options: MarkdownOptions) -> Result<&'static Renderer, RenderError> {
    let mut created = false;
    let renderer = RENDERER.get_or_init(|| {
        created = true;
        Renderer::new(options)
    });
    if created {
        debug!("markdown renderer initialized with {options:?}");
        Ok(renderer)
    } else {
        Err(RenderError::AlreadyInitialized)
    }
}

pub fn instance() -> Result<&'static Renderer, RenderError> {
    RENDERER.get().ok_or(RenderError::NotInitialized)
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options
}

impl Renderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self {
            options,
            highlighter: Highlighter::new(),
        }
    }

    /// Rewrites line breaks and code blocks. A code block's events are
    /// blanked out and its highlighted HTML is emitted at its end.
    fn event_mapper<'a>(&self) -> impl FnMut(Event<'a>) -> Event<'a> + '_ {
        let MarkdownOptions {
            hard_breaks,
            highlight,
            ..
        } = self.options;
        let mut code_block: Option<(Option<String>, String)> = None;

        move |event: Event<'a>| -> Event<'a> {
            match event {
                Event::Start(Tag::CodeBlock(kind)) if highlight => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => fence_language(&info).map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code_block = Some((lang, String::new()));
                    Event::Text("".into())
                }
                Event::Text(text) => match code_block.as_mut() {
                    Some((_, code)) => {
                        code.push_str(&text);
                        Event::Text("".into())
                    }
                    None => Event::Text(text),
                },
                Event::End(TagEnd::CodeBlock) if code_block.is_some() => match code_block.take() {
                    Some((lang, code)) => {
                        Event::Html(self.highlighter.highlight(lang.as_deref(), &code).into())
                    }
                    None => event,
                },
                Event::SoftBreak if hard_breaks => Event::HardBreak,
                _ => event,
            }
        }
    }

    pub fn render(&self, content: &str) -> String {
        let mut body_html = String::new();
        if self.options.math {
            let masked = math::mask(content, parser_options());
            let parser = TextMergeStream::new(Parser::new_ext(&masked.text, parser_options()));
            html::push_html(
                &mut body_html,
                MathEvents::new(&masked.spans, parser).map(self.event_mapper()),
            );
        } else {
            html::push_html(
                &mut body_html,
                Parser::new_ext(content, parser_options()).map(self.event_mapper()),
            );
        }
        body_html
    }
}
