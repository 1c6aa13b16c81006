use serde::Serialize;

use crate::{
    error::ParseError,
    frontmatter,
    markdown::{self, Renderer},
    metadata::{self, PostMetadata},
};

/// A parsed post. Read-only once built.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ParsedPost {
    meta: PostMetadata,
    content: String,
    html: String,
}

impl ParsedPost {
    pub fn meta(&self) -> &PostMetadata {
        &self.meta
    }

    /// The markdown body, trimmed.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

impl Renderer {
    pub fn parse(&self, text: &str) -> Result<ParsedPost, ParseError> {
        let fm = frontmatter::extract(text)?;
        let meta = metadata::decode(&fm.metadata);
        let html = self.render(&fm.content);
        Ok(ParsedPost {
            meta,
            content: fm.content,
            html,
        })
    }
}

/// Parses with the renderer set up by [`markdown::init`].
pub fn parse_post(text: &str) -> Result<ParsedPost, ParseError> {
    markdown::instance()?.parse(text)
}
