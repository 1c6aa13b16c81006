//! Splitting a post into its `---` delimited header and its body.

use crate::error::ParseError;

const DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    /// Lines strictly between the two delimiters.
    pub metadata: String,
    /// Everything after the closing delimiter, trimmed.
    pub content: String,
}

/// Locates the metadata block of `text`.
///
/// Line 0 is taken as the opening delimiter without looking at it; the block
/// is closed by the first later line that reads `---` once trimmed.
pub fn extract(text: &str) -> Result<Frontmatter, ParseError> {
    let lines: Vec<&str> = text.split('\n').collect();

    let end = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim() == DELIMITER)
        .map(|(i, _)| i)
        .ok_or(ParseError::MissingFrontmatter)?;

    Ok(Frontmatter {
        metadata: lines[1..end].join("\n"),
        content: lines[end + 1..].join("\n").trim().to_string(),
    })
}
