//! Decoding of the line-oriented header found between the `---` lines.
//!
//! The header is a flat `key: value` list. `categories` and `tags` may also be
//! written as a block list, one item per line, each line indented by exactly
//! four spaces and starting with `- `:
//!
//! ```text
//! title: Hello
//! categories:
//!     - math
//!     - cs
//! tags: rust, parsing
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

const LIST_ITEM_MARKER: &str = "    - ";

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Keys with no dedicated field, values kept verbatim.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl PostMetadata {
    /// `date` as a timestamp, or `None` when it is absent or unparsable.
    ///
    /// RFC 3339 values are converted to UTC; a bare `YYYY-MM-DD` is midnight.
    pub fn published(&self) -> Option<NaiveDateTime> {
        let date = self.date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
            return Some(dt.naive_utc());
        }
        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(date, format) {
                return Some(dt);
            }
        }
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn set_scalar(&mut self, key: &str, value: &str) {
        let value = value.to_string();
        match key {
            "title" => self.title = Some(value),
            "description" => self.description = Some(value),
            "slug" => self.slug = Some(value),
            "date" => self.date = Some(value),
            "image" => self.image = Some(value),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    fn set_list(&mut self, field: ListField, items: Vec<String>) {
        match field {
            ListField::Categories => self.categories = Some(items),
            ListField::Tags => self.tags = Some(items),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListField {
    Categories,
    Tags,
}

impl ListField {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "categories" => Some(Self::Categories),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Decoder {
    Scalar,
    Collecting { field: ListField, items: Vec<String> },
}

impl Decoder {
    fn step(self, meta: &mut PostMetadata, line: &str) -> Self {
        match self {
            Decoder::Collecting { field, mut items } => match line.strip_prefix(LIST_ITEM_MARKER) {
                Some(item) => {
                    let item = item.trim();
                    if !item.is_empty() {
                        items.push(item.to_string());
                    }
                    Decoder::Collecting { field, items }
                }
                None => {
                    // the list ends here; the line itself still has to be read
                    meta.set_list(field, items);
                    Decoder::Scalar.step(meta, line)
                }
            },
            Decoder::Scalar => scalar_line(meta, line),
        }
    }

    fn finish(self, meta: &mut PostMetadata) {
        if let Decoder::Collecting { field, items } = self {
            meta.set_list(field, items);
        }
    }
}

fn scalar_line(meta: &mut PostMetadata, line: &str) -> Decoder {
    if line.trim().is_empty() || line.starts_with('#') {
        return Decoder::Scalar;
    }
    // a line without `:` has an empty value and is dropped like one
    let Some((key, value)) = line.split_once(':') else {
        return Decoder::Scalar;
    };
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() {
        return Decoder::Scalar;
    }

    if let Some(field) = ListField::from_key(key) {
        if value.is_empty() {
            return Decoder::Collecting {
                field,
                items: vec![],
            };
        }
        meta.set_list(field, inline_list(value));
    } else if !value.is_empty() {
        meta.set_scalar(key, value);
    }
    Decoder::Scalar
}

/// `a, b` or `[a, b]`
fn inline_list(value: &str) -> Vec<String> {
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decodes a metadata block. Unknown or malformed lines never fail the decode,
/// they are just left out of the result.
pub fn decode(block: &str) -> PostMetadata {
    let mut meta = PostMetadata::default();
    block
        .split('\n')
        .fold(Decoder::Scalar, |state, line| state.step(&mut meta, line))
        .finish(&mut meta);
    meta
}
