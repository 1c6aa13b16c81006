use std::{cmp::Ordering, path::PathBuf};

use anyhow::Context;
use log::{debug, error};

use crate::{markdown::Renderer, post::ParsedPost};

/// Post files the site ships with.
pub const DEFAULT_POSTS: &[&str] = &[
    "decimal_factorials.md",
    "freshman_supercomputing.md",
    "impermanence.md",
    "multipart_rust_server.md",
];

/// Where raw post text comes from.
pub trait PostSource {
    fn fetch(&self, name: &str) -> anyhow::Result<String>;
}

/// Reads posts from a directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    pub root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PostSource for DirSource {
    fn fetch(&self, name: &str) -> anyhow::Result<String> {
        let path = self.root.join(name);
        std::fs::read_to_string(&path).with_context(|| format!("while reading {path:?}"))
    }
}

/// Newest first; posts without a usable date go last.
pub fn sort_posts(a: &ParsedPost, b: &ParsedPost) -> Ordering {
    match (a.meta().published(), b.meta().published()) {
        (Some(ref a_date), Some(ref b_date)) => b_date.cmp(a_date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.meta().title.cmp(&b.meta().title),
    }
}

/// Fetches and parses every post in `names`, keeping the name each one came
/// from.
///
/// A post that cannot be fetched or parsed is logged and left out.
pub fn load_named_posts<'n, S: PostSource + ?Sized>(
    source: &S,
    renderer: &Renderer,
    names: &[&'n str],
) -> Vec<(&'n str, ParsedPost)> {
    let mut posts = Vec::with_capacity(names.len());
    for &name in names {
        let parsed = source
            .fetch(name)
            .and_then(|text| renderer.parse(&text).map_err(anyhow::Error::from));
        match parsed {
            Ok(post) => {
                debug!("loaded {name}");
                posts.push((name, post));
            }
            Err(err) => error!("Failed to load blog post {name}: {err:#}"),
        }
    }
    posts.sort_by(|(_, a), (_, b)| sort_posts(a, b));
    posts
}

/// [`load_named_posts`] without the names.
pub fn load_posts<S: PostSource + ?Sized>(
    source: &S,
    renderer: &Renderer,
    names: &[&str],
) -> Vec<ParsedPost> {
    load_named_posts(source, renderer, names)
        .into_iter()
        .map(|(_, post)| post)
        .collect()
}
