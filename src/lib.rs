//! Parsing of markdown blog posts with a `---` delimited metadata header.
//!
//! ```no_run
//! let renderer = blogpost::markdown::init(Default::default())?;
//! let post = renderer.parse("---\ntitle: Hello\n---\nArea is $\\pi r^2$.")?;
//! assert_eq!(post.meta().title.as_deref(), Some("Hello"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod frontmatter;
pub mod loader;
pub mod markdown;
pub mod metadata;
pub mod post;

pub use error::{ParseError, RenderError};
pub use loader::{load_named_posts, load_posts, DirSource, PostSource, DEFAULT_POSTS};
pub use markdown::{MarkdownOptions, Renderer};
pub use metadata::PostMetadata;
pub use post::{parse_post, ParsedPost};
