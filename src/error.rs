use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// No closing `---` line after the opening one.
    #[error("No frontmatter found")]
    MissingFrontmatter,
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RenderError {
    #[error("markdown renderer is not initialized; call markdown::init first")]
    NotInitialized,
    #[error("markdown renderer is already initialized")]
    AlreadyInitialized,
}
