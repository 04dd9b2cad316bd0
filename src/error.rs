use std::io;

use thiserror::Error;

/// Errors surfaced by the post store and index.
#[derive(Debug, Error)]
pub enum PostError {
    /// The post is missing on disk, or filtered out by a tag.
    #[error("Post not found: {0}")]
    NotFound(String),

    /// A query ran fine but nothing matched it.
    #[error("No posts matched {0}")]
    EmptyResult(String),

    #[error("Unable to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("Post {0} has no content")]
    MissingContent(String),

    #[error("Invalid post id {0:?}")]
    InvalidId(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PostError {
    pub fn parse(file: &str, reason: impl ToString) -> Self {
        PostError::Parse {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PostError::NotFound(_) | PostError::InvalidId(_))
    }
}

pub type Result<T> = std::result::Result<T, PostError>;
