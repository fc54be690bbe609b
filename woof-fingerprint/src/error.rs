use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("embedding blob had {got} bytes, expected {expected}")]
    MalformedEmbedding { got: usize, expected: usize },
}
