use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolygonError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Polygon returned error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("base URL cannot carry a path: {0}")]
    BaseUrl(String),
}

impl PolygonError {
    /// The distinguished soft failure of the ticker detail lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PolygonError::NotFound(_))
    }
}
