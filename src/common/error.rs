use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;

/// Network, timeout and HTTP-level failures for a single URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("render failed for {url}: {message}")]
    Render { url: String, message: String },

    #[error("invalid url {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Transient failures are retried; 4xx responses (other than 429) are terminal for the URL.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Render { .. } | FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Malformed content. Never retried; callers degrade to empty or partial output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("malformed RSS: {0}")]
    Rss(String),
}

/// Why a candidate could not become a `NormalizedEvent`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizationFailure {
    #[error("candidate has neither title nor start")]
    Empty,

    #[error("candidate has no title")]
    EmptyTitle,

    #[error("candidate has no start")]
    MissingStart,

    #[error("start could not be parsed")]
    UnparseableDate,

    #[error("start still missing after enrichment")]
    MissingStartAfterEnrichment,

    #[error("title still missing after enrichment")]
    EmptyTitleAfterEnrichment,
}

impl NormalizationFailure {
    /// Stable key used in the run report.
    pub fn reason(&self) -> &'static str {
        match self {
            NormalizationFailure::Empty => "empty_candidate",
            NormalizationFailure::EmptyTitle => "empty_title",
            NormalizationFailure::MissingStart => "missing_start",
            NormalizationFailure::UnparseableDate => "unparseable_date",
            NormalizationFailure::MissingStartAfterEnrichment => "missing_start_after_enrichment",
            NormalizationFailure::EmptyTitleAfterEnrichment => "empty_title_after_enrichment",
        }
    }
}

/// Enrichment never propagates past the enricher; this only feeds logs and stats.
#[derive(Error, Debug)]
pub enum EnrichmentFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no structured metadata found")]
    NothingFound,
}
