use crate::common::error::FetchError;
use async_trait::async_trait;

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// One GET attempt. Non-2xx responses are returned, not raised; the fetcher decides.
    async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Headless-browser rendering for JavaScript-dependent pages.
#[async_trait]
pub trait RenderPort: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, FetchError>;
}
