use crate::app::ports::{HttpClientPort, RenderPort};
use crate::common::error::FetchError;
use crate::infra::rate_limiter::DomainRateLimiter;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Every network read in a run goes through here: per-domain gate, independent
/// timeout, bounded retries on transient failures.
#[derive(Clone)]
pub struct Fetcher {
    http: Arc<dyn HttpClientPort>,
    renderer: Option<Arc<dyn RenderPort>>,
    limiter: Arc<DomainRateLimiter>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        limiter: Arc<DomainRateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            http,
            renderer: None,
            limiter,
            policy,
        }
    }

    /// Pages from `render = true` sources go through `renderer` instead of a plain GET.
    pub fn with_renderer(mut self, renderer: Arc<dyn RenderPort>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Fetch a URL as text. Non-2xx is an error; 4xx is never retried.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let url = normalize_url(url);
        let host = host_of(&url).ok_or_else(|| FetchError::InvalidUrl { url: url.clone() })?;
        let limiter = self.limiter.for_host(&host);

        let mut attempt = 0u32;
        loop {
            let _permit = limiter.acquire().await;
            let t0 = Instant::now();
            let result = match tokio::time::timeout(self.policy.timeout, self.http.get(&url)).await {
                Err(_) => Err(FetchError::Timeout { url: url.clone() }),
                Ok(Err(e)) => Err(e),
                Ok(Ok(resp)) if resp.is_success() => Ok(resp.text()),
                Ok(Ok(resp)) => Err(FetchError::Status {
                    url: url.clone(),
                    status: resp.status,
                }),
            };
            drop(_permit);

            match result {
                Ok(body) => {
                    metrics::fetch::request_success(&host, t0.elapsed().as_secs_f64(), body.len());
                    debug!(url = %url, bytes = body.len(), "Fetched");
                    return Ok(body);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    metrics::fetch::retry(&host);
                    let wait = self.policy.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(url = %url, attempt, error = %e, "Transient fetch failure, retrying in {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    metrics::fetch::request_error(&host);
                    return Err(e);
                }
            }
        }
    }

    /// Rendered HTML when a renderer is configured, plain fetch otherwise.
    pub async fn fetch_rendered(&self, url: &str) -> Result<String, FetchError> {
        let Some(renderer) = &self.renderer else {
            debug!(url = %url, "No renderer configured, falling back to plain fetch");
            return self.fetch_text(url).await;
        };
        let url = normalize_url(url);
        let host = host_of(&url).ok_or_else(|| FetchError::InvalidUrl { url: url.clone() })?;
        let _permit = self.limiter.for_host(&host).acquire().await;
        match tokio::time::timeout(self.policy.timeout * 3, renderer.render(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { url }),
        }
    }
}

/// `webcal://` feeds are served over https.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => trimmed.to_string(),
    }
}

pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" => parsed.host_str().map(|h| h.to_ascii_lowercase()),
        _ => None,
    }
}
