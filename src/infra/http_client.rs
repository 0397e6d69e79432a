use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::common::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};
use std::time::Duration;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        // reqwest handles gzip/deflate decompression with those features enabled
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn referer_for(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}/", parsed.scheme(), host))
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError> {
        let mut req = self.client.get(url).header(
            ACCEPT,
            "text/html,application/xhtml+xml,application/json,text/calendar;q=0.9,*/*;q=0.8",
        );
        // Some hosts answer 403 without a plausible Referer
        if let Some(referer) = referer_for(url) {
            req = req.header(REFERER, referer);
        }
        let resp = req.send().await.map_err(|e| map_err(url, e))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await.map_err(|e| map_err(url, e))?.to_vec();
        Ok(HttpGetResult {
            status,
            bytes,
            content_type,
        })
    }
}

fn map_err(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_is_site_root() {
        assert_eq!(
            referer_for("https://vilaswi.com/events/?ical=1"),
            Some("https://vilaswi.com/".to_string())
        );
        assert_eq!(referer_for("not a url"), None);
    }
}
