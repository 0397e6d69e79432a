use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    pub concurrency: Option<u32>,
}

/// Token bucket plus concurrency cap for a single host.
#[derive(Debug)]
pub struct RateLimiter {
    limits: Limits,
    // token bucket is modeled by the current tokens and the time of last refill
    rpm_tokens: AsyncMutex<(f64, Instant)>,
    sem: Option<Arc<Semaphore>>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let rpm_capacity = limits.requests_per_min.unwrap_or(0) as f64;
        let sem = limits
            .concurrency
            .map(|c| Arc::new(Semaphore::new(c.max(1) as usize)));
        Self {
            limits,
            rpm_tokens: AsyncMutex::new((rpm_capacity, Instant::now())),
            sem,
        }
    }

    /// Wait for a request slot. The returned permit holds the concurrency slot
    /// until dropped, so keep it alive for the whole request.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = match &self.sem {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        if let Some(rpm) = self.limits.requests_per_min {
            if rpm > 0 {
                self.consume_token(rpm as f64, 60.0).await;
            }
        }
        permit
    }

    async fn consume_token(&self, capacity: f64, period_secs: f64) {
        // Refill continuously, wait until a whole token accumulates
        loop {
            let mut guard = self.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            let refill_rate = capacity / period_secs;
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}

/// One limiter per host, created lazily and shared by every concurrent fetch task.
#[derive(Debug)]
pub struct DomainRateLimiter {
    limits: Limits,
    hosts: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl DomainRateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Limits::default())
    }

    pub fn for_host(&self, host: &str) -> Arc<RateLimiter> {
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hosts
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(RateLimiter::new(self.limits.clone())))
            .clone()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hosts_share_limiter() {
        let limiter = DomainRateLimiter::new(Limits {
            requests_per_min: None,
            concurrency: Some(1),
        });
        let a = limiter.for_host("Vilaswi.com");
        let b = limiter.for_host("vilaswi.com");
        assert!(Arc::ptr_eq(&a, &b));
        limiter.for_host("minocqua.org");
        assert_eq!(limiter.host_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_permit_is_held() {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: None,
            concurrency: Some(1),
        });
        let first = limiter.acquire().await;
        assert!(first.is_some());
        let second = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(second.is_err(), "second acquire must wait while the first permit lives");
        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_rpm_bucket_allows_burst_up_to_capacity() {
        let limiter = RateLimiter::new(Limits {
            requests_per_min: Some(3),
            concurrency: None,
        });
        let burst = tokio::time::timeout(Duration::from_millis(100), async {
            for _ in 0..3 {
                limiter.acquire().await;
            }
        })
        .await;
        assert!(burst.is_ok());
    }
}
