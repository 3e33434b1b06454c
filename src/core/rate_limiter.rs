use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Fixed-window counter for one client.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Per-IP fixed-window rate limiter.
///
/// Each client IP gets `max_requests` hits per `window`. The window opens on
/// the client's first request and resets once it has fully elapsed.
#[derive(Clone)]
pub struct RateLimiter {
    /// Current window per client
    limits: Arc<Mutex<HashMap<IpAddr, Window>>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window` for each IP.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use reelgrab::core::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let limiter = RateLimiter::new(Duration::from_secs(15 * 60), 100);
    /// ```
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            limits: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Records a hit for `ip`.
    ///
    /// # Returns
    ///
    /// `Ok(remaining)` with the hits left in the current window, or
    /// `Err(retry_after)` once the ceiling is reached. Rejected hits are not
    /// counted.
    pub async fn check(&self, ip: IpAddr) -> Result<u32, Duration> {
        let now = Instant::now();
        let mut limits = self.limits.lock().await;

        let window = limits.entry(ip).or_insert(Window { started: now, hits: 0 });
        if now.duration_since(window.started) >= self.window {
            *window = Window { started: now, hits: 0 };
        }

        if window.hits >= self.max_requests {
            let elapsed = now.duration_since(window.started);
            return Err(self.window.saturating_sub(elapsed));
        }

        window.hits += 1;
        Ok(self.max_requests - window.hits)
    }

    /// Time until the client's window resets, if it is currently limited.
    pub async fn get_remaining_time(&self, ip: IpAddr) -> Option<Duration> {
        let limits = self.limits.lock().await;
        let window = limits.get(&ip)?;
        let elapsed = Instant::now().duration_since(window.started);
        if window.hits >= self.max_requests && elapsed < self.window {
            Some(self.window - elapsed)
        } else {
            None
        }
    }

    /// Drops the limit for a client.
    pub async fn remove_rate_limit(&self, ip: IpAddr) {
        self.limits.lock().await.remove(&ip);
    }

    /// Removes windows that have fully elapsed. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut limits = self.limits.lock().await;
        let before = limits.len();
        limits.retain(|_, w| now.duration_since(w.started) < self.window);
        before - limits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_ceiling() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert_eq!(limiter.check(ip(1)).await, Ok(2));
        assert_eq!(limiter.check(ip(1)).await, Ok(1));
        assert_eq!(limiter.check(ip(1)).await, Ok(0));
        assert!(limiter.check(ip(1)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check(ip(1)).await.is_ok());
        assert!(limiter.check(ip(1)).await.is_err());
        assert!(limiter.check(ip(2)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check(ip(1)).await.is_ok());

        tokio::time::advance(Duration::from_secs(20)).await;
        let retry_after = limiter.check(ip(1)).await.unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(40));
        assert_eq!(limiter.get_remaining_time(ip(1)).await, Some(Duration::from_secs(40)));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(limiter.check(ip(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 5);
        limiter.check(ip(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.check(ip(2)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(limiter.purge_expired().await, 1);
        assert!(limiter.get_remaining_time(ip(2)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_rate_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        limiter.check(ip(1)).await.unwrap();
        limiter.remove_rate_limit(ip(1)).await;
        assert!(limiter.check(ip(1)).await.is_ok());
    }
}
