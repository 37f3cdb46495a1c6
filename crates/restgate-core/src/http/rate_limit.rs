//! Server-driven rate-limit buckets
//!
//! The remote service reports its per-route budget in response headers. Each
//! bucket key owns one [`RateLimitBucket`] that is refreshed from those
//! headers and consulted before the next call for the same key goes out.
//! Gating is preventive only: a 429 can still come back and is then handled
//! like any other failed response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::warn;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";

/// Longest reset a response may announce before it is treated as malformed
pub const MAX_RESET_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Observable state of a bucket at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// No response has reported on this bucket yet
    Fresh,
    /// Calls may go out
    Available,
    /// Budget spent and the reset has not elapsed
    Exhausted,
}

/// Remaining call budget for one bucket key
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitBucket {
    limit: u32,
    remaining: u32,
    reset_at: Option<Instant>,
    server_bucket: Option<String>,
}

impl Default for RateLimitBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitBucket {
    /// Create a bucket with no data
    pub fn new() -> Self {
        Self {
            limit: 0,
            remaining: 0,
            reset_at: None,
            server_bucket: None,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> Option<Instant> {
        self.reset_at
    }

    /// Opaque bucket id reported by the server, if any
    pub fn server_bucket(&self) -> Option<&str> {
        self.server_bucket.as_deref()
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    pub fn set_remaining(&mut self, remaining: u32) {
        self.remaining = remaining;
    }

    /// Schedule the reset `after` from now, plus a guard margin.
    ///
    /// A reset too far out to represent leaves the previous one in place.
    pub fn reset_after(&mut self, after: Duration, margin: Duration) {
        match after
            .checked_add(margin)
            .and_then(|delay| Instant::now().checked_add(delay))
        {
            Some(reset_at) => self.reset_at = Some(reset_at),
            None => warn!(?after, ?margin, "Ignoring unrepresentable rate-limit reset"),
        }
    }

    /// Refresh from parsed response headers
    pub fn apply(&mut self, headers: &RateLimitHeaders, margin: Duration) {
        if let Some(limit) = headers.limit {
            self.set_limit(limit);
        }
        self.set_remaining(headers.remaining);
        self.reset_after(headers.reset_after, margin);
        if headers.bucket.is_some() {
            self.server_bucket = headers.bucket.clone();
        }
    }

    pub fn state_at(&self, now: Instant) -> BucketState {
        match self.reset_at {
            None => BucketState::Fresh,
            Some(reset_at) if self.remaining == 0 && now < reset_at => BucketState::Exhausted,
            Some(_) => BucketState::Available,
        }
    }

    /// True iff the budget is spent and the reset has not elapsed at `now`
    pub fn is_consumed_at(&self, now: Instant) -> bool {
        self.state_at(now) == BucketState::Exhausted
    }

    pub fn is_consumed(&self) -> bool {
        self.is_consumed_at(Instant::now())
    }

    /// How long a call issued at `now` would have to wait
    pub fn wait_time_at(&self, now: Instant) -> Option<Duration> {
        match self.reset_at {
            Some(reset_at) if self.is_consumed_at(now) => Some(reset_at - now),
            _ => None,
        }
    }
}

/// Rate-limit fields carried by a response
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_after: Duration,
    pub bucket: Option<String>,
}

impl RateLimitHeaders {
    /// Parse the rate-limit fields out of a header map.
    ///
    /// Returns `None` when the response carries no usable rate-limit data.
    /// Malformed values are logged and treated the same as absent ones.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw_remaining = header_str(headers, HEADER_REMAINING)?;

        let remaining = match raw_remaining.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value.max(0.0) as u32,
            _ => {
                warn!(value = %raw_remaining, "Ignoring malformed rate-limit remaining header");
                return None;
            }
        };

        let reset_after = match Self::parse_reset_after(headers) {
            Some(reset_after) => reset_after,
            None => {
                warn!("Ignoring rate-limit headers without a usable reset");
                return None;
            }
        };

        let limit = header_str(headers, HEADER_LIMIT).and_then(|v| v.trim().parse::<u32>().ok());
        let bucket = header_str(headers, HEADER_BUCKET).map(|v| v.to_string());

        Some(Self {
            limit,
            remaining,
            reset_after,
            bucket,
        })
    }

    /// Relative reset in seconds, falling back to the absolute epoch reset
    fn parse_reset_after(headers: &HeaderMap) -> Option<Duration> {
        if let Some(raw) = header_str(headers, HEADER_RESET_AFTER) {
            return parse_seconds(raw);
        }

        let reset_epoch = header_str(headers, HEADER_RESET)?.trim().parse::<f64>().ok()?;
        if !reset_epoch.is_finite() {
            return None;
        }
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        bounded_seconds((reset_epoch - now).max(0.0))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    bounded_seconds(raw.trim().parse::<f64>().ok()?)
}

fn bounded_seconds(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|duration| *duration <= MAX_RESET_AFTER)
}

#[derive(Debug)]
struct BucketEntry {
    bucket: RateLimitBucket,
    refreshed: Arc<Notify>,
}

/// All buckets known to one client, keyed by bucket key.
///
/// Updates for a key are serialized by the table lock. Every update wakes the
/// calls gated on that key so they re-check against the fresh data.
#[derive(Debug)]
pub struct BucketTable {
    entries: Mutex<HashMap<String, BucketEntry>>,
    reset_margin: Duration,
    poll_interval: Duration,
}

impl BucketTable {
    pub fn new(reset_margin: Duration, poll_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reset_margin,
            poll_interval,
        }
    }

    /// Refresh the bucket for `key`, creating it on first observation
    pub fn update(&self, key: &str, headers: &RateLimitHeaders) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| BucketEntry {
                bucket: RateLimitBucket::new(),
                refreshed: Arc::new(Notify::new()),
            });
        entry.bucket.apply(headers, self.reset_margin);
        entry.refreshed.notify_waiters();
    }

    /// Parse `headers` and refresh the bucket; returns whether an update happened
    pub fn update_from_headers(&self, key: &str, headers: &HeaderMap) -> bool {
        match RateLimitHeaders::from_headers(headers) {
            Some(parsed) => {
                self.update(key, &parsed);
                true
            }
            None => false,
        }
    }

    pub fn is_consumed(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .map(|entry| entry.bucket.is_consumed())
            .unwrap_or(false)
    }

    pub fn snapshot(&self, key: &str) -> Option<RateLimitBucket> {
        self.entries.lock().get(key).map(|entry| entry.bucket.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Suspend until the bucket for `key` is not consumed.
    ///
    /// Wakes on the reset instant, on a refresh of the bucket, or after the
    /// poll interval, whichever comes first. Returns the time spent waiting.
    pub async fn wait_until_available(&self, key: &str) -> Duration {
        let mut started: Option<Instant> = None;

        loop {
            let refreshed = {
                let entries = self.entries.lock();
                match entries.get(key) {
                    Some(entry) => Arc::clone(&entry.refreshed),
                    None => break,
                }
            };

            // Registered under the lock so an update racing the sleep still wakes us
            let notified = refreshed.notified();
            tokio::pin!(notified);

            let wait = {
                let entries = self.entries.lock();
                notified.as_mut().enable();
                match entries
                    .get(key)
                    .and_then(|entry| entry.bucket.wait_time_at(Instant::now()))
                {
                    Some(wait) => wait,
                    None => break,
                }
            };

            started.get_or_insert_with(Instant::now);
            tokio::select! {
                _ = sleep(wait.min(self.poll_interval)) => {}
                _ = &mut notified => {}
            }
        }

        started.map(|at| at.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_fresh_bucket_is_not_consumed() {
        let bucket = RateLimitBucket::new();
        assert_eq!(bucket.state_at(Instant::now()), BucketState::Fresh);
        assert!(!bucket.is_consumed());
    }

    #[test]
    fn test_exhausted_until_reset() {
        let mut bucket = RateLimitBucket::new();
        bucket.set_remaining(0);
        bucket.reset_after(Duration::from_secs(10), Duration::ZERO);

        let reset_at = bucket.reset_at().unwrap();
        assert!(bucket.is_consumed_at(reset_at - Duration::from_secs(1)));
        assert!(!bucket.is_consumed_at(reset_at));
        assert!(!bucket.is_consumed_at(reset_at + Duration::from_millis(1)));
    }

    #[test]
    fn test_remaining_budget_is_available() {
        let mut bucket = RateLimitBucket::new();
        bucket.set_remaining(3);
        bucket.reset_after(Duration::from_secs(10), Duration::ZERO);
        assert_eq!(bucket.state_at(Instant::now()), BucketState::Available);
        assert_eq!(bucket.wait_time_at(Instant::now()), None);
    }

    #[test]
    fn test_margin_extends_reset() {
        let mut bucket = RateLimitBucket::new();
        let before = Instant::now();
        bucket.reset_after(Duration::from_secs(1), Duration::from_millis(250));
        assert!(bucket.reset_at().unwrap() >= before + Duration::from_millis(1250));
    }

    #[test]
    fn test_parse_headers() {
        let map = headers(&[
            (HEADER_LIMIT, "5"),
            (HEADER_REMAINING, "4"),
            (HEADER_RESET_AFTER, "1.5"),
            (HEADER_BUCKET, "abcd1234"),
        ]);
        let parsed = RateLimitHeaders::from_headers(&map).unwrap();
        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, 4);
        assert_eq!(parsed.reset_after, Duration::from_millis(1500));
        assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn test_parse_headers_absolute_reset_fallback() {
        let reset = chrono::Utc::now().timestamp() + 30;
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET, &reset.to_string())]);
        let parsed = RateLimitHeaders::from_headers(&map).unwrap();
        assert!(parsed.reset_after > Duration::from_secs(25));
        assert!(parsed.reset_after <= Duration::from_secs(31));
    }

    #[test]
    fn test_missing_or_malformed_headers_skip_update() {
        assert!(RateLimitHeaders::from_headers(&HeaderMap::new()).is_none());

        let map = headers(&[(HEADER_REMAINING, "lots"), (HEADER_RESET_AFTER, "1")]);
        assert!(RateLimitHeaders::from_headers(&map).is_none());

        let map = headers(&[(HEADER_REMAINING, "1")]);
        assert!(RateLimitHeaders::from_headers(&map).is_none());

        let table = BucketTable::new(Duration::ZERO, Duration::from_millis(10));
        let map = headers(&[(HEADER_REMAINING, "1"), (HEADER_RESET_AFTER, "soon")]);
        assert!(!table.update_from_headers("/a", &map));
        assert!(table.is_empty());
    }

    #[test]
    fn test_out_of_range_reset_is_malformed() {
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "1e20")]);
        assert!(RateLimitHeaders::from_headers(&map).is_none());

        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "90000")]);
        assert!(RateLimitHeaders::from_headers(&map).is_none());

        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET, "1e300")]);
        assert!(RateLimitHeaders::from_headers(&map).is_none());

        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "86400")]);
        assert_eq!(
            RateLimitHeaders::from_headers(&map).unwrap().reset_after,
            MAX_RESET_AFTER
        );
    }

    #[test]
    fn test_unrepresentable_reset_keeps_previous() {
        let mut bucket = RateLimitBucket::new();
        bucket.set_remaining(0);
        bucket.reset_after(Duration::from_secs(5), Duration::ZERO);
        let reset_at = bucket.reset_at();

        bucket.reset_after(Duration::MAX, Duration::from_secs(1));
        assert_eq!(bucket.reset_at(), reset_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_refresh_between_checks() {
        let table = Arc::new(BucketTable::new(Duration::ZERO, Duration::from_secs(3600)));
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "3600")]);
        table.update_from_headers("/k", &map);

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.wait_until_available("/k").await })
        };
        tokio::task::yield_now().await;

        let map = headers(&[(HEADER_REMAINING, "1"), (HEADER_RESET_AFTER, "3600")]);
        table.update_from_headers("/k", &map);

        let waited = waiter.await.unwrap();
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn test_table_creates_then_refreshes() {
        let table = BucketTable::new(Duration::ZERO, Duration::from_millis(10));
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "60")]);
        assert!(table.update_from_headers("/channels/:id", &map));
        assert_eq!(table.len(), 1);
        assert!(table.is_consumed("/channels/:id"));
        assert!(!table.is_consumed("/other"));

        let map = headers(&[(HEADER_REMAINING, "2"), (HEADER_RESET_AFTER, "60")]);
        table.update_from_headers("/channels/:id", &map);
        assert_eq!(table.len(), 1);
        assert_eq!(table.snapshot("/channels/:id").unwrap().remaining(), 2);
        assert!(!table.is_consumed("/channels/:id"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_reset_elapses() {
        let table = BucketTable::new(Duration::ZERO, Duration::from_millis(500));
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "2")]);
        table.update_from_headers("/k", &map);

        let waited = table.wait_until_available("/k").await;
        assert!(waited >= Duration::from_secs(2));
        assert!(!table.is_consumed("/k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_refresh() {
        let table = Arc::new(BucketTable::new(Duration::ZERO, Duration::from_secs(60)));
        let map = headers(&[(HEADER_REMAINING, "0"), (HEADER_RESET_AFTER, "600")]);
        table.update_from_headers("/k", &map);

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.wait_until_available("/k").await })
        };

        sleep(Duration::from_secs(1)).await;
        let map = headers(&[(HEADER_REMAINING, "5"), (HEADER_RESET_AFTER, "600")]);
        table.update_from_headers("/k", &map);

        let waited = waiter.await.unwrap();
        assert!(waited < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_unknown_key_does_not_wait() {
        let table = BucketTable::new(Duration::ZERO, Duration::from_millis(10));
        assert_eq!(table.wait_until_available("/nothing").await, Duration::ZERO);
    }
}
