//! Token buckets for third-party provider rate limits.
//!
//! Every outbound enricher holds a bucket sized to its provider's
//! documented free-tier limit, in addition to its concurrency semaphore.
//! When a bucket runs dry, callers wait; the scheduler keeps feeding the
//! other enrichers in the meantime.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket holding up to `capacity` tokens, refilled at
    /// `refill_per_sec` tokens per second.
    pub fn new(capacity: u32, refill_per_sec: f64) -> TokenBucket {
        let capacity = f64::from(capacity.max(1));
        TokenBucket {
            capacity,
            refill_per_sec: refill_per_sec.max(0.001),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket allowing one operation per `interval` (capacity 1).
    pub fn per_interval(interval: Duration) -> TokenBucket {
        let secs = interval.as_secs_f64().max(0.001);
        TokenBucket::new(1, 1.0 / secs)
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                None => return,
                Some(wait) => sleep(wait).await,
            }
        }
    }

    /// `None` if a token was taken, otherwise the time to wait before the
    /// next token is due.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}
