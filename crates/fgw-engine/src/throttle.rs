//! Pacing seam for the quota-bound catalog lookup. The pipeline calls
//! `pause` before every lookup; production wires a token bucket, tests wire
//! the no-op so no real time passes.

use std::time::Duration;

use async_trait::async_trait;
use fgw_storage::SimpleTokenBucket;

#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self);
}

#[derive(Debug, Default)]
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    async fn pause(&self) {}
}

#[derive(Debug)]
pub struct TokenBucketThrottle {
    bucket: SimpleTokenBucket,
}

impl TokenBucketThrottle {
    pub fn new(burst: u32, refill_every: Duration) -> Self {
        Self {
            bucket: SimpleTokenBucket::new(burst.max(1), refill_every),
        }
    }
}

#[async_trait]
impl Throttle for TokenBucketThrottle {
    async fn pause(&self) {
        self.bucket.take().await;
    }
}
