//! Per-client admission control.

mod bucket;
mod key;
mod limiter;

pub use bucket::{BucketPolicy, TokenBucket};
pub use key::ClientKey;
pub use limiter::ClientRateLimiter;
