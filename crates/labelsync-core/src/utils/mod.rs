//! Utility modules for labelsync-core
//!
//! - retry: attempt-bounded, fixed-delay retry for adapter writes

mod retry;

pub use retry::{retry_write, RetryPolicy};
