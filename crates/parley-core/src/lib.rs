//! Parley core: configuration, errors, shared types and the TTL cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use cache::{CacheEntry, Clock, ManualClock, SystemClock, TtlCache};
pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use types::*;
