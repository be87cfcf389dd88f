//! Rust Tiered Rate Limit
//!
//! Per-service, per-consumer sliding-window rate limiting backed by a shared
//! Redis instance. A service declares several tiers (for example 2 per minute
//! and 5 per hour); a single round trip records the access and checks every
//! tier against one bounded list of recent access timestamps.

pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod redis;
pub mod registry;
pub mod settings;
pub mod store;
pub mod utils;
pub mod validator;

// Re-export main types
pub use crate::config::{CompiledRateLimitConfig, RateLimitConfig, ServiceLimitSet, Tier};
pub use crate::error::{RateLimitError, Result};
pub use crate::limiter::RateLimiter;
pub use crate::redis::{RedisConfig, RedisStore};
pub use crate::registry::Registry;
pub use crate::store::{AccessLogStore, KeyspaceStore, MemoryStore};
pub use crate::utils::{Clock, KeyScheme, ManualClock, SystemClock};
pub use crate::validator::{ConfigValidator, TierViolation, ValidationReport, ViolationReason};
