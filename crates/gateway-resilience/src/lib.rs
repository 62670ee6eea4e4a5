//! # Gateway Resilience
//!
//! Region health tracking for the Bedrock gateway:
//! - Per-region consecutive-failure counting with a fixed threshold
//! - Immediate recovery on the first success
//! - Moving-average latency per region
//! - A read-only [`HealthView`] for the cross-region resolver

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod health;

// Re-export main types
pub use health::{HealthView, RegionHealth, RegionHealthConfig, RegionHealthTracker};
