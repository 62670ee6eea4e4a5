//! # Gateway Routing
//!
//! Cross-region routing for the Bedrock gateway.
//!
//! This crate provides:
//! - The AWS region to inference-profile geography table
//! - Built-in cross-region profile tables per base model
//! - A pure resolver and a health-aware resolver with fallback

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod profiles;
pub mod region;
pub mod resolver;

// Re-export main types
pub use profiles::ModelProfiles;
pub use region::{geography_for_region, normalize_region, Geography, GLOBAL_PREFIX};
pub use resolver::{CrossRegionResolver, Qualification, ResolvedModel};
