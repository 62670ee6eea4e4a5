//! Cross-region model id resolution.
//!
//! Two tiers share one candidate order:
//!
//! 1. `global.<model>` when the model has a global profile and the caller's
//!    region is on the global allow-list
//! 2. `<geo>.<model>` for the caller region's geography
//! 3. the original, unqualified id
//!
//! [`CrossRegionResolver::resolve`] is pure and returns the first candidate.
//! [`CrossRegionResolver::resolve_with_fallback`] skips qualified candidates
//! whose route key the health view reports as unhealthy.

use crate::profiles::{ModelProfiles, DEFAULT_GLOBAL_REGIONS, DEFAULT_PROFILES};
use crate::region::{
    geography_for_region, normalize_region, split_qualified, Geography, GLOBAL_PREFIX,
};
use gateway_resilience::HealthView;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// How a resolved id is qualified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualification {
    /// `global.` profile
    Global,
    /// Geography profile
    Geography(Geography),
    /// Plain model id or resource ARN
    Unqualified,
}

impl fmt::Display for Qualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_PREFIX),
            Self::Geography(geography) => write!(f, "{geography}"),
            Self::Unqualified => f.write_str("unqualified"),
        }
    }
}

/// Outcome of resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Model id to send to the backend
    pub model_id: String,
    /// Qualification of `model_id`
    pub qualification: Qualification,
    /// Key under which call outcomes are recorded in region health
    pub route_key: String,
}

impl ResolvedModel {
    fn unqualified(model_id: &str, caller_region: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            qualification: Qualification::Unqualified,
            route_key: caller_region.to_string(),
        }
    }

    fn qualified(base_model_id: &str, qualification: Qualification) -> Self {
        let prefix = match qualification {
            Qualification::Global => GLOBAL_PREFIX.to_string(),
            Qualification::Geography(geography) => geography.prefix().to_string(),
            Qualification::Unqualified => String::new(),
        };
        Self {
            model_id: format!("{prefix}.{base_model_id}"),
            qualification,
            route_key: prefix,
        }
    }
}

/// Resolver over immutable profile tables
#[derive(Debug, Clone)]
pub struct CrossRegionResolver {
    profiles: HashMap<String, ModelProfiles>,
    global_regions: HashSet<String>,
}

impl Default for CrossRegionResolver {
    fn default() -> Self {
        let profiles = DEFAULT_PROFILES
            .iter()
            .map(|(model, geographies, global)| {
                let mut entry = ModelProfiles::geographies(geographies);
                entry.global = *global;
                ((*model).to_string(), entry)
            })
            .collect();
        let global_regions = DEFAULT_GLOBAL_REGIONS
            .iter()
            .map(|region| (*region).to_string())
            .collect();

        Self {
            profiles,
            global_regions,
        }
    }
}

impl CrossRegionResolver {
    /// Resolver with the built-in tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with no profiles at all
    #[must_use]
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            global_regions: HashSet::new(),
        }
    }

    /// Register or replace the profiles of a base model
    #[must_use]
    pub fn with_profile(mut self, base_model_id: impl Into<String>, profiles: ModelProfiles) -> Self {
        self.profiles.insert(base_model_id.into(), profiles);
        self
    }

    /// Allow a region to use global profiles
    #[must_use]
    pub fn with_global_region(mut self, region: impl Into<String>) -> Self {
        let region: String = region.into();
        self.global_regions.insert(normalize_region(&region));
        self
    }

    /// Profiles of a base model
    #[must_use]
    pub fn profiles_for(&self, base_model_id: &str) -> Option<&ModelProfiles> {
        self.profiles.get(base_model_id)
    }

    /// Ordered qualified candidates for a base id. `caller_region` is
    /// already normalized.
    fn candidates(&self, base_model_id: &str, caller_region: &str) -> Vec<ResolvedModel> {
        let Some(profiles) = self.profiles.get(base_model_id) else {
            return Vec::new();
        };

        let mut candidates = Vec::with_capacity(2);
        if profiles.global && self.global_regions.contains(caller_region) {
            candidates.push(ResolvedModel::qualified(base_model_id, Qualification::Global));
        }
        if let Some(geography) = geography_for_region(caller_region) {
            if profiles.has(geography) {
                candidates.push(ResolvedModel::qualified(
                    base_model_id,
                    Qualification::Geography(geography),
                ));
            }
        }
        candidates
    }

    /// Ids that must not be rewritten: ARNs and already-qualified ids
    fn passthrough(model_id: &str, caller_region: &str) -> Option<ResolvedModel> {
        if model_id.starts_with("arn:") {
            return Some(ResolvedModel::unqualified(model_id, caller_region));
        }
        let (prefix, _) = split_qualified(model_id)?;
        let qualification = Geography::from_prefix(prefix)
            .map_or(Qualification::Global, Qualification::Geography);
        Some(ResolvedModel {
            model_id: model_id.to_string(),
            qualification,
            route_key: prefix.to_string(),
        })
    }

    /// Pure, health-blind resolution
    #[must_use]
    pub fn resolve(&self, base_model_id: &str, caller_region: &str) -> ResolvedModel {
        let region = normalize_region(caller_region);
        if let Some(resolved) = Self::passthrough(base_model_id, &region) {
            return resolved;
        }
        self.candidates(base_model_id, &region)
            .into_iter()
            .next()
            .unwrap_or_else(|| ResolvedModel::unqualified(base_model_id, &region))
    }

    /// Health-aware resolution.
    ///
    /// Without a health view this is exactly [`Self::resolve`]. The unqualified id
    /// is the last resort and is returned even when its region is unhealthy.
    #[must_use]
    pub fn resolve_with_fallback(
        &self,
        base_model_id: &str,
        caller_region: &str,
        health_view: Option<&dyn HealthView>,
    ) -> ResolvedModel {
        let Some(view) = health_view else {
            return self.resolve(base_model_id, caller_region);
        };
        let region = normalize_region(caller_region);
        if let Some(resolved) = Self::passthrough(base_model_id, &region) {
            return resolved;
        }

        for candidate in self.candidates(base_model_id, &region) {
            if view.is_healthy(&candidate.route_key) {
                return candidate;
            }
            debug!(
                model = %base_model_id,
                skipped = %candidate.model_id,
                route_key = %candidate.route_key,
                "Skipping unhealthy cross-region profile"
            );
        }
        ResolvedModel::unqualified(base_model_id, &region)
    }
}
