//! Per-region health tracking.
//!
//! Every backend call reports its outcome here. A region turns unhealthy
//! after a fixed number of consecutive failures and recovers on the first
//! success. The cross-region resolver reads this state through
//! [`HealthView`] to skip unhealthy region-qualified variants.

use dashmap::DashMap;
use gateway_core::HealthStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Read-only view of region health used by routing
pub trait HealthView: Send + Sync {
    /// Whether the region (or route key) is currently healthy.
    ///
    /// Keys that were never recorded are healthy.
    fn is_healthy(&self, key: &str) -> bool;
}

/// Region health tracker configuration
#[derive(Debug, Clone)]
pub struct RegionHealthConfig {
    /// Consecutive failures before a region is marked unhealthy
    pub failure_threshold: u32,
    /// Weight of the newest latency sample in the moving average (0.0 - 1.0)
    pub latency_smoothing: f64,
}

impl Default for RegionHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            latency_smoothing: 0.3,
        }
    }
}

/// Health record of one region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionHealth {
    /// Whether the region should be preferred
    pub is_healthy: bool,
    /// Consecutive failures since the last success
    pub error_count: u32,
    /// Moving average of observed latency
    pub avg_latency: Duration,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the record was last updated
    pub updated_at: Option<Instant>,
}

impl Default for RegionHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            error_count: 0,
            avg_latency: Duration::ZERO,
            last_error: None,
            updated_at: None,
        }
    }
}

/// Process-wide region health map
#[derive(Debug, Default)]
pub struct RegionHealthTracker {
    config: RegionHealthConfig,
    regions: DashMap<String, Arc<Mutex<RegionHealth>>>,
}

impl RegionHealthTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(config: RegionHealthConfig) -> Self {
        Self {
            config,
            regions: DashMap::new(),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RegionHealthConfig::default())
    }

    /// Configured failure threshold
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    fn entry(&self, region: &str) -> Arc<Mutex<RegionHealth>> {
        if let Some(existing) = self.regions.get(region) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.regions
                .entry(region.to_string())
                .or_default()
                .value(),
        )
    }

    /// Record the outcome of one backend call
    pub fn record_result(
        &self,
        region: &str,
        success: bool,
        latency: Duration,
        error: Option<&str>,
    ) {
        let entry = self.entry(region);
        let mut health = entry.lock();
        health.updated_at = Some(Instant::now());

        if success {
            let recovered = !health.is_healthy;
            health.avg_latency = self.smooth_latency(health.avg_latency, latency);
            health.error_count = 0;
            health.is_healthy = true;

            if recovered {
                info!(region = %region, "Region recovered");
            } else {
                debug!(
                    region = %region,
                    latency_ms = latency.as_millis() as u64,
                    "Region call succeeded"
                );
            }
            return;
        }

        health.error_count = health.error_count.saturating_add(1);
        health.last_error = Some(error.unwrap_or("unknown error").to_string());

        if health.is_healthy && health.error_count >= self.config.failure_threshold {
            health.is_healthy = false;
            warn!(
                region = %region,
                failures = health.error_count,
                threshold = self.config.failure_threshold,
                error = health.last_error.as_deref().unwrap_or_default(),
                "Region marked unhealthy"
            );
        } else {
            debug!(
                region = %region,
                failures = health.error_count,
                "Region call failed"
            );
        }
    }

    /// Record a success
    pub fn record_success(&self, region: &str, latency: Duration) {
        self.record_result(region, true, latency, None);
    }

    /// Record a failure
    pub fn record_failure(&self, region: &str, latency: Duration, error: &str) {
        self.record_result(region, false, latency, Some(error));
    }

    fn smooth_latency(&self, previous: Duration, sample: Duration) -> Duration {
        if previous.is_zero() {
            return sample;
        }
        let alpha = self.config.latency_smoothing.clamp(0.0, 1.0);
        previous.mul_f64(1.0 - alpha) + sample.mul_f64(alpha)
    }

    /// Current health of a region (healthy default when never seen)
    #[must_use]
    pub fn health_of(&self, region: &str) -> RegionHealth {
        self.regions
            .get(region)
            .map(|entry| entry.value().lock().clone())
            .unwrap_or_default()
    }

    /// Snapshot of every tracked region, sorted by key
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, RegionHealth)> {
        let mut all: Vec<_> = self
            .regions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Aggregate status across tracked regions
    #[must_use]
    pub fn overall_status(&self) -> HealthStatus {
        let snapshot = self.snapshot();
        let unhealthy = snapshot.iter().filter(|(_, h)| !h.is_healthy).count();
        match unhealthy {
            0 => HealthStatus::Healthy,
            n if n == snapshot.len() => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        }
    }

    /// Forget every region
    pub fn reset(&self) {
        self.regions.clear();
    }
}

impl HealthView for RegionHealthTracker {
    fn is_healthy(&self, key: &str) -> bool {
        self.regions
            .get(key)
            .map_or(true, |entry| entry.value().lock().is_healthy)
    }
}
