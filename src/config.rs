use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::{
    error::{RateLimitError, Result},
    utils::parse_duration,
    validator::ConfigValidator,
};

/// Rate limit configuration as written by operators:
/// service name -> window duration string -> max count.
///
/// ```yaml
/// search:
///   1m: 2
///   1h: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitConfig {
    pub services: BTreeMap<String, BTreeMap<String, u64>>,
}

/// At most `max_count` accesses in any trailing `window_seconds`-second interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tier {
    pub window_seconds: u64,
    pub max_count: u64,
}

impl Tier {
    pub fn new(window_seconds: u64, max_count: u64) -> Self {
        Self {
            window_seconds,
            max_count,
        }
    }
}

/// Longest window accepted, in seconds. Redis rejects larger EXPIRE values.
pub const MAX_WINDOW_SECONDS: u64 = (i64::MAX / 1000) as u64;

/// Largest count accepted. The count doubles as a list index in the store.
pub const MAX_TIER_COUNT: u64 = isize::MAX as u64;

/// All tiers of one service, sorted ascending by window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLimitSet {
    tiers: Vec<Tier>,
    max_window_seconds: u64,
    max_count: u64,
    probe_positions: Vec<usize>,
    log_capacity: usize,
}

impl ServiceLimitSet {
    /// Build a limit set from already-normalized tiers.
    ///
    /// Tiers are sorted by window. Cross-tier consistency is not checked here,
    /// see [`ConfigValidator`].
    pub fn new(service: &str, mut tiers: Vec<Tier>) -> Result<Self> {
        tiers.sort_by_key(|tier| tier.window_seconds);

        let last = *tiers
            .last()
            .ok_or_else(|| RateLimitError::EmptyTierSet(service.to_string()))?;

        for tier in &tiers {
            if tier.window_seconds == 0 || tier.max_count == 0 {
                return Err(RateLimitError::Config(format!(
                    "Service {} has a tier with a zero window or count ({}s, {})",
                    service, tier.window_seconds, tier.max_count
                )));
            }
            if tier.window_seconds > MAX_WINDOW_SECONDS {
                return Err(RateLimitError::Config(format!(
                    "Service {} has a {}s window, the longest supported is {}s",
                    service, tier.window_seconds, MAX_WINDOW_SECONDS
                )));
            }
            if tier.max_count > MAX_TIER_COUNT {
                return Err(RateLimitError::Config(format!(
                    "Service {} allows {} accesses in a tier, the most supported is {}",
                    service, tier.max_count, MAX_TIER_COUNT
                )));
            }
        }
        if let Some(pair) = tiers
            .windows(2)
            .find(|pair| pair[0].window_seconds == pair[1].window_seconds)
        {
            return Err(RateLimitError::Config(format!(
                "Service {} defines the {}s window more than once",
                service, pair[0].window_seconds
            )));
        }

        let probe_positions = tiers
            .iter()
            .map(|tier| list_index(service, tier.max_count))
            .collect::<Result<Vec<_>>>()?;
        let log_capacity = list_index(service, last.max_count)?
            .checked_add(1)
            .ok_or_else(|| {
                RateLimitError::Config(format!(
                    "Service {} allows too many accesses to keep a log of them",
                    service
                ))
            })?;

        Ok(Self {
            tiers,
            max_window_seconds: last.window_seconds,
            max_count: last.max_count,
            probe_positions,
            log_capacity,
        })
    }

    /// Parse a raw duration -> count mapping for one service
    pub fn from_raw(service: &str, raw: &BTreeMap<String, u64>) -> Result<Self> {
        let tiers = raw
            .iter()
            .map(|(duration, &max_count)| Ok(Tier::new(parse_duration(duration)?, max_count)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(service, tiers)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn max_window_seconds(&self) -> u64 {
        self.max_window_seconds
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    /// Log index checked for each tier, in tier order
    pub fn probe_positions(&self) -> &[usize] {
        &self.probe_positions
    }

    /// Number of entries kept in an access log for this service
    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }
}

fn list_index(service: &str, count: u64) -> Result<usize> {
    usize::try_from(count).map_err(|_| {
        RateLimitError::Config(format!(
            "Service {} count {} does not fit a log index on this platform",
            service, count
        ))
    })
}

/// Immutable per-process configuration, built once at start-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledRateLimitConfig {
    services: BTreeMap<String, ServiceLimitSet>,
}

impl CompiledRateLimitConfig {
    /// Compile a configuration for efficient runtime lookups
    pub fn compile(config: &RateLimitConfig) -> Result<Self> {
        let mut services = BTreeMap::new();
        for (service, raw) in &config.services {
            services.insert(service.clone(), ServiceLimitSet::from_raw(service, raw)?);
        }

        info!(services = services.len(), "Compiled rate limit configuration");
        Ok(Self { services })
    }

    /// Compile and refuse tier sets the sliding-window check cannot honour
    pub fn compile_verified(config: &RateLimitConfig) -> Result<Self> {
        let compiled = Self::compile(config)?;
        let report = ConfigValidator::inspect(&compiled);
        if !report.is_proper() {
            let reasons: Vec<String> = report.violations().iter().map(|v| v.to_string()).collect();
            return Err(RateLimitError::Config(format!(
                "Inconsistent rate limit tiers: {}",
                reasons.join("; ")
            )));
        }
        Ok(compiled)
    }

    pub fn from_services(services: BTreeMap<String, ServiceLimitSet>) -> Self {
        Self { services }
    }

    /// Find the limit set for a service
    pub fn find_service(&self, service: &str) -> Option<&ServiceLimitSet> {
        self.services.get(service)
    }

    /// Services in lexicographic order
    pub fn services(&self) -> impl Iterator<Item = (&str, &ServiceLimitSet)> {
        self.services.iter().map(|(name, limits)| (name.as_str(), limits))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Load configuration from YAML string
pub fn load_config_from_yaml(yaml: &str) -> Result<RateLimitConfig> {
    serde_yaml::from_str(yaml)
        .map_err(|e| RateLimitError::Config(format!("Failed to parse YAML: {}", e)))
}

/// Load configuration from YAML file
pub fn load_config_from_file(path: &str) -> Result<RateLimitConfig> {
    info!(path, "Loading rate limit configuration");
    let content = std::fs::read_to_string(path)?;
    load_config_from_yaml(&content)
}
