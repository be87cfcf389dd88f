//! Cross-tier consistency checks.
//!
//! The sliding-window check reads every tier from one log sized for the
//! largest tier, which is only correct when counts grow and permitted rates
//! shrink as windows get longer. This module reports every tier breaking
//! that rule instead of stopping at the first one.

use std::fmt;
use tracing::warn;

use crate::config::{CompiledRateLimitConfig, ServiceLimitSet, Tier};

/// Why a tier was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    /// The flagged (longer) tier does not allow more accesses than `shorter`
    CountNotIncreasing { shorter: Tier },
    /// The flagged (shorter) tier does not permit a strictly higher rate than `longer`
    RateNotDecreasing { longer: Tier },
}

/// One inconsistency found in a service's tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierViolation {
    pub service: String,
    pub tier: Tier,
    pub reason: ViolationReason,
}

impl fmt::Display for TierViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            ViolationReason::CountNotIncreasing { shorter } => write!(
                f,
                "service {}: tier {}s/{} must allow more than the {} accesses of tier {}s",
                self.service,
                self.tier.window_seconds,
                self.tier.max_count,
                shorter.max_count,
                shorter.window_seconds
            ),
            ViolationReason::RateNotDecreasing { longer } => write!(
                f,
                "service {}: tier {}s/{} must permit a higher rate than tier {}s/{}",
                self.service,
                self.tier.window_seconds,
                self.tier.max_count,
                longer.window_seconds,
                longer.max_count
            ),
        }
    }
}

/// Outcome of a full validation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<TierViolation>,
}

impl ValidationReport {
    pub fn is_proper(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[TierViolation] {
        &self.violations
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Returns true iff every service's tiers are consistent.
    ///
    /// Each violation is logged as a warning.
    pub fn verify(config: &CompiledRateLimitConfig) -> bool {
        Self::inspect(config).is_proper()
    }

    /// Check every service and collect all violations
    pub fn inspect(config: &CompiledRateLimitConfig) -> ValidationReport {
        let mut violations = Vec::new();
        for (service, limits) in config.services() {
            Self::inspect_service(service, limits, &mut violations);
        }

        for violation in &violations {
            warn!(service = %violation.service, "Improper rate limit tier: {}", violation);
        }

        ValidationReport { violations }
    }

    fn inspect_service(service: &str, limits: &ServiceLimitSet, out: &mut Vec<TierViolation>) {
        let tiers = limits.tiers();
        for (i, shorter) in tiers.iter().enumerate() {
            for longer in &tiers[i + 1..] {
                if longer.max_count <= shorter.max_count {
                    out.push(TierViolation {
                        service: service.to_string(),
                        tier: *longer,
                        reason: ViolationReason::CountNotIncreasing { shorter: *shorter },
                    });
                }
                if !rate_exceeds(shorter, longer) {
                    out.push(TierViolation {
                        service: service.to_string(),
                        tier: *shorter,
                        reason: ViolationReason::RateNotDecreasing { longer: *longer },
                    });
                }
            }
        }
    }
}

/// `a.max_count / a.window_seconds > b.max_count / b.window_seconds`, exactly
fn rate_exceeds(a: &Tier, b: &Tier) -> bool {
    (a.max_count as u128) * (b.window_seconds as u128)
        > (b.max_count as u128) * (a.window_seconds as u128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(tiers: Vec<Tier>) -> CompiledRateLimitConfig {
        let mut services = BTreeMap::new();
        services.insert("s".to_string(), ServiceLimitSet::new("s", tiers).unwrap());
        CompiledRateLimitConfig::from_services(services)
    }

    #[test]
    fn test_proper_tiers() {
        let config = config_with(vec![Tier::new(60, 2), Tier::new(3600, 5)]);
        assert!(ConfigValidator::verify(&config));
        assert!(ConfigValidator::inspect(&config).violations().is_empty());
    }

    #[test]
    fn test_single_tier_is_proper() {
        let config = config_with(vec![Tier::new(60, 1)]);
        assert!(ConfigValidator::verify(&config));
    }

    #[test]
    fn test_count_not_increasing() {
        let config = config_with(vec![Tier::new(60, 10), Tier::new(3600, 10)]);
        let report = ConfigValidator::inspect(&config);

        assert!(!report.is_proper());
        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].tier, Tier::new(3600, 10));
        assert_eq!(
            report.violations()[0].reason,
            ViolationReason::CountNotIncreasing {
                shorter: Tier::new(60, 10)
            }
        );
    }

    #[test]
    fn test_rate_not_decreasing() {
        // 2/60 == 120/3600
        let config = config_with(vec![Tier::new(60, 2), Tier::new(3600, 120)]);
        let report = ConfigValidator::inspect(&config);

        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].tier, Tier::new(60, 2));
        assert_eq!(
            report.violations()[0].reason,
            ViolationReason::RateNotDecreasing {
                longer: Tier::new(3600, 120)
            }
        );
    }

    #[test]
    fn test_both_directions_flagged() {
        let config = config_with(vec![Tier::new(60, 5), Tier::new(3600, 3)]);
        let report = ConfigValidator::inspect(&config);
        // 5 >= 3 flags the longer tier; 5/60 > 3/3600 so the rate is fine
        assert_eq!(report.violations().len(), 1);

        let config = config_with(vec![Tier::new(10, 5), Tier::new(20, 5), Tier::new(30, 20)]);
        let report = ConfigValidator::inspect(&config);
        let flagged: Vec<Tier> = report.violations().iter().map(|v| v.tier).collect();
        // (10,5)-(20,5): count on 20s tier; (10,5)-(30,20): 5/10 < 20/30 rate on 10s tier;
        // (20,5)-(30,20): 5/20 < 20/30 rate on 20s tier
        assert_eq!(
            flagged,
            vec![Tier::new(20, 5), Tier::new(10, 5), Tier::new(20, 5)]
        );
    }

    #[test]
    fn test_sweep_covers_all_services() {
        let mut services = BTreeMap::new();
        services.insert(
            "a".to_string(),
            ServiceLimitSet::new("a", vec![Tier::new(60, 5), Tier::new(120, 5)]).unwrap(),
        );
        services.insert(
            "b".to_string(),
            ServiceLimitSet::new("b", vec![Tier::new(60, 5), Tier::new(120, 4)]).unwrap(),
        );
        services.insert(
            "c".to_string(),
            ServiceLimitSet::new("c", vec![Tier::new(60, 2), Tier::new(3600, 5)]).unwrap(),
        );
        let config = CompiledRateLimitConfig::from_services(services);

        let report = ConfigValidator::inspect(&config);
        let flagged: Vec<&str> = report.violations().iter().map(|v| v.service.as_str()).collect();
        assert_eq!(flagged, vec!["a", "b"]);
        assert!(!ConfigValidator::verify(&config));
    }

    #[test]
    fn test_violation_display() {
        let violation = TierViolation {
            service: "s".to_string(),
            tier: Tier::new(3600, 2),
            reason: ViolationReason::CountNotIncreasing {
                shorter: Tier::new(60, 2),
            },
        };
        assert!(violation.to_string().contains("service s"));
        assert!(violation.to_string().contains("3600s"));
    }
}
