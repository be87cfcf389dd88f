// Operator check for a tier file and the shared store it will be used with.
// Run this with: RATELIMIT_LIMITS_PATH=limits.yaml cargo run --bin check_config

use anyhow::{anyhow, Result};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_tiered_ratelimit::{
    config::{load_config_from_file, CompiledRateLimitConfig},
    redis::RedisStore,
    registry::Registry,
    settings::Settings,
    store::AccessLogStore,
    validator::ConfigValidator,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_tiered_ratelimit=info,check_config=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let start_time = Instant::now();
    let settings = Settings::load()?;

    let config = check_limits(&settings)?;

    if settings.check_store {
        check_store(&settings, config).await?;
    } else {
        info!("Skipping store check");
    }

    info!("Configuration check passed in {:?}", start_time.elapsed());
    Ok(())
}

fn check_limits(settings: &Settings) -> Result<CompiledRateLimitConfig> {
    let path = settings
        .limits_path
        .as_deref()
        .ok_or_else(|| anyhow!("RATELIMIT_LIMITS_PATH is not set"))?;

    let raw = load_config_from_file(path)?;
    let config = CompiledRateLimitConfig::compile(&raw)?;

    for (service, limits) in config.services() {
        let tiers: Vec<String> = limits
            .tiers()
            .iter()
            .map(|tier| format!("{}/{}s", tier.max_count, tier.window_seconds))
            .collect();
        info!(service, "Tiers: {}", tiers.join(", "));
    }

    let report = ConfigValidator::inspect(&config);
    if !report.is_proper() {
        error!(
            "{} inconsistent tier(s) in {}; the sliding-window check would be wrong for them",
            report.violations().len(),
            path
        );
        return Err(anyhow!("Rate limit configuration is improper"));
    }

    info!(services = config.len(), "All tiers are consistent");
    Ok(config)
}

async fn check_store(settings: &Settings, config: CompiledRateLimitConfig) -> Result<()> {
    info!("Testing Redis connection at {}", settings.redis_url);

    let connection_start = Instant::now();
    let store = match RedisStore::connect(settings.redis_config()).await {
        Ok(store) => store,
        Err(e) => {
            error!("Redis connection failed: {}", e);
            return Err(e.into());
        }
    };
    store.health_check().await?;
    info!("Redis reachable in {:?}", connection_start.elapsed());

    let registry = Registry::new(config.into(), std::sync::Arc::new(store))
        .with_key_scheme(settings.key_scheme()?);
    let consumers = registry.all_consumers().await?;
    for (service, ids) in &consumers {
        if registry.tiers_for(service).is_err() {
            warn!(service = %service, "Access logs exist for a service missing from the tier file");
        }
        info!(service = %service, consumers = ids.len(), "Live access logs");
    }

    Ok(())
}
