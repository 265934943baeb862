use std::env;
use std::path::Path;

use nero_sim::{load_json_config, ConfigError, CONFIG_ENV_VAR};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::config::HarnessConfig;
use super::metrics::MetricsHandle;

const TOTAL_TICKS_ENV_VAR: &str = "NERO_TOTAL_TICKS";

pub(crate) struct AppWiring {
    pub(crate) config: HarnessConfig,
    pub(crate) metrics: MetricsHandle,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== nero sim harness startup ===");

    let mut config = load_config_from_env()?;
    config.loop_config.total_ticks = resolve_total_ticks(config.loop_config.total_ticks);
    info!(
        collision = ?config.simulation.collision,
        first_sim_id = config.simulation.first_sim_id,
        movers = config.scenario.movers,
        "config_resolved"
    );

    Ok(AppWiring {
        config,
        metrics: MetricsHandle::default(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_config_from_env() -> Result<HarnessConfig, ConfigError> {
    match env::var(CONFIG_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => {
            info!(path = path.as_str(), "loading_config_file");
            load_json_config(Path::new(path.trim()))
        }
        Ok(_) | Err(env::VarError::NotPresent) => Ok(HarnessConfig::default()),
        Err(err) => {
            warn!(
                env_var = CONFIG_ENV_VAR,
                error = %err,
                "unable to read config env var; falling back to defaults"
            );
            Ok(HarnessConfig::default())
        }
    }
}

fn resolve_total_ticks(config_total_ticks: u64) -> u64 {
    match env::var(TOTAL_TICKS_ENV_VAR) {
        Ok(value) => parse_total_ticks(&value).unwrap_or_else(|| {
            warn!(
                env_var = TOTAL_TICKS_ENV_VAR,
                value = value.as_str(),
                "invalid total-ticks env var value; falling back to config"
            );
            config_total_ticks
        }),
        Err(env::VarError::NotPresent) => config_total_ticks,
        Err(err) => {
            warn!(
                env_var = TOTAL_TICKS_ENV_VAR,
                error = %err,
                "unable to read total-ticks env var; falling back to config"
            );
            config_total_ticks
        }
    }
}

fn parse_total_ticks(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_ticks_override_parses_trimmed_integers_only() {
        assert_eq!(parse_total_ticks(" 120 "), Some(120));
        assert_eq!(parse_total_ticks("0"), Some(0));
        assert_eq!(parse_total_ticks("-5"), None);
        assert_eq!(parse_total_ticks("lots"), None);
    }
}
