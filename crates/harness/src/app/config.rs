use std::time::Duration;

use nero_sim::SimulationConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct HarnessConfig {
    pub(crate) simulation: SimulationConfig,
    #[serde(rename = "loop")]
    pub(crate) loop_config: LoopConfig,
    pub(crate) scenario: ScenarioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta_ms: u64,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) metrics_log_interval_ms: u64,
    /// Ticks to run before shutting down. 0 runs until the process is killed.
    pub(crate) total_ticks: u64,
    /// Mirror every tick into a client replica and verify its digest.
    pub(crate) replicate: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta_ms: 250,
            max_ticks_per_frame: 5,
            metrics_log_interval_ms: 1000,
            total_ticks: 600,
            replicate: true,
        }
    }
}

impl LoopConfig {
    pub(crate) fn fixed_dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_tps.max(1) as f64)
    }

    pub(crate) fn max_frame_delta(&self) -> Duration {
        normalize_non_zero_duration(
            Duration::from_millis(self.max_frame_delta_ms),
            Duration::from_millis(250),
        )
    }

    pub(crate) fn metrics_log_interval(&self) -> Duration {
        normalize_non_zero_duration(
            Duration::from_millis(self.metrics_log_interval_ms),
            Duration::from_secs(1),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ScenarioConfig {
    pub(crate) movers: u32,
    pub(crate) arena_half_width: f32,
    /// Ticks between two projectile launches.
    pub(crate) spawn_interval_ticks: u32,
    pub(crate) projectile_lifetime_ticks: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            movers: 6,
            arena_half_width: 10.0,
            spawn_interval_ticks: 20,
            projectile_lifetime_ticks: 90,
        }
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use nero_sim::{parse_json_config, CollisionPolicy};
    use serde_json::json;

    use super::*;

    #[test]
    fn sections_parse_independently() {
        let raw = json!({
            "simulation": { "collision": { "mode": "fixed_point", "max_passes": 3 } },
            "loop": { "target_tps": 30, "replicate": false }
        })
        .to_string();
        let config: HarnessConfig = parse_json_config(&raw, "inline").expect("parse");

        assert_eq!(
            config.simulation.collision,
            CollisionPolicy::FixedPoint { max_passes: 3 }
        );
        assert_eq!(config.loop_config.target_tps, 30);
        assert!(!config.loop_config.replicate);
        assert_eq!(config.loop_config.max_ticks_per_frame, 5);
        assert_eq!(config.scenario, ScenarioConfig::default());
    }

    #[test]
    fn zero_durations_fall_back_and_tps_is_clamped() {
        let config = LoopConfig {
            target_tps: 0,
            max_frame_delta_ms: 0,
            metrics_log_interval_ms: 0,
            ..LoopConfig::default()
        };
        assert_eq!(config.fixed_dt(), Duration::from_secs(1));
        assert_eq!(config.max_frame_delta(), Duration::from_millis(250));
        assert_eq!(config.metrics_log_interval(), Duration::from_secs(1));
    }

    #[test]
    fn nested_parse_errors_carry_the_full_path() {
        let raw = json!({ "loop": { "total_ticks": -1 } }).to_string();
        let error = parse_json_config::<HarnessConfig>(&raw, "inline").expect_err("negative");
        assert!(error.to_string().contains("loop.total_ticks"), "{error}");
    }
}
