use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use nero_sim::{
    collect_frame, simulation_digest, DecodeError, EncodeError, RegistryError, ReplicaStore,
    Simulation, StateDigest, TickReport,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::config::LoopConfig;
use super::metrics::{MetricsAccumulator, MetricsHandle};
use super::scenario::build_demo;

#[derive(Debug, Error)]
pub(crate) enum LoopError {
    #[error("failed to build demo world: {0}")]
    Setup(#[from] RegistryError),
    #[error("failed to encode replication frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to decode replication frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("replica rejected {count} updates at tick {tick}")]
    ReplicaRejected { tick: u64, count: usize },
    #[error("replica diverged at tick {tick}: server {server}, client {client}")]
    ReplicaDiverged {
        tick: u64,
        server: StateDigest,
        client: StateDigest,
    },
}

/// What one frame of the fixed-step loop should do with its accumulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    /// Partial tick carried into the next frame.
    remaining_accumulator: Duration,
    /// Time discarded because the per-frame tick cap was hit.
    dropped_backlog: Duration,
}

fn plan_sim_steps(accumulator: Duration, fixed_dt: Duration, max_ticks_per_frame: u32) -> StepPlan {
    let due = accumulator
        .as_nanos()
        .checked_div(fixed_dt.as_nanos())
        .unwrap_or(0);
    let ticks_to_run = due.min(u128::from(max_ticks_per_frame)) as u32;
    let leftover = accumulator.saturating_sub(fixed_dt.saturating_mul(ticks_to_run));

    if due > u128::from(ticks_to_run) {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: leftover,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: leftover,
            dropped_backlog: Duration::ZERO,
        }
    }
}

/// Server simulation plus the client mirror it replicates into.
pub(crate) struct ReplicatedWorld {
    sim: Simulation,
    replica: Option<ReplicaStore>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StepOutcome {
    report: TickReport,
    replicated_bytes: usize,
}

impl ReplicatedWorld {
    pub(crate) fn new(sim: Simulation, replicate: bool) -> Self {
        Self {
            sim,
            replica: replicate.then(ReplicaStore::new),
        }
    }

    pub(crate) fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// Runs one tick and, when replicating, ships its frame over the wire
    /// format and checks that the mirror hashes the same as the server.
    pub(crate) fn step(&mut self, dt: f32) -> Result<StepOutcome, LoopError> {
        let report = self.sim.process_tick(dt);
        let Some(replica) = self.replica.as_mut() else {
            return Ok(StepOutcome {
                report,
                replicated_bytes: 0,
            });
        };

        let frame = collect_frame(&mut self.sim)?;
        let bytes = frame.encode()?;
        let applied = replica.apply_bytes(&bytes)?;
        if !applied.rejected.is_empty() {
            return Err(LoopError::ReplicaRejected {
                tick: report.tick,
                count: applied.rejected.len(),
            });
        }

        let server = simulation_digest(&self.sim)?;
        let client = replica.digest()?;
        if server != client {
            return Err(LoopError::ReplicaDiverged {
                tick: report.tick,
                server,
                client,
            });
        }
        debug!(tick = report.tick, bytes = bytes.len(), digest = %server, "replica_verified");

        Ok(StepOutcome {
            report,
            replicated_bytes: bytes.len(),
        })
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_headless(&app) {
        error!(error = %err, "run_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_headless(app: &AppWiring) -> Result<(), LoopError> {
    let config = &app.config.loop_config;
    let mut sim = Simulation::new(app.config.simulation);
    build_demo(&mut sim, &app.config.scenario)?;
    let mut world = ReplicatedWorld::new(sim, config.replicate);
    run_loop(&mut world, config, &app.metrics)
}

fn run_loop(
    world: &mut ReplicatedWorld,
    config: &LoopConfig,
    metrics_handle: &MetricsHandle,
) -> Result<(), LoopError> {
    let fixed_dt = config.fixed_dt();
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let max_frame_delta = config.max_frame_delta();
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    info!(
        target_tps = config.target_tps.max(1),
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = config.metrics_log_interval().as_millis() as u64,
        total_ticks = config.total_ticks,
        replicate = config.replicate,
        "loop_config"
    );

    let mut metrics = MetricsAccumulator::new(config.metrics_log_interval(), Instant::now());
    let mut accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();
    let mut ticks_run = 0u64;

    while config.total_ticks == 0 || ticks_run < config.total_ticks {
        let frame_start = Instant::now();
        let frame_dt = frame_start
            .saturating_duration_since(last_frame)
            .min(max_frame_delta);
        last_frame = frame_start;
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                ticks_run = plan.ticks_to_run,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            if config.total_ticks != 0 && ticks_run >= config.total_ticks {
                break;
            }
            let outcome = world.step(fixed_dt_seconds)?;
            ticks_run += 1;
            metrics.record_tick(world.sim().entity_count());
            metrics.record_replicated_bytes(outcome.replicated_bytes);
            if outcome.report.removed > 0 || outcome.report.collisions_resolved > 0 {
                debug!(
                    tick = outcome.report.tick,
                    removed = outcome.report.removed,
                    collisions = outcome.report.collisions_resolved,
                    passes = outcome.report.collision_passes,
                    "tick_events"
                );
            }
        }

        let frac = (accumulator.as_secs_f32() / fixed_dt_seconds).clamp(0.0, 1.0);
        world.sim.process_animation_tick(frac);

        if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                replicated_bytes_per_sec = snapshot.replicated_bytes_per_sec,
                entity_count = snapshot.entity_count,
                "loop_metrics"
            );
        }

        let elapsed = frame_start.elapsed();
        if elapsed < fixed_dt {
            thread::sleep(fixed_dt - elapsed);
        }
    }

    info!(
        ticks_run,
        entity_count = world.sim().entity_count(),
        last_tps = metrics_handle.snapshot().tps,
        "shutdown"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use nero_sim::{CollisionPolicy, SimulationConfig};

    use super::*;
    use crate::app::config::{HarnessConfig, ScenarioConfig};

    fn demo_world(simulation: SimulationConfig, replicate: bool) -> ReplicatedWorld {
        let mut sim = Simulation::new(simulation);
        let scenario = ScenarioConfig {
            arena_half_width: 4.0,
            spawn_interval_ticks: 3,
            projectile_lifetime_ticks: 20,
            ..ScenarioConfig::default()
        };
        build_demo(&mut sim, &scenario).expect("build");
        ReplicatedWorld::new(sim, replicate)
    }

    #[test]
    fn whole_ticks_at_the_default_rate_are_all_run() {
        let config = LoopConfig::default();
        let fixed_dt = config.fixed_dt();
        let plan = plan_sim_steps(fixed_dt * 3, fixed_dt, config.max_ticks_per_frame);

        assert_eq!(
            plan,
            StepPlan {
                ticks_to_run: 3,
                remaining_accumulator: Duration::ZERO,
                dropped_backlog: Duration::ZERO,
            }
        );
    }

    #[test]
    fn a_partial_tick_waits_for_the_next_frame() {
        let config = LoopConfig::default();
        let fixed_dt = config.fixed_dt();
        let half = fixed_dt / 2;

        let plan = plan_sim_steps(half, fixed_dt, config.max_ticks_per_frame);
        assert_eq!(plan.ticks_to_run, 0);
        assert_eq!(plan.remaining_accumulator, half);

        let plan = plan_sim_steps(fixed_dt * 2 + half, fixed_dt, config.max_ticks_per_frame);
        assert_eq!(plan.ticks_to_run, 2);
        assert_eq!(plan.remaining_accumulator, half);
        assert_eq!(plan.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn a_clamped_stall_runs_the_tick_cap_and_drops_the_rest() {
        let config = LoopConfig::default();
        let fixed_dt = config.fixed_dt();
        let stall = config.max_frame_delta();
        let plan = plan_sim_steps(stall, fixed_dt, config.max_ticks_per_frame);

        assert_eq!(plan.ticks_to_run, config.max_ticks_per_frame);
        assert_eq!(plan.remaining_accumulator, Duration::ZERO);
        assert_eq!(
            plan.dropped_backlog,
            stall - fixed_dt * config.max_ticks_per_frame
        );
    }

    #[test]
    fn replica_tracks_the_server_through_spawns_and_removals() {
        let mut world = demo_world(SimulationConfig::default(), true);
        let mut total_removed = 0;
        let mut total_bytes = 0;
        for _ in 0..240 {
            let outcome = world.step(1.0 / 60.0).expect("step");
            total_removed += outcome.report.removed;
            total_bytes += outcome.replicated_bytes;
        }

        assert!(total_removed > 0);
        assert!(total_bytes > 0);
        let replica = world.replica.as_ref().expect("replica");
        assert_eq!(replica.len(), world.sim().entity_count());
        assert_eq!(replica.last_tick(), Some(world.sim().tick_count()));
    }

    #[test]
    fn replica_stays_in_sync_under_fixed_point_collisions() {
        let config = SimulationConfig {
            collision: CollisionPolicy::FixedPoint { max_passes: 4 },
            ..SimulationConfig::default()
        };
        let mut world = demo_world(config, true);
        for _ in 0..120 {
            world.step(1.0 / 60.0).expect("step");
        }
    }

    #[test]
    fn unreplicated_steps_send_nothing() {
        let mut world = demo_world(SimulationConfig::default(), false);
        let outcome = world.step(1.0 / 60.0).expect("step");
        assert_eq!(outcome.replicated_bytes, 0);
        assert!(world.replica.is_none());
    }

    #[test]
    fn short_run_completes() {
        let mut config = HarnessConfig::default();
        config.loop_config.target_tps = 1000;
        config.loop_config.total_ticks = 20;
        let app = AppWiring {
            config,
            metrics: MetricsHandle::default(),
        };
        run_headless(&app).expect("run");
    }
}
