use nero_sim::{
    entity_ref, Color, EntitySet, RegistryError, SimEntity, SimEntityData, SimId, SimIdAllocator,
    Simulation, TickContext, Vec3,
};
use tracing::{debug, info, warn};

use super::config::ScenarioConfig;

pub(crate) const WALL: u32 = 1 << 0;
pub(crate) const AGENT: u32 = 1 << 1;
pub(crate) const SPAWNER: u32 = 1 << 2;
pub(crate) const PROJECTILE: u32 = 1 << 3;

const LANE_SPACING: f32 = 2.0;
const SPAWNER_LANE_Z: f32 = -4.0;
const PROJECTILE_SPEED: f32 = 8.0;
const PROJECTILE_SCALE: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemoLayout {
    pub(crate) walls: Vec<SimId>,
    pub(crate) movers: Vec<SimId>,
    pub(crate) spawner: SimId,
}

/// Populates `sim` with one lane per mover, bounded by walls, plus a
/// projectile spawner in its own lane.
pub(crate) fn build_demo(
    sim: &mut Simulation,
    config: &ScenarioConfig,
) -> Result<DemoLayout, RegistryError> {
    let mut ids = SimIdAllocator::starting_at(sim.next_free_id());
    let half_width = config.arena_half_width.max(1.0);
    let mut walls = Vec::new();
    let mut movers = Vec::new();

    let mut lanes: Vec<f32> = (0..config.movers)
        .map(|lane| lane as f32 * LANE_SPACING)
        .collect();
    lanes.push(SPAWNER_LANE_Z);
    for z in lanes {
        for x in [-half_width, half_width] {
            let id = ids.allocate();
            sim.add_sim_entity(entity_ref(Wall::new(id, Vec3::new(x, 0.0, z))))?;
            walls.push(id);
        }
    }

    for lane in 0..config.movers {
        let id = ids.allocate();
        let direction = if lane % 2 == 0 { 1.0 } else { -1.0 };
        let velocity = Vec3::new(direction * (3.0 + lane as f32), 0.0, 0.0);
        let start = Vec3::new(0.0, 0.0, lane as f32 * LANE_SPACING);
        sim.add_sim_entity(entity_ref(Mover::new(id, start, velocity)))?;
        movers.push(id);
    }

    let spawner = ids.allocate();
    sim.add_sim_entity(entity_ref(Spawner::new(
        spawner,
        Vec3::new(0.0, 0.0, SPAWNER_LANE_Z),
        config.spawn_interval_ticks,
        config.projectile_lifetime_ticks,
    )))?;

    info!(
        walls = walls.len(),
        movers = movers.len(),
        entity_count = sim.entity_count(),
        "demo_built"
    );
    Ok(DemoLayout {
        walls,
        movers,
        spawner,
    })
}

fn overlaps_any(state: &SimEntityData, candidates: &EntitySet) -> bool {
    let here = state.position();
    candidates.iter().any(|(_, other)| match other.try_borrow() {
        Ok(other) => {
            let reach = (state.scale().x + other.state().scale().x) * 0.5;
            other.state().position().distance_squared(here) < reach * reach
        }
        Err(_) => false,
    })
}

struct Wall {
    state: SimEntityData,
}

impl Wall {
    fn new(id: SimId, position: Vec3) -> Self {
        let mut state =
            SimEntityData::new(position, Vec3::ZERO, Vec3::ONE, format!("wall-{id}"), WALL, 0, id);
        state.set_color(Color::rgba(0x80, 0x80, 0x80, 0xFF));
        Self { state }
    }
}

impl SimEntity for Wall {
    fn state(&self) -> &SimEntityData {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SimEntityData {
        &mut self.state
    }

    fn process_tick(&mut self, _dt: f32, _ctx: &mut TickContext<'_>) {}
}

/// Paces its lane, turning around whenever it bumps into something.
struct Mover {
    state: SimEntityData,
    render_position: Vec3,
}

impl Mover {
    fn new(id: SimId, position: Vec3, velocity: Vec3) -> Self {
        let mut state = SimEntityData::new(
            position,
            Vec3::ZERO,
            Vec3::ONE,
            format!("mover-{id}"),
            AGENT,
            WALL | AGENT,
            id,
        );
        state.set_velocity(velocity);
        state.set_color(Color::rgba(0x30, 0x90, 0xE0, 0xFF));
        Self {
            state,
            render_position: position,
        }
    }
}

impl SimEntity for Mover {
    fn state(&self) -> &SimEntityData {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SimEntityData {
        &mut self.state
    }

    fn process_tick(&mut self, dt: f32, _ctx: &mut TickContext<'_>) {
        let mut velocity = self.state.velocity();
        if self.state.bumped() {
            velocity = velocity.scale(-1.0);
            self.state.set_velocity(velocity);
        }
        let position = self.state.position().add(velocity.scale(dt));
        self.state.set_position(position);
    }

    fn process_animation_tick(&mut self, frac: f32) {
        self.render_position = self.state.interpolated_position(frac);
        debug!(
            sim_id = self.state.id().0,
            frac,
            x = self.render_position.x,
            z = self.render_position.z,
            "mover_rendered"
        );
    }

    fn is_colliding(&self, candidates: &EntitySet) -> bool {
        overlaps_any(&self.state, candidates)
    }
}

struct Spawner {
    state: SimEntityData,
    interval_ticks: u32,
    countdown: u32,
    lifetime_ticks: u32,
    launched: u32,
}

impl Spawner {
    fn new(id: SimId, position: Vec3, interval_ticks: u32, lifetime_ticks: u32) -> Self {
        Self {
            state: SimEntityData::new(
                position,
                Vec3::ZERO,
                Vec3::ONE,
                "spawner",
                SPAWNER,
                0,
                id,
            ),
            interval_ticks: interval_ticks.max(1),
            countdown: 0,
            lifetime_ticks,
            launched: 0,
        }
    }
}

impl SimEntity for Spawner {
    fn state(&self) -> &SimEntityData {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SimEntityData {
        &mut self.state
    }

    fn process_tick(&mut self, _dt: f32, ctx: &mut TickContext<'_>) {
        if self.countdown == 0 {
            let direction = if self.launched % 2 == 0 { 1.0 } else { -1.0 };
            let projectile = Projectile::new(
                ctx.next_free_id(),
                self.state.position(),
                Vec3::new(direction * PROJECTILE_SPEED, 0.0, 0.0),
                self.lifetime_ticks,
            );
            match ctx.add_sim_entity(entity_ref(projectile)) {
                Ok(()) => self.launched += 1,
                Err(err) => warn!(error = %err, "projectile_spawn_failed"),
            }
            self.countdown = self.interval_ticks;
        }
        self.countdown -= 1;
    }
}

/// Flies straight until its lifetime runs out or it hits a wall.
struct Projectile {
    state: SimEntityData,
    remaining_ticks: u32,
}

impl Projectile {
    fn new(id: SimId, position: Vec3, velocity: Vec3, lifetime_ticks: u32) -> Self {
        let mut state = SimEntityData::new(
            position,
            Vec3::ZERO,
            Vec3::new(PROJECTILE_SCALE, PROJECTILE_SCALE, PROJECTILE_SCALE),
            format!("projectile-{id}"),
            PROJECTILE,
            WALL,
            id,
        );
        state.set_velocity(velocity);
        state.set_color(Color::rgba(0xE0, 0x40, 0x30, 0xFF));
        Self {
            state,
            remaining_ticks: lifetime_ticks,
        }
    }
}

impl SimEntity for Projectile {
    fn state(&self) -> &SimEntityData {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SimEntityData {
        &mut self.state
    }

    fn process_tick(&mut self, dt: f32, ctx: &mut TickContext<'_>) {
        if self.state.bumped() || self.remaining_ticks == 0 {
            let id = ctx.current_id();
            ctx.remove(id);
            return;
        }
        self.remaining_ticks -= 1;
        let position = self
            .state
            .position()
            .add(self.state.velocity().scale(dt));
        self.state.set_position(position);
    }

    fn is_colliding(&self, candidates: &EntitySet) -> bool {
        overlaps_any(&self.state, candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use nero_sim::SimulationConfig;

    use super::*;

    fn velocity_x(sim: &Simulation, id: SimId) -> f32 {
        let entity = sim.find(id).expect("entity");
        let x = entity.borrow().state().velocity().x;
        x
    }

    #[test]
    fn layout_registers_every_lane() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let layout = build_demo(&mut sim, &ScenarioConfig::default()).expect("build");

        assert_eq!(layout.walls.len(), 14);
        assert_eq!(layout.movers.len(), 6);
        assert_eq!(sim.get_entities(WALL).len(), 14);
        assert_eq!(sim.get_entities(AGENT).len(), 6);
        assert_eq!(sim.get_entities(SPAWNER).len(), 1);
        assert_eq!(sim.get_entities(WALL | AGENT | SPAWNER).len(), 21);
        assert_eq!(sim.next_free_id(), SimId(22));
    }

    #[test]
    fn mover_turns_around_after_bumping_a_wall() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let config = ScenarioConfig {
            movers: 1,
            arena_half_width: 3.0,
            ..ScenarioConfig::default()
        };
        let layout = build_demo(&mut sim, &config).expect("build");
        let mover = layout.movers[0];
        assert!(velocity_x(&sim, mover) > 0.0);

        for _ in 0..10 {
            sim.process_tick(0.1);
        }
        assert!(velocity_x(&sim, mover) < 0.0);
    }

    #[test]
    fn projectiles_spawn_on_schedule_and_expire() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let config = ScenarioConfig {
            movers: 0,
            spawn_interval_ticks: 5,
            projectile_lifetime_ticks: 3,
            ..ScenarioConfig::default()
        };
        build_demo(&mut sim, &config).expect("build");

        sim.process_tick(0.1);
        assert_eq!(sim.get_entities(PROJECTILE).len(), 1);
        for _ in 0..4 {
            sim.process_tick(0.1);
        }
        assert!(sim.get_entities(PROJECTILE).is_empty());
        sim.process_tick(0.1);
        assert_eq!(sim.get_entities(PROJECTILE).len(), 1);
    }

    #[test]
    fn projectiles_are_removed_after_hitting_a_wall() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let config = ScenarioConfig {
            movers: 0,
            arena_half_width: 2.0,
            spawn_interval_ticks: 100,
            projectile_lifetime_ticks: 100,
        };
        build_demo(&mut sim, &config).expect("build");

        sim.process_tick(0.1);
        let projectile = sim.get_entities(PROJECTILE).ids().next().expect("spawned");
        for _ in 0..5 {
            sim.process_tick(0.1);
        }
        assert!(sim.find(projectile).is_none());
        assert!(sim.drain_removed_ids().contains(&projectile));
    }

    #[test]
    fn mover_renders_between_the_last_two_ticks() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let mover = Rc::new(RefCell::new(Mover::new(
            SimId(1),
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
        )));
        sim.add_sim_entity(mover.clone()).expect("add");

        sim.process_tick(0.5);
        assert_eq!(mover.borrow().state.position(), Vec3::new(1.0, 0.0, 0.0));
        mover
            .borrow_mut()
            .state
            .set_position(Vec3::new(3.0, 0.0, 0.0));

        sim.process_animation_tick(0.0);
        assert_eq!(mover.borrow().render_position, Vec3::new(1.0, 0.0, 0.0));
        sim.process_animation_tick(0.5);
        assert_eq!(mover.borrow().render_position, Vec3::new(2.0, 0.0, 0.0));
        sim.process_animation_tick(1.0);
        assert_eq!(mover.borrow().render_position, Vec3::new(3.0, 0.0, 0.0));
    }
}
