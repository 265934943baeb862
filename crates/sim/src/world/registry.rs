use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::context::TickContext;
use super::entity::{EntityRef, EntitySet};
use crate::config::SimulationConfig;
use crate::ids::{convert_scene_id_to_sim_id, SceneIdMapper, SimId};

/// One bucket per bit of a `u32` type mask.
pub const TYPE_BUCKETS: usize = u32::BITS as usize;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("entity carries the invalid sim id 0")]
    InvalidId,
    #[error("sim id {0} is already registered")]
    DuplicateId(SimId),
    #[error("entity is borrowed elsewhere and cannot be inspected")]
    EntityBusy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Index of the tick this report describes, starting at 0.
    pub tick: u64,
    pub ticked: usize,
    pub removed: usize,
    pub collisions_resolved: usize,
    pub collision_passes: u32,
}

struct Registered {
    entity: EntityRef,
    /// Type mask the entity is currently bucketed under.
    type_mask: u32,
}

/// Registry of every simulated entity, indexed by id and by type bit.
///
/// Structural changes requested while a tick is running never touch the
/// collection being iterated: additions show up in lookups at once but are
/// first ticked on the next frame, and removals are applied at the tick
/// boundary.
pub struct Simulation {
    config: SimulationConfig,
    scene_id_mapper: SceneIdMapper,
    entities_by_id: HashMap<SimId, Registered>,
    insertion_order: Vec<SimId>,
    entities_by_type: [BTreeSet<SimId>; TYPE_BUCKETS],
    pending_removal: BTreeSet<SimId>,
    added_this_frame: Vec<SimId>,
    removed_ids: Vec<SimId>,
    max_id: u32,
    tick_count: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_scene_id_mapper(config, convert_scene_id_to_sim_id)
    }

    pub fn with_scene_id_mapper(config: SimulationConfig, scene_id_mapper: SceneIdMapper) -> Self {
        Self {
            config,
            scene_id_mapper,
            entities_by_id: HashMap::new(),
            insertion_order: Vec::new(),
            entities_by_type: std::array::from_fn(|_| BTreeSet::new()),
            pending_removal: BTreeSet::new(),
            added_this_frame: Vec::new(),
            removed_ids: Vec::new(),
            max_id: 0,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn add_sim_entity(&mut self, entity: EntityRef) -> Result<(), RegistryError> {
        let (id, type_mask) = match entity.try_borrow() {
            Ok(entity) => (entity.sim_id(), entity.entity_type()),
            Err(_) => {
                error!("add_rejected_entity_busy");
                return Err(RegistryError::EntityBusy);
            }
        };
        if !id.is_valid() {
            error!("invalid_sim_id_rejected");
            return Err(RegistryError::InvalidId);
        }
        if self.entities_by_id.contains_key(&id) {
            error!(sim_id = id.0, "duplicate_sim_id_rejected");
            return Err(RegistryError::DuplicateId(id));
        }

        for bit in set_bits(type_mask) {
            self.entities_by_type[bit].insert(id);
        }
        self.entities_by_id
            .insert(id, Registered { entity, type_mask });
        self.insertion_order.push(id);
        self.added_this_frame.push(id);
        self.max_id = self.max_id.max(id.0);
        debug!(sim_id = id.0, type_mask, "entity_added");
        Ok(())
    }

    /// Schedules `id` for removal at the next tick boundary.
    ///
    /// Returns `true` when this call scheduled it. Unknown ids and ids that
    /// are already pending are accepted as no-ops.
    pub fn remove(&mut self, id: SimId) -> bool {
        if !self.entities_by_id.contains_key(&id) {
            debug!(sim_id = id.0, "remove_ignored_unknown_id");
            return false;
        }
        self.pending_removal.insert(id)
    }

    /// Applies every scheduled removal. Runs once per tick; also callable
    /// between ticks.
    pub fn remove_all_scheduled(&mut self) -> usize {
        if self.pending_removal.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending_removal);
        let mut removed = 0;
        for id in &pending {
            let Some(registered) = self.entities_by_id.remove(id) else {
                continue;
            };
            for bit in set_bits(registered.type_mask) {
                self.entities_by_type[bit].remove(id);
            }
            self.removed_ids.push(*id);
            removed += 1;
            debug!(sim_id = id.0, "entity_removed");
        }
        self.insertion_order.retain(|id| !pending.contains(id));
        self.added_this_frame.retain(|id| !pending.contains(id));
        removed
    }

    pub fn find(&self, id: SimId) -> Option<EntityRef> {
        self.entities_by_id
            .get(&id)
            .map(|registered| registered.entity.clone())
    }

    pub fn find_by_scene_object_id(&self, scene_id: u32) -> Option<EntityRef> {
        self.find((self.scene_id_mapper)(scene_id))
    }

    /// Every registered entity whose type shares at least one bit with `type_mask`.
    pub fn get_entities(&self, type_mask: u32) -> EntitySet {
        let mut entities = EntitySet::new();
        for bit in set_bits(type_mask) {
            for id in &self.entities_by_type[bit] {
                if entities.contains(*id) {
                    continue;
                }
                if let Some(registered) = self.entities_by_id.get(id) {
                    entities.insert(*id, registered.entity.clone());
                }
            }
        }
        entities
    }

    pub fn contains(&self, id: SimId) -> bool {
        self.entities_by_id.contains_key(&id)
    }

    pub fn is_pending_removal(&self, id: SimId) -> bool {
        self.pending_removal.contains(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities_by_id.is_empty()
    }

    /// Registered ids in insertion order.
    pub fn ids(&self) -> &[SimId] {
        &self.insertion_order
    }

    /// Ids added since the last tick boundary.
    pub fn added_this_frame(&self) -> &[SimId] {
        &self.added_this_frame
    }

    /// Ids erased since the previous call, in removal order.
    pub fn drain_removed_ids(&mut self) -> Vec<SimId> {
        std::mem::take(&mut self.removed_ids)
    }

    /// Like [`Simulation::drain_removed_ids`] but takes at most `limit` ids,
    /// oldest first. The rest wait for the next call.
    pub fn drain_removed_ids_up_to(&mut self, limit: usize) -> Vec<SimId> {
        if self.removed_ids.len() <= limit {
            return self.drain_removed_ids();
        }
        self.removed_ids.drain(..limit).collect()
    }

    pub fn next_free_id(&self) -> SimId {
        SimId(self.max_id.saturating_add(1).max(self.config.first_sim_id))
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Re-buckets `id` if its type changed since it was indexed. Ticks do
    /// this automatically; call it after changing a type between ticks.
    pub fn reindex(&mut self, id: SimId) -> bool {
        let Some(registered) = self.entities_by_id.get_mut(&id) else {
            return false;
        };
        let current = match registered.entity.try_borrow() {
            Ok(entity) => entity.entity_type(),
            Err(_) => return false,
        };
        let previous = registered.type_mask;
        if current == previous {
            return false;
        }
        registered.type_mask = current;
        for bit in set_bits(previous & !current) {
            self.entities_by_type[bit].remove(&id);
        }
        for bit in set_bits(current & !previous) {
            self.entities_by_type[bit].insert(id);
        }
        debug!(sim_id = id.0, previous, current, "entity_reindexed");
        true
    }

    pub fn process_tick(&mut self, dt: f32) -> TickReport {
        let snapshot = self.snapshot();
        let mut ticked = 0;
        for (id, entity) in &snapshot {
            if self.pending_removal.contains(id) {
                continue;
            }
            let Ok(mut entity) = entity.try_borrow_mut() else {
                warn!(sim_id = id.0, "tick_skipped_busy_entity");
                continue;
            };
            let mut ctx = TickContext::new(self, *id);
            entity.process_tick(dt, &mut ctx);
            ticked += 1;
        }

        let removed = self.remove_all_scheduled();

        let survivors = self.snapshot();
        for (id, entity) in &survivors {
            if let Ok(mut entity) = entity.try_borrow_mut() {
                entity.state_mut().set_bumped(false);
            }
            self.reindex(*id);
        }

        let collisions = self.do_collisions();

        for (_, entity) in self.live_entities() {
            if let Ok(mut entity) = entity.try_borrow_mut() {
                entity.state_mut().process_tick(dt);
            }
        }

        self.added_this_frame.clear();
        let report = TickReport {
            tick: self.tick_count,
            ticked,
            removed,
            collisions_resolved: collisions.resolved,
            collision_passes: collisions.passes,
        };
        self.tick_count += 1;
        debug!(
            tick = report.tick,
            ticked,
            removed,
            collisions = collisions.resolved,
            entities = self.entities_by_id.len(),
            "sim_tick"
        );
        report
    }

    /// `frac` is the position between the last two ticks, in `[0, 1]`.
    pub fn process_animation_tick(&mut self, frac: f32) {
        for (_, entity) in self.live_entities() {
            if let Ok(mut entity) = entity.try_borrow_mut() {
                entity.process_animation_tick(frac);
            }
        }
    }

    /// Drops every entity and resets the tick counter. Used at teardown.
    pub fn clear(&mut self) {
        let dropped = self.entities_by_id.len();
        self.entities_by_id.clear();
        self.insertion_order.clear();
        for bucket in &mut self.entities_by_type {
            bucket.clear();
        }
        self.pending_removal.clear();
        self.added_this_frame.clear();
        self.removed_ids.clear();
        self.max_id = 0;
        self.tick_count = 0;
        info!(dropped, "simulation_cleared");
    }

    /// Registered entities not scheduled for removal, in insertion order.
    pub(crate) fn live_entities(&self) -> Vec<(SimId, EntityRef)> {
        self.insertion_order
            .iter()
            .filter(|id| !self.pending_removal.contains(id))
            .filter_map(|id| {
                self.entities_by_id
                    .get(id)
                    .map(|registered| (*id, registered.entity.clone()))
            })
            .collect()
    }

    fn snapshot(&self) -> Vec<(SimId, EntityRef)> {
        self.insertion_order
            .iter()
            .filter_map(|id| {
                self.entities_by_id
                    .get(id)
                    .map(|registered| (*id, registered.entity.clone()))
            })
            .collect()
    }
}

/// Bit positions set in `mask`, lowest first.
fn set_bits(mut mask: u32) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let bit = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(bit)
    })
}
