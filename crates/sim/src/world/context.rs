use super::entity::{EntityRef, EntitySet};
use super::registry::{RegistryError, Simulation};
use crate::ids::SimId;

/// What an entity may do to the registry from inside its own tick.
///
/// Additions are visible to `find` immediately but are first ticked on the
/// next frame. Removals stay deferred until the tick boundary.
pub struct TickContext<'a> {
    sim: &'a mut Simulation,
    current: SimId,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, current: SimId) -> Self {
        Self { sim, current }
    }

    /// Id of the entity being ticked.
    pub fn current_id(&self) -> SimId {
        self.current
    }

    pub fn add_sim_entity(&mut self, entity: EntityRef) -> Result<(), RegistryError> {
        self.sim.add_sim_entity(entity)
    }

    pub fn remove(&mut self, id: SimId) -> bool {
        self.sim.remove(id)
    }

    pub fn find(&self, id: SimId) -> Option<EntityRef> {
        self.sim.find(id)
    }

    /// Same as [`Simulation::get_entities`] minus the entity being ticked,
    /// which is already borrowed.
    pub fn get_entities(&self, type_mask: u32) -> EntitySet {
        let mut entities = self.sim.get_entities(type_mask);
        entities.remove(self.current);
        entities
    }

    pub fn next_free_id(&self) -> SimId {
        self.sim.next_free_id()
    }

    pub fn tick_count(&self) -> u64 {
        self.sim.tick_count()
    }
}
