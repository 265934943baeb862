use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::context::TickContext;
use crate::ids::SimId;
use crate::state::SimEntityData;

/// Shared handle to a registered entity. The simulation is single-threaded.
pub type EntityRef = Rc<RefCell<dyn SimEntity>>;

pub fn entity_ref<E: SimEntity + 'static>(entity: E) -> EntityRef {
    Rc::new(RefCell::new(entity))
}

/// Something the [`super::Simulation`] can tick.
///
/// While `process_tick` runs, the entity is mutably borrowed; reaching it
/// again through the context (e.g. `ctx.find(ctx.current_id())` followed by
/// a borrow) panics. Use `self` instead.
pub trait SimEntity {
    fn state(&self) -> &SimEntityData;

    fn state_mut(&mut self) -> &mut SimEntityData;

    fn sim_id(&self) -> SimId {
        self.state().id()
    }

    fn entity_type(&self) -> u32 {
        self.state().entity_type()
    }

    fn collision_mask(&self) -> u32 {
        self.state().collision()
    }

    fn process_tick(&mut self, dt: f32, ctx: &mut TickContext<'_>);

    fn process_animation_tick(&mut self, _frac: f32) {}

    fn can_collide(&self) -> bool {
        self.collision_mask() != 0
    }

    /// `candidates` holds every live entity whose type matches this entity's
    /// collision mask, excluding the entity itself.
    fn is_colliding(&self, _candidates: &EntitySet) -> bool {
        false
    }

    /// Default response: move back to where the tick started and flag the bump.
    fn resolve_collision(&mut self) {
        let state = self.state_mut();
        let start = state.previous().position;
        state.set_position(start);
        state.set_bumped(true);
    }
}

/// Entities keyed by id, iterated in ascending id order.
#[derive(Clone, Default)]
pub struct EntitySet {
    members: BTreeMap<SimId, EntityRef>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SimId, entity: EntityRef) {
        self.members.insert(id, entity);
    }

    pub fn remove(&mut self, id: SimId) -> Option<EntityRef> {
        self.members.remove(&id)
    }

    pub fn contains(&self, id: SimId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: SimId) -> Option<&EntityRef> {
        self.members.get(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SimId> + '_ {
        self.members.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SimId, &EntityRef)> + '_ {
        self.members.iter().map(|(id, entity)| (*id, entity))
    }
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members.keys()).finish()
    }
}
