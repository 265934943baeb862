use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of low bits a scene object id reserves for its own bookkeeping.
pub const SCENE_ID_LOW_BITS: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimId(pub u32);

impl SimId {
    pub const INVALID: SimId = SimId(0);
    pub const FIRST: SimId = SimId(1);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for SimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct SimIdAllocator {
    next: u32,
}

impl Default for SimIdAllocator {
    fn default() -> Self {
        Self::starting_at(SimId::FIRST)
    }
}

impl SimIdAllocator {
    pub fn starting_at(first: SimId) -> Self {
        Self {
            next: first.0.max(SimId::FIRST.0),
        }
    }

    pub fn allocate(&mut self) -> SimId {
        let id = SimId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    /// Moves the cursor past `id` so ids handed out by someone else are never reissued.
    pub fn reserve_through(&mut self, id: SimId) {
        self.next = self.next.max(id.0.saturating_add(1));
    }
}

/// Maps a rendering-layer object id to the sim id it was derived from.
pub type SceneIdMapper = fn(u32) -> SimId;

pub fn convert_scene_id_to_sim_id(scene_id: u32) -> SimId {
    SimId(scene_id >> SCENE_ID_LOW_BITS)
}

/// Inverse of [`convert_scene_id_to_sim_id`]; `low_bits` must fit in [`SCENE_ID_LOW_BITS`].
pub fn convert_sim_id_to_scene_id(id: SimId, low_bits: u32) -> u32 {
    debug_assert!(low_bits < (1 << SCENE_ID_LOW_BITS));
    (id.0 << SCENE_ID_LOW_BITS) | (low_bits & ((1 << SCENE_ID_LOW_BITS) - 1))
}
