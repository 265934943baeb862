use std::fmt;

use sha2::{Digest, Sha256};

use crate::ids::SimId;
use crate::state::{DirtyBits, EncodeError, SimEntityData};
use crate::world::Simulation;

/// SHA-256 over the replicated state of a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Records must arrive in ascending id order.
pub fn state_digest<'a>(
    records: impl IntoIterator<Item = &'a SimEntityData>,
) -> Result<StateDigest, EncodeError> {
    let mut hasher = Sha256::new();
    let mut message = Vec::new();
    for record in records {
        message.clear();
        record.encode_with_bits(DirtyBits::ALL, &mut message)?;
        hasher.update(record.id().0.to_le_bytes());
        hasher.update((message.len() as u32).to_le_bytes());
        hasher.update(&message);
    }
    Ok(StateDigest(hasher.finalize().into()))
}

/// Digest of every registered entity, comparable with [`super::ReplicaStore::digest`].
pub fn simulation_digest(sim: &Simulation) -> Result<StateDigest, EncodeError> {
    let mut ids: Vec<SimId> = sim.ids().to_vec();
    ids.sort_unstable();
    let mut states = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(entity) = sim.find(id) {
            if let Ok(entity) = entity.try_borrow() {
                states.push(entity.state().clone());
            }
        }
    }
    state_digest(&states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn digest_ignores_dirty_bits_and_previous_state() {
        let mut first = SimEntityData::with_id(SimId(1));
        first.set_position(Vec3::new(1.0, 0.0, 0.0));
        let mut second = SimEntityData::with_id(SimId(1));
        second.set_position(Vec3::new(1.0, 0.0, 0.0));
        second.clear_dirty_bits();
        second.process_tick(0.1);

        assert_eq!(
            state_digest([&first]).expect("digest"),
            state_digest([&second]).expect("digest")
        );
    }

    #[test]
    fn digest_covers_ids_and_fields() {
        let base = SimEntityData::with_id(SimId(1));
        let mut moved = base.clone();
        moved.set_velocity(Vec3::new(0.0, 1.0, 0.0));
        let renumbered = SimEntityData::with_id(SimId(2));

        let reference = state_digest([&base]).expect("digest");
        assert_ne!(reference, state_digest([&moved]).expect("digest"));
        assert_ne!(reference, state_digest([&renumbered]).expect("digest"));
        assert_eq!(reference.to_string().len(), 64);
    }
}
