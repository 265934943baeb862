use tracing::debug;

use super::frame::{EntityUpdate, ReplicationFrame, MAX_FRAME_ENTRIES};
use crate::state::EncodeError;
use crate::world::Simulation;

/// Builds the frame for everything that changed since the last flush.
///
/// Every entity with replicated dirty bits contributes one message, in
/// insertion order. Dirty bits are cleared and the removal list drained only
/// once every message encoded, so a failed flush loses nothing.
///
/// A frame carries at most [`MAX_FRAME_ENTRIES`] updates and as many
/// removals. Whatever does not fit stays dirty or queued for the next frame.
pub fn collect_frame(sim: &mut Simulation) -> Result<ReplicationFrame, EncodeError> {
    let mut frame = ReplicationFrame::new(sim.tick_count());
    let mut flushed = Vec::new();

    for id in sim.ids() {
        if frame.updates.len() == MAX_FRAME_ENTRIES {
            break;
        }
        let Some(entity) = sim.find(*id) else {
            continue;
        };
        let Ok(entity) = entity.try_borrow() else {
            continue;
        };
        let state = entity.state();
        if state.replicated_dirty_bits().is_empty() {
            continue;
        }
        let mut message = Vec::new();
        state.encode(&mut message)?;
        frame.updates.push(EntityUpdate { id: *id, message });
        flushed.push(*id);
    }

    frame.removed = sim.drain_removed_ids_up_to(MAX_FRAME_ENTRIES);
    for id in &flushed {
        if let Some(entity) = sim.find(*id) {
            if let Ok(mut entity) = entity.try_borrow_mut() {
                entity.state_mut().clear_dirty_bits();
            }
        }
    }

    debug!(
        tick = frame.tick,
        updates = frame.updates.len(),
        removed = frame.removed.len(),
        "replication_frame_collected"
    );
    Ok(frame)
}
