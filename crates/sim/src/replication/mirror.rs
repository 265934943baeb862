use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::digest::{state_digest, StateDigest};
use super::frame::ReplicationFrame;
use crate::ids::SimId;
use crate::state::{DecodeError, EncodeError, SimEntityData};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// Updates that failed to decode. Their records were left untouched.
    pub rejected: Vec<(SimId, DecodeError)>,
}

/// Receiving side of replication: one [`SimEntityData`] per known sim id.
#[derive(Debug, Default)]
pub struct ReplicaStore {
    records: BTreeMap<SimId, SimEntityData>,
    last_tick: Option<u64>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SimId) -> Option<&SimEntityData> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: SimId) -> Option<&mut SimEntityData> {
        self.records.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &SimEntityData> + '_ {
        self.records.values()
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Decodes a frame envelope and applies it. A malformed envelope changes nothing.
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> Result<ApplyReport, DecodeError> {
        let frame = ReplicationFrame::decode(bytes)?;
        Ok(self.apply_frame(&frame))
    }

    pub fn apply_frame(&mut self, frame: &ReplicationFrame) -> ApplyReport {
        let mut report = ApplyReport::default();

        for id in &frame.removed {
            if self.records.remove(id).is_some() {
                report.removed += 1;
            }
        }

        for update in &frame.updates {
            let outcome = match self.records.get_mut(&update.id) {
                Some(record) => record.decode(&update.message).map(|_| false),
                None => {
                    let mut record = SimEntityData::with_id(update.id);
                    record.clear_dirty_bits();
                    match record.decode(&update.message) {
                        Ok(_) => {
                            self.records.insert(update.id, record);
                            Ok(true)
                        }
                        Err(error) => Err(error),
                    }
                }
            };
            match outcome {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(error) => {
                    warn!(sim_id = update.id.0, error = %error, "replica_update_rejected");
                    report.rejected.push((update.id, error));
                }
            }
        }

        self.last_tick = Some(frame.tick);
        debug!(
            tick = frame.tick,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            rejected = report.rejected.len(),
            "replica_frame_applied"
        );
        report
    }

    pub fn digest(&self) -> Result<StateDigest, EncodeError> {
        state_digest(self.records.values())
    }
}
