//! Versioned batch of per-entity update messages for one tick.
//!
//! Layout (little-endian):
//! - `[u8; 4]` magic `NRSF`
//! - `u8` version
//! - `u64` tick
//! - `u32` removed count, then one `u32` sim id per removal
//! - `u32` update count, then per update: `u32` sim id, `u32` message
//!   length, and the entity state message itself
//!
//! Removals are listed before updates and are applied first, so an id that
//! was erased and re-added within one frame ends up present.

use crate::ids::SimId;
use crate::state::{
    read_exact, read_u32, read_u64, read_u8, write_count, write_u32, write_u64, write_u8,
    DecodeError, EncodeError,
};

pub const FRAME_MAGIC: [u8; 4] = *b"NRSF";
pub const FRAME_VERSION: u8 = 1;
pub const MAX_FRAME_ENTRIES: usize = 65_536;
/// Largest possible entity state message (five vectors, a full label and
/// the fixed-size fields) rounded up.
pub const MAX_MESSAGE_LEN: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpdate {
    pub id: SimId,
    /// One encoded entity state message.
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationFrame {
    pub tick: u64,
    pub removed: Vec<SimId>,
    pub updates: Vec<EntityUpdate>,
}

impl ReplicationFrame {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.updates.is_empty()
    }

    /// Fails on anything [`ReplicationFrame::decode`] would refuse.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let payload: usize = self
            .updates
            .iter()
            .map(|update| 8 + update.message.len())
            .sum();
        let mut out = Vec::with_capacity(21 + self.removed.len() * 4 + payload);
        out.extend_from_slice(&FRAME_MAGIC);
        write_u8(&mut out, FRAME_VERSION);
        write_u64(&mut out, self.tick);

        write_count(&mut out, self.removed.len(), MAX_FRAME_ENTRIES, "removals")?;
        for id in &self.removed {
            write_u32(&mut out, id.0);
        }

        write_count(&mut out, self.updates.len(), MAX_FRAME_ENTRIES, "updates")?;
        for update in &self.updates {
            write_u32(&mut out, update.id.0);
            write_count(&mut out, update.message.len(), MAX_MESSAGE_LEN, "message bytes")?;
            out.extend_from_slice(&update.message);
        }
        Ok(out)
    }

    /// Parses a frame envelope. Entity messages are not interpreted here.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0usize;
        let magic = read_exact(bytes, &mut cursor, FRAME_MAGIC.len(), "magic")?;
        if magic != FRAME_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = read_u8(bytes, &mut cursor, "version")?;
        if version != FRAME_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found: version,
                expected: FRAME_VERSION,
            });
        }
        let tick = read_u64(bytes, &mut cursor, "tick")?;

        let removed_count = read_entry_count(bytes, &mut cursor, "removals")?;
        let mut removed = Vec::with_capacity(removed_count);
        for _ in 0..removed_count {
            removed.push(SimId(read_u32(bytes, &mut cursor, "removed_id")?));
        }

        let update_count = read_entry_count(bytes, &mut cursor, "updates")?;
        let mut updates = Vec::with_capacity(update_count);
        for _ in 0..update_count {
            let id = SimId(read_u32(bytes, &mut cursor, "update_id")?);
            let len = read_u32(bytes, &mut cursor, "message_len")? as usize;
            if len > MAX_MESSAGE_LEN {
                return Err(DecodeError::MessageTooLarge {
                    len,
                    limit: MAX_MESSAGE_LEN,
                });
            }
            let message = read_exact(bytes, &mut cursor, len, "message")?.to_vec();
            updates.push(EntityUpdate { id, message });
        }

        if cursor != bytes.len() {
            return Err(DecodeError::TrailingBytes {
                count: bytes.len() - cursor,
            });
        }
        Ok(Self {
            tick,
            removed,
            updates,
        })
    }
}

fn read_entry_count(
    bytes: &[u8],
    cursor: &mut usize,
    what: &'static str,
) -> Result<usize, DecodeError> {
    let declared = read_u32(bytes, cursor, what)? as usize;
    if declared > MAX_FRAME_ENTRIES {
        return Err(DecodeError::TooManyEntries {
            what,
            declared,
            limit: MAX_FRAME_ENTRIES,
        });
    }
    Ok(declared)
}
