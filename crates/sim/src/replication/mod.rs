//! Moving entity state from a [`crate::world::Simulation`] to remote mirrors.

mod digest;
mod frame;
mod mirror;
mod server;

pub use digest::{simulation_digest, state_digest, StateDigest};
pub use frame::{
    EntityUpdate, ReplicationFrame, FRAME_MAGIC, FRAME_VERSION, MAX_FRAME_ENTRIES,
    MAX_MESSAGE_LEN,
};
pub use mirror::{ApplyReport, ReplicaStore};
pub use server::collect_frame;
