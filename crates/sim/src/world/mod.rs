mod collision;
mod context;
mod entity;
mod registry;

pub use collision::{CollisionOutcome, CollisionPolicy};
pub use context::TickContext;
pub use entity::{entity_ref, EntityRef, EntitySet, SimEntity};
pub use registry::{RegistryError, Simulation, TickReport, TYPE_BUCKETS};
