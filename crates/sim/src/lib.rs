//! Entity state replication and the simulation tick registry.
//!
//! [`SimEntityData`] is the change-tracked state of one entity and its wire
//! message. [`Simulation`] owns every live entity, ticks them over a frozen
//! snapshot, and defers removals to the tick boundary.

pub mod config;
pub mod ids;
pub mod math;
pub mod replication;
pub mod state;
pub mod world;

pub use config::{
    load_json_config, parse_json_config, ConfigError, SimulationConfig, CONFIG_ENV_VAR,
};
pub use ids::{
    convert_scene_id_to_sim_id, convert_sim_id_to_scene_id, SceneIdMapper, SimId,
    SimIdAllocator, SCENE_ID_LOW_BITS,
};
pub use math::{Color, Vec3};
pub use replication::{
    collect_frame, simulation_digest, state_digest, ApplyReport, EntityUpdate, ReplicaStore,
    ReplicationFrame, StateDigest,
};
pub use state::{DecodeError, DirtyBits, EncodeError, SimEntityData, SimEntityInternals};
pub use world::{
    entity_ref, CollisionOutcome, CollisionPolicy, EntityRef, EntitySet, RegistryError,
    SimEntity, Simulation, TickContext, TickReport, TYPE_BUCKETS,
};
