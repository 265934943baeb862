use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::SimId;
use crate::world::CollisionPolicy;

pub const CONFIG_ENV_VAR: &str = "NERO_SIM_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub collision: CollisionPolicy,
    /// Lowest id `next_free_id` will ever suggest.
    pub first_sim_id: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::default(),
            first_sim_id: SimId::FIRST.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {origin}: {message}")]
    Parse { origin: String, message: String },
}

pub fn load_json_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json_config(&raw, &path.display().to_string())
}

/// Parses `raw`, reporting the JSON path of the first offending field.
pub fn parse_json_config<T: DeserializeOwned>(raw: &str, origin: &str) -> Result<T, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            let message = if path.is_empty() || path == "." {
                source.to_string()
            } else {
                format!("at {path}: {source}")
            };
            Err(ConfigError::Parse {
                origin: origin.to_string(),
                message,
            })
        }
    }
}
