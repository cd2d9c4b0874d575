//! Compile-time tunables, expressed as a loadable configuration struct
//! rather than preprocessor `#define`s: a `serde`-derived struct with a
//! `load` that reads TOML and a sensible `Default`.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Broadcast port for the Public-Variable Neighborhood.
pub const MLST_PVN_PORT: u16 = 154;
/// Messaging port for RSU data packets.
pub const MESSAGING_PORT: u16 = 181;
/// Port for RSU acknowledgements.
pub const ACKNOWLEDGEMENT_PORT: u16 = 182;

/// Every tunable a node's protocol stack needs, with their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MeshConfig {
    /// PVN neighbor eviction age, in seconds.
    pub max_age_of_mlst_nbr_seconds: u8,
    /// Base MLST round period, in seconds.
    pub mlst_period_length_seconds: f32,
    /// Post-change awake rounds.
    pub if_change_stay_active_for_n_periods: u8,
    /// Force-wake if the parent's PVN entry is older than this, in seconds.
    pub max_age_of_parent_seconds: u8,
    /// ACK timeout, in seconds.
    pub timeout_in_sec: f32,
    /// Retry budget; more than this many tries discards the message.
    pub max_tries: u8,
    /// Base inter-send spacing, in seconds.
    pub next_msg_delay: f32,
    /// Base retry backoff, in seconds.
    pub delay_on_fail_in_sec: f32,
    /// Per-node dedup window size.
    pub max_history_size: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            max_age_of_mlst_nbr_seconds: 15,
            mlst_period_length_seconds: 1.0,
            if_change_stay_active_for_n_periods: 3,
            max_age_of_parent_seconds: 5,
            timeout_in_sec: 0.2,
            max_tries: 5,
            next_msg_delay: 0.01,
            delay_on_fail_in_sec: 0.1,
            max_history_size: 30,
        }
    }
}

impl MeshConfig {
    /// Load configuration overrides from a TOML file, falling back to
    /// `Default` for any field the file omits.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path)
            .map_err(|source| ConfigError::Read { source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { source })
    }
}
