//! Error types.
//!
//! Per §7, the protocol itself has only two externally visible failure
//! surfaces (the RSU failure callback, and `is_undefined`); everything else
//! is absorbed and reported through `log`. The one genuine `Result`-shaped
//! failure in this crate is configuration loading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Read {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}
