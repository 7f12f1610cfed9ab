use thiserror::Error;

use super::config::ConfigError;
use super::utils::sampling::SamplingError;
use crate::core::forcefield::params::ParamLoadError;
use crate::core::forcefield::scoring::ScoringError;
use crate::core::models::internal_chain::InternalCoordError;
use crate::core::models::topology::TopologyError;
use crate::core::rotamers::library::LibraryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal coordinate error: {source}")]
    Geometry {
        #[from]
        source: InternalCoordError,
    },

    #[error("Topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("Energy scoring failed: {source}")]
    Scoring {
        #[from]
        source: ScoringError,
    },

    #[error("Steric parameter error: {source}")]
    Parameters {
        #[from]
        source: ParamLoadError,
    },

    #[error("Rotamer library error: {source}")]
    Library {
        #[from]
        source: LibraryError,
    },

    #[error("Population reweighting failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("Residue {residue} not found on chain '{chain}'")]
    ResidueNotFound { chain: String, residue: isize },

    #[error("Atom '{name}' not found in residue {residue} of chain '{chain}'")]
    AtomNotFound {
        chain: String,
        residue: isize,
        name: String,
    },

    #[error(
        "Bridge could not be closed: best closure error {min_error:.3} A exceeds the {threshold:.3} A limit"
    )]
    BridgeClosure { min_error: f64, threshold: f64 },

    #[error("Ensemble has no conformers")]
    EmptyEnsemble,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
