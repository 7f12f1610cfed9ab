//! # Core Module
//!
//! Stateless building blocks of the library: molecular models in internal and Cartesian
//! coordinates, the steric force field and rotamer libraries.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Internal-coordinate atoms and chains, the host
//!   structure interface and bond topology
//! - **Energy Calculations** ([`forcefield`]) - Steric parameters and the repulsive clash potential
//! - **Conformational Libraries** ([`rotamers`]) - Rotamer library records and collections
//! - **Utilities** ([`utils`]) - Geometry and static name tables
//!
//! Nothing in this layer keeps mutable state across calls beyond the coordinate cache of an
//! [`models::internal_chain::InternalChain`].

pub mod forcefield;
pub mod models;
pub mod rotamers;
pub mod utils;
