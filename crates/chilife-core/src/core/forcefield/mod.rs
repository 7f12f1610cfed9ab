//! # Force Field Module
//!
//! Steric repulsion used to score conformers against themselves and against the host.
//!
//! ## Overview
//!
//! Only the repulsive branch of a 12-6 Lennard-Jones potential is evaluated. Pair parameters
//! combine per-atom `r_min / 2` values additively (scaled by a `forgive` factor) and well
//! depths geometrically. Each pair contribution is clipped to a configurable cap so that a
//! single bad contact cannot dominate a Boltzmann weight.
//!
//! ## Key Components
//!
//! - [`params`] - Per-atom-type parameters with built-in UFF defaults and TOML/CSV overrides
//! - [`potentials`] - The pair potential, combination rule and the gas constant
//! - [`scoring`] - Pair-list and environment scoring of one coordinate set
//!
//! ```ignore
//! use chilife::core::forcefield::{params::StericParams, scoring::Scorer};
//!
//! let params = StericParams::uff().with_forgive(0.95);
//! let lj = params.resolve(&atom_types)?;
//! let energy = Scorer::new(&params.globals).score_pairs(&coords, &lj, &pairs)?;
//! ```

pub mod params;
pub mod potentials;
pub mod scoring;
