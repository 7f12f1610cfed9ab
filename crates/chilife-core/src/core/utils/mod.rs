//! Stateless helpers shared by the models and the engine.
//!
//! - [`geometry`] - Placement operators, NERF atom placement and bond/angle/dihedral measurement
//! - [`identifiers`] - Static atom and residue name tables (backbone, solvent, elements)

pub mod geometry;
pub mod identifiers;
