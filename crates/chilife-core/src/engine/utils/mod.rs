//! Numerical helpers shared by the ensemble engine: Boltzmann populations,
//! trimming and the bounded minimizer used to close bridges.

pub mod minimize;
pub mod sampling;
