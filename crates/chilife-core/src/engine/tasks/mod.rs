//! Per-conformer computational tasks run by the ensembles.
//!
//! Each task works on independent conformers and runs in parallel when the `parallel`
//! feature is enabled.

pub mod bridge_minimization;
pub mod clash_evaluation;
