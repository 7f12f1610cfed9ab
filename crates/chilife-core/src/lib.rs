//! # chiLife Core Library
//!
//! Internal-coordinate modelling of spin labels and other side-chain ensembles attached to
//! a rigid host structure.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`InternalChain`, `Topology`,
//!   `Structure`), rotamer libraries, geometry helpers and the repulsive steric potential.
//!
//! - **[`engine`]: The Logic Core.** Stateful ensembles: placement onto host residues, clash
//!   evaluation, Boltzmann reweighting, population trimming and bounded dihedral
//!   minimization for two-anchor labels.
//!
//! - **[`workflows`]: The Public API.** Complete labelling procedures tying `engine` and
//!   `core` together.

pub mod core;
pub mod engine;
pub mod workflows;
