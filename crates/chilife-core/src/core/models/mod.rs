//! # Core Models Module
//!
//! Data structures describing molecular fragments and the host they are attached to.
//!
//! ## Key Components
//!
//! - [`internal_atom`] - Atom identity and its bond/angle/dihedral definition
//! - [`internal_chain`] - Internal-coordinate fragments with Cartesian conversion, dihedral
//!   mutation, clash queries and site placement
//! - [`structure`] - The rigid host structure interface and a k-d tree backed implementation
//! - [`topology`] - Bond graphs, graph-distance exclusion of non-bonded pairs and bond guessing
//!
//! ## Usage
//!
//! ```ignore
//! use chilife::core::models::internal_chain::InternalChain;
//!
//! let mut chain = InternalChain::from_cartesian(&atoms, &coords, &bonds, &[], 3)?;
//! chain.set_dihedral(&[-60f64.to_radians()], 1, &[["N", "CA", "CB", "CG"]], None)?;
//! let coords = chain.coords();
//! ```

pub mod internal_atom;
pub mod internal_chain;
pub mod structure;
pub mod topology;
