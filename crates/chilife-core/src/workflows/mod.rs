//! # Workflows Module
//!
//! Top-level entry points that run a complete labelling procedure: attach a library to a
//! host, evaluate or close the label, and trim its populations.
//!
//! - **Single-site labels** ([`label::place_label`]) - rotamer ensembles reweighted by their
//!   clashes with the host.
//! - **Two-anchor labels** ([`label::place_bridged_label`]) - bridged ensembles whose halves
//!   are joined by restrained dihedral minimization.

pub mod label;
