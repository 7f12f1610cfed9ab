//! # Engine Module
//!
//! Stateful ensembles built on the geometry and scoring primitives of [`crate::core`].
//!
//! ## Overview
//!
//! An ensemble owns one internal-coordinate conformer per rotamer, their Cartesian
//! coordinates and their population weights. The engine evaluates steric clashes against a
//! host environment, reweights populations by their Boltzmann factors, trims negligible
//! conformers and closes the bridge of two-anchor labels.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - builders, defaults and the TOML file form
//! - **Ensembles** ([`ensemble`], [`bridging`]) - single-site and two-anchor label ensembles
//! - **Environment** ([`environment`]) - snapshot of the host atoms around a label
//! - **Progress Monitoring** ([`progress`]) - progress events and minimizer observers
//! - **Error Handling** ([`error`]) - engine-level error type wrapping every lower layer
//!
//! Per-conformer work runs in parallel when the `parallel` feature is enabled.

pub mod bridging;
pub mod config;
pub mod ensemble;
pub mod environment;
pub mod error;
pub mod progress;
pub(crate) mod tasks;
pub mod utils;
