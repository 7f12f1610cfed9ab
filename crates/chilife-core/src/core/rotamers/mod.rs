//! # Rotamers Module
//!
//! Rotamer libraries: discrete conformations of a side chain or label, each stored as an
//! internal-coordinate fragment, together with their prior populations.
//!
//! ## Key Components
//!
//! - [`library`] - TOML library records, single-anchor [`library::RotamerLibrary`] and
//!   two-anchor [`library::BridgedLibrary`] collections, and library combination
//!
//! ## Usage
//!
//! ```ignore
//! use chilife::core::rotamers::library::RotamerLibrary;
//!
//! let library = RotamerLibrary::load(Path::new("R1M.toml"), 3)?;
//! println!("{} rotamers for {}", library.len(), library.residue_name);
//! ```

pub mod library;
