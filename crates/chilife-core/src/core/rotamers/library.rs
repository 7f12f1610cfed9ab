use crate::core::models::internal_atom::AtomIdentity;
use crate::core::models::internal_chain::{InternalChain, InternalCoordError};
use crate::core::models::topology::{DEFAULT_BOND_TOLERANCE, guess_bonds};
use nalgebra::Point3;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Highest library file format version this crate understands.
pub const LIBRARY_FORMAT_VERSION: u32 = 1;

/// On-disk description of a single-anchor rotamer library.
///
/// Rotamers are stored as dihedral sets (in degrees) applied to one template conformation,
/// one row per rotamer, in the order of `dihedral_atoms`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RotamerLibraryRecord {
    pub format_version: u32,
    pub residue_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub atom_names: Vec<String>,
    pub atom_types: Vec<String>,
    pub template_coords: Vec<[f64; 3]>,
    /// Bonds as pairs of atom indices. Guessed from the template when absent.
    #[serde(default)]
    pub bonds: Option<Vec<[usize; 2]>>,
    /// Dihedral definitions as `[dihedral, angle, bond, atom]` name quadruples.
    pub dihedral_atoms: Vec<[String; 4]>,
    #[serde(default)]
    pub dihedrals: Vec<Vec<f64>>,
    /// Prior rotamer weights. Uniform when absent.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    /// Atoms carrying the unpaired electron of a spin label.
    #[serde(default)]
    pub spin_atoms: Option<Vec<String>>,
    /// Spin density of every spin atom. Uniform when absent.
    #[serde(default)]
    pub spin_weights: Option<Vec<f64>>,
}

/// On-disk description of a two-anchor (bridged) rotamer library.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BridgedLibraryRecord {
    pub format_version: u32,
    /// Residue-number separation between the two anchors this library was built for.
    #[serde(default)]
    pub increment: Option<isize>,
    pub first: RotamerLibraryRecord,
    pub second: RotamerLibraryRecord,
    /// Pairs of `(first atom name, second atom name)` that must coincide once bridged.
    pub bridge_pairs: Vec<[String; 2]>,
    /// Per-rotamer target distance of every bridge pair. Zero when absent.
    #[serde(default)]
    pub target_distances: Option<Vec<Vec<f64>>>,
}

/// Errors raised while loading, validating or combining rotamer libraries.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    /// The file was written by a newer version of the format.
    #[error("Unsupported library format version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    /// Array lengths or values inside a record disagree with each other.
    #[error("Inconsistent library '{residue}': {message}")]
    Inconsistent { residue: String, message: String },
    /// Libraries being combined do not share the same atom ordering.
    #[error("Libraries '{first}' and '{other}' are not compatible: atom names differ")]
    IncompatibleLibraries { first: String, other: String },
    #[error("Bridge atom '{0}' is not part of the library")]
    UnknownBridgeAtom(String),
    /// Both halves of a bridged library must hold the same number of rotamers.
    #[error("Bridged library halves hold {first} and {second} rotamers")]
    ConformerCountMismatch { first: usize, second: usize },
    #[error("Cannot build or combine an empty library")]
    Empty,
    #[error("Failed to build internal coordinates: {source}")]
    Geometry {
        #[from]
        source: InternalCoordError,
    },
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, LibraryError> {
    let content = std::fs::read_to_string(path).map_err(|e| LibraryError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| LibraryError::Toml {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn check_version(found: u32) -> Result<(), LibraryError> {
    if found == 0 || found > LIBRARY_FORMAT_VERSION {
        return Err(LibraryError::UnsupportedVersion {
            found,
            supported: LIBRARY_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn normalized(weights: Vec<f64>, residue: &str) -> Result<Vec<f64>, LibraryError> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(LibraryError::Inconsistent {
            residue: residue.to_string(),
            message: "weights must be finite and non-negative".to_string(),
        });
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(LibraryError::Inconsistent {
            residue: residue.to_string(),
            message: "weights sum to zero".to_string(),
        });
    }
    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// An in-memory rotamer library: one internal-coordinate conformer per rotamer.
///
/// All conformers share the same atom ordering. Templates are placed with residue number 1 on
/// chain `A`; ensembles renumber and move them onto their site.
#[derive(Debug, Clone)]
pub struct RotamerLibrary {
    pub residue_name: String,
    pub dihedral_atoms: Vec<[String; 4]>,
    pub internal_coords: Vec<InternalChain>,
    pub weights: Vec<f64>,
    /// Spin atom names with their normalized spin densities. Empty for non-spin labels.
    pub spin_atoms: Vec<String>,
    pub spin_weights: Vec<f64>,
}

impl RotamerLibrary {
    pub fn load(path: &Path, exclusion_depth: usize) -> Result<Self, LibraryError> {
        let record: RotamerLibraryRecord = read_toml(path)?;
        Self::from_record(&record, exclusion_depth)
    }

    pub fn from_record(
        record: &RotamerLibraryRecord,
        exclusion_depth: usize,
    ) -> Result<Self, LibraryError> {
        check_version(record.format_version)?;
        let residue = record.residue_name.as_str();
        let inconsistent = |message: String| LibraryError::Inconsistent {
            residue: residue.to_string(),
            message,
        };

        let n_atoms = record.atom_names.len();
        if n_atoms == 0 {
            return Err(LibraryError::Empty);
        }
        if record.atom_types.len() != n_atoms || record.template_coords.len() != n_atoms {
            return Err(inconsistent(format!(
                "{} atom names, {} atom types and {} template coordinates",
                n_atoms,
                record.atom_types.len(),
                record.template_coords.len()
            )));
        }

        let identities: Vec<AtomIdentity> = record
            .atom_names
            .iter()
            .zip(&record.atom_types)
            .map(|(name, atom_type)| AtomIdentity::new(name, atom_type, 1, residue, "A"))
            .collect();
        let coords: Vec<Point3<f64>> = record
            .template_coords
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect();
        let bonds: Vec<(usize, usize)> = match &record.bonds {
            Some(bonds) => bonds.iter().map(|&[a, b]| (a, b)).collect(),
            None => guess_bonds(&coords, &record.atom_types, DEFAULT_BOND_TOLERANCE),
        };

        let template = InternalChain::from_cartesian(
            &identities,
            &coords,
            &bonds,
            &record.dihedral_atoms,
            exclusion_depth,
        )?;

        let dihedral_sets: Vec<Vec<f64>> = if record.dihedrals.is_empty() {
            vec![template.get_dihedral(1, &record.dihedral_atoms, None)?]
        } else {
            record
                .dihedrals
                .iter()
                .map(|row| row.iter().map(|d| d.to_radians()).collect())
                .collect()
        };

        let weights = match &record.weights {
            Some(w) if w.len() != dihedral_sets.len() => {
                return Err(inconsistent(format!(
                    "{} weights for {} rotamers",
                    w.len(),
                    dihedral_sets.len()
                )));
            }
            Some(w) => normalized(w.clone(), residue)?,
            None => vec![1.0 / dihedral_sets.len() as f64; dihedral_sets.len()],
        };

        let mut internal_coords = Vec::with_capacity(dihedral_sets.len());
        for values in &dihedral_sets {
            let mut conformer = template.clone();
            conformer.set_dihedral(values, 1, &record.dihedral_atoms, None)?;
            internal_coords.push(conformer);
        }

        debug!(
            residue,
            rotamers = internal_coords.len(),
            "Built rotamer library from record."
        );

        let library = Self {
            residue_name: record.residue_name.clone(),
            dihedral_atoms: record.dihedral_atoms.clone(),
            internal_coords,
            weights,
            spin_atoms: Vec::new(),
            spin_weights: Vec::new(),
        };
        match &record.spin_atoms {
            Some(names) => library.with_spin_atoms(names.clone(), record.spin_weights.clone()),
            None if record.spin_weights.is_some() => {
                Err(inconsistent("spin weights given without spin atoms".to_string()))
            }
            None => Ok(library),
        }
    }

    /// Builds a library from precomputed conformers, normalizing the weights.
    pub fn from_internal_coords(
        residue_name: &str,
        dihedral_atoms: Vec<[String; 4]>,
        internal_coords: Vec<InternalChain>,
        weights: Vec<f64>,
    ) -> Result<Self, LibraryError> {
        let first = internal_coords.first().ok_or(LibraryError::Empty)?;
        let names = first.atom_names();
        if internal_coords.iter().any(|ic| ic.atom_names() != names) {
            return Err(LibraryError::Inconsistent {
                residue: residue_name.to_string(),
                message: "conformers do not share the same atom ordering".to_string(),
            });
        }
        if weights.len() != internal_coords.len() {
            return Err(LibraryError::Inconsistent {
                residue: residue_name.to_string(),
                message: format!(
                    "{} weights for {} rotamers",
                    weights.len(),
                    internal_coords.len()
                ),
            });
        }
        Ok(Self {
            residue_name: residue_name.to_string(),
            dihedral_atoms,
            weights: normalized(weights, residue_name)?,
            internal_coords,
            spin_atoms: Vec::new(),
            spin_weights: Vec::new(),
        })
    }

    /// Marks the atoms that carry the spin density, with uniform density when `weights` is
    /// `None`.
    pub fn with_spin_atoms(
        mut self,
        names: Vec<String>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, LibraryError> {
        let inconsistent = |message: String| LibraryError::Inconsistent {
            residue: self.residue_name.clone(),
            message,
        };
        if names.is_empty() {
            return Err(inconsistent("spin atom list is empty".to_string()));
        }
        if let Some(missing) = names.iter().find(|n| self.atom_index(n).is_none()) {
            return Err(inconsistent(format!("spin atom '{missing}' is not part of the library")));
        }
        let weights = match weights {
            Some(w) if w.len() != names.len() => {
                return Err(inconsistent(format!(
                    "{} spin weights for {} spin atoms",
                    w.len(),
                    names.len()
                )));
            }
            Some(w) => normalized(w, &self.residue_name)?,
            None => vec![1.0 / names.len() as f64; names.len()],
        };
        self.spin_atoms = names;
        self.spin_weights = weights;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.internal_coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal_coords.is_empty()
    }

    pub fn atom_names(&self) -> Vec<String> {
        self.internal_coords
            .first()
            .map(|ic| ic.atom_names())
            .unwrap_or_default()
    }

    pub fn atom_types(&self) -> Vec<String> {
        self.internal_coords
            .first()
            .map(|ic| ic.atom_types())
            .unwrap_or_default()
    }

    pub fn atom_index(&self, name: &str) -> Option<usize> {
        self.internal_coords
            .first()
            .and_then(|ic| ic.atoms().iter().position(|a| a.name() == name))
    }

    /// Concatenates libraries with identical atom ordering.
    ///
    /// Relative populations of independent libraries are unknown, so the combined weights are
    /// uniform.
    pub fn combine(libraries: Vec<RotamerLibrary>) -> Result<Self, LibraryError> {
        let mut iter = libraries.into_iter();
        let mut combined = iter.next().ok_or(LibraryError::Empty)?;
        let names = combined.atom_names();

        let mut merged = 1;
        for library in iter {
            if library.atom_names() != names {
                return Err(LibraryError::IncompatibleLibraries {
                    first: combined.residue_name.clone(),
                    other: library.residue_name.clone(),
                });
            }
            combined.internal_coords.extend(library.internal_coords);
            merged += 1;
        }

        if merged > 1 {
            warn!(
                libraries = merged,
                "Combining rotamer libraries without relative populations; all weights are set uniform."
            );
        }
        let n = combined.internal_coords.len();
        combined.weights = vec![1.0 / n as f64; n];
        Ok(combined)
    }
}

/// Two paired rotamer libraries anchored at two residues and joined by bridge atoms.
#[derive(Debug, Clone)]
pub struct BridgedLibrary {
    pub first: RotamerLibrary,
    pub second: RotamerLibrary,
    pub increment: Option<isize>,
    pub bridge_names: Vec<[String; 2]>,
    /// Bridge pairs as `(index in first, index in second)`.
    pub bridge_pairs: Vec<(usize, usize)>,
    /// Target distance of every bridge pair, one row per rotamer.
    pub target_distances: Vec<Vec<f64>>,
}

impl BridgedLibrary {
    pub fn load(path: &Path, exclusion_depth: usize) -> Result<Self, LibraryError> {
        let record: BridgedLibraryRecord = read_toml(path)?;
        Self::from_record(&record, exclusion_depth)
    }

    pub fn from_record(
        record: &BridgedLibraryRecord,
        exclusion_depth: usize,
    ) -> Result<Self, LibraryError> {
        check_version(record.format_version)?;
        let first = RotamerLibrary::from_record(&record.first, exclusion_depth)?;
        let second = RotamerLibrary::from_record(&record.second, exclusion_depth)?;
        Self::new(
            first,
            second,
            record.bridge_pairs.clone(),
            record.target_distances.clone(),
            record.increment,
        )
    }

    pub fn new(
        first: RotamerLibrary,
        mut second: RotamerLibrary,
        bridge_names: Vec<[String; 2]>,
        target_distances: Option<Vec<Vec<f64>>>,
        increment: Option<isize>,
    ) -> Result<Self, LibraryError> {
        if first.len() != second.len() {
            return Err(LibraryError::ConformerCountMismatch {
                first: first.len(),
                second: second.len(),
            });
        }
        if bridge_names.is_empty() {
            return Err(LibraryError::Inconsistent {
                residue: first.residue_name.clone(),
                message: "a bridged library needs at least one bridge pair".to_string(),
            });
        }

        let bridge_pairs = bridge_names
            .iter()
            .map(|[a, b]| {
                let ia = first
                    .atom_index(a)
                    .ok_or_else(|| LibraryError::UnknownBridgeAtom(a.clone()))?;
                let ib = second
                    .atom_index(b)
                    .ok_or_else(|| LibraryError::UnknownBridgeAtom(b.clone()))?;
                Ok((ia, ib))
            })
            .collect::<Result<Vec<_>, LibraryError>>()?;

        let target_distances = match target_distances {
            Some(rows) => {
                if rows.len() != first.len() || rows.iter().any(|r| r.len() != bridge_pairs.len()) {
                    return Err(LibraryError::Inconsistent {
                        residue: first.residue_name.clone(),
                        message: "target distances need one value per bridge pair and rotamer"
                            .to_string(),
                    });
                }
                rows
            }
            None => vec![vec![0.0; bridge_pairs.len()]; first.len()],
        };

        // Paired rotamers share one population.
        second.weights = first.weights.clone();

        Ok(Self {
            first,
            second,
            increment,
            bridge_names,
            bridge_pairs,
            target_distances,
        })
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Concatenates bridged libraries built for other increments, with uniform weights.
    pub fn combine(libraries: Vec<BridgedLibrary>) -> Result<Self, LibraryError> {
        let mut iter = libraries.into_iter();
        let head = iter.next().ok_or(LibraryError::Empty)?;
        let mut firsts = vec![head.first];
        let mut seconds = vec![head.second];
        let mut targets = head.target_distances;

        for library in iter {
            if library.bridge_names != head.bridge_names {
                return Err(LibraryError::IncompatibleLibraries {
                    first: firsts[0].residue_name.clone(),
                    other: library.first.residue_name.clone(),
                });
            }
            firsts.push(library.first);
            seconds.push(library.second);
            targets.extend(library.target_distances);
        }

        let first = RotamerLibrary::combine(firsts)?;
        let second = RotamerLibrary::combine(seconds)?;
        Self::new(first, second, head.bridge_names, Some(targets), head.increment)
    }
}
