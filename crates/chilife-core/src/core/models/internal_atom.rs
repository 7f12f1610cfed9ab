use serde::{Deserialize, Serialize};

/// Identity of an atom independent of how its position is represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomIdentity {
    pub name: String,
    pub atom_type: String,
    pub residue_id: isize,
    pub residue_name: String,
    pub chain_id: String,
}

impl AtomIdentity {
    pub fn new(
        name: &str,
        atom_type: &str,
        residue_id: isize,
        residue_name: &str,
        chain_id: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            atom_type: atom_type.to_string(),
            residue_id,
            residue_name: residue_name.to_string(),
            chain_id: chain_id.to_string(),
        }
    }
}

/// An atom whose position is defined relative to up to three previously placed atoms.
///
/// `atom_names` holds this atom's name followed by the names of its bond, angle and
/// dihedral reference atoms, in that order. Seed atoms at the start of a chain segment have
/// fewer references: the first seed has none, the second only a bond reference and the third
/// a bond and an angle reference.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalAtom {
    pub identity: AtomIdentity,
    /// Position of this atom in the owning chain's atom list.
    pub index: usize,
    pub atom_names: Vec<String>,
    pub bond_idx: Option<usize>,
    pub angle_idx: Option<usize>,
    pub dihedral_idx: Option<usize>,
    /// Bond length in Angstrom.
    pub bond: f64,
    /// Bond angle in radians.
    pub angle: f64,
    /// Dihedral angle in radians.
    pub dihedral: f64,
    /// Residue that owns this dihedral when grouping torsions by residue.
    pub dihedral_residue: isize,
    /// Chain segment whose placement operator positions this atom.
    pub segment: usize,
}

impl InternalAtom {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn chain_id(&self) -> &str {
        &self.identity.chain_id
    }

    pub fn residue_id(&self) -> isize {
        self.identity.residue_id
    }

    pub fn is_seed(&self) -> bool {
        self.dihedral_idx.is_none()
    }

    /// The three reference atom names that the dihedral rotates about, or `None` for seeds.
    pub fn stem(&self) -> Option<&[String]> {
        if self.atom_names.len() == 4 {
            Some(&self.atom_names[1..4])
        } else {
            None
        }
    }

    /// Residue owning the dihedral defined by `atom_names` on an atom of `residue_id`.
    ///
    /// A backbone nitrogen defined through the preceding residue's C, CA and N carries that
    /// residue's psi torsion and is therefore grouped with it.
    pub fn owner_residue(atom_names: &[String], residue_id: isize) -> isize {
        let names: Vec<&str> = atom_names.iter().map(String::as_str).collect();
        if names == ["N", "C", "CA", "N"] {
            residue_id - 1
        } else {
            residue_id
        }
    }
}
