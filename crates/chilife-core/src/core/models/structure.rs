use super::internal_atom::AtomIdentity;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::fmt;

/// A host atom with a fixed Cartesian position.
#[derive(Debug, Clone, PartialEq)]
pub struct HostAtom {
    pub identity: AtomIdentity,
    pub position: Point3<f64>,
}

impl HostAtom {
    pub fn new(identity: AtomIdentity, position: Point3<f64>) -> Self {
        Self { identity, position }
    }
}

/// Read-only view of the rigid structure that ensembles are attached to.
///
/// Implementors expose flat per-atom data and a spatial query; selections and site lookups
/// are provided on top of those.
pub trait HostStructure {
    fn atoms(&self) -> &[HostAtom];

    /// Indices of atoms within `radius` of `center`, in ascending order.
    fn atoms_within(&self, center: &Point3<f64>, radius: f64) -> Vec<usize>;

    fn select<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&HostAtom) -> bool,
        Self: Sized,
    {
        self.atoms()
            .iter()
            .enumerate()
            .filter(|(_, atom)| predicate(atom))
            .map(|(i, _)| i)
            .collect()
    }

    fn find_atom(&self, chain_id: &str, residue_id: isize, name: &str) -> Option<usize> {
        self.atoms().iter().position(|a| {
            a.identity.chain_id == chain_id
                && a.identity.residue_id == residue_id
                && a.identity.name == name
        })
    }

    fn residue_name(&self, chain_id: &str, residue_id: isize) -> Option<&str> {
        self.atoms()
            .iter()
            .find(|a| a.identity.chain_id == chain_id && a.identity.residue_id == residue_id)
            .map(|a| a.identity.residue_name.as_str())
    }
}

/// In-memory host structure backed by a k-d tree over atom positions.
#[derive(Clone)]
pub struct Structure {
    atoms: Vec<HostAtom>,
    kdtree: KdTree<f64, 3>,
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structure")
            .field("n_atoms", &self.atoms.len())
            .finish()
    }
}

impl Structure {
    pub fn new(atoms: Vec<HostAtom>) -> Self {
        let positions: Vec<[f64; 3]> = atoms
            .iter()
            .map(|a| [a.position.x, a.position.y, a.position.z])
            .collect();
        let kdtree: KdTree<f64, 3> = (&positions).into();
        Self { atoms, kdtree }
    }

    pub fn from_parts(identities: Vec<AtomIdentity>, positions: &[Point3<f64>]) -> Self {
        let atoms = identities
            .into_iter()
            .zip(positions.iter())
            .map(|(identity, &position)| HostAtom::new(identity, position))
            .collect();
        Self::new(atoms)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }
}

impl HostStructure for Structure {
    fn atoms(&self) -> &[HostAtom] {
        &self.atoms
    }

    fn atoms_within(&self, center: &Point3<f64>, radius: f64) -> Vec<usize> {
        if self.atoms.is_empty() {
            return Vec::new();
        }
        let mut indices: Vec<usize> = self
            .kdtree
            .within_unsorted::<SquaredEuclidean>(&[center.x, center.y, center.z], radius * radius)
            .into_iter()
            .map(|nn| nn.item as usize)
            .collect();
        indices.sort_unstable();
        indices
    }
}
