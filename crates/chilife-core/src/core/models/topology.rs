use crate::core::utils::identifiers::covalent_radius;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Number of bonds separating two atoms at or below which they are not scored as a
/// non-bonded pair.
pub const DEFAULT_EXCLUSION_DEPTH: usize = 3;

/// Tolerance added to the sum of covalent radii when guessing bonds from coordinates.
pub const DEFAULT_BOND_TOLERANCE: f64 = 0.4;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TopologyError {
    #[error("Bond ({0}, {1}) references an atom outside of the {2} atoms in the topology")]
    IndexOutOfRange(usize, usize, usize),
    #[error("Atom {0} cannot be bonded to itself")]
    SelfBond(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
}

impl Bond {
    /// Creates a bond with the lower index first.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            atom1: a.min(b),
            atom2: a.max(b),
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }
}

/// Bond graph of a molecular fragment with the derived list of non-bonded pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<usize>>,
    exclusion_depth: usize,
    non_bonded: Vec<(usize, usize)>,
}

impl Topology {
    pub fn new(
        n_atoms: usize,
        bonds: &[(usize, usize)],
        exclusion_depth: usize,
    ) -> Result<Self, TopologyError> {
        let mut unique = HashSet::with_capacity(bonds.len());
        let mut adjacency = vec![Vec::new(); n_atoms];
        let mut bond_list = Vec::with_capacity(bonds.len());

        for &(a, b) in bonds {
            if a >= n_atoms || b >= n_atoms {
                return Err(TopologyError::IndexOutOfRange(a, b, n_atoms));
            }
            if a == b {
                return Err(TopologyError::SelfBond(a));
            }
            let bond = Bond::new(a, b);
            if unique.insert(bond) {
                adjacency[a].push(b);
                adjacency[b].push(a);
                bond_list.push(bond);
            }
        }
        for neighbors in adjacency.iter_mut() {
            neighbors.sort_unstable();
        }

        let mut topology = Self {
            bonds: bond_list,
            adjacency,
            exclusion_depth,
            non_bonded: Vec::new(),
        };
        topology.non_bonded = topology.compute_non_bonded_pairs();
        Ok(topology)
    }

    pub fn n_atoms(&self) -> usize {
        self.adjacency.len()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond_pairs(&self) -> Vec<(usize, usize)> {
        self.bonds.iter().map(|b| (b.atom1, b.atom2)).collect()
    }

    /// Bonded neighbours of `atom`, in ascending index order.
    pub fn neighbors(&self, atom: usize) -> &[usize] {
        &self.adjacency[atom]
    }

    pub fn exclusion_depth(&self) -> usize {
        self.exclusion_depth
    }

    /// Atom pairs `(i, j)` with `i < j` separated by more than the exclusion depth.
    pub fn non_bonded_pairs(&self) -> &[(usize, usize)] {
        &self.non_bonded
    }

    /// Breadth-first bond counts from `start`, stopping after `max_depth` bonds.
    /// Atoms further away (or disconnected) are `None`.
    pub fn graph_distances(&self, start: usize, max_depth: usize) -> Vec<Option<usize>> {
        let mut distances = vec![None; self.n_atoms()];
        let mut queue = VecDeque::new();
        distances[start] = Some(0);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let depth = distances[current].unwrap_or(0);
            if depth == max_depth {
                continue;
            }
            for &next in &self.adjacency[current] {
                if distances[next].is_none() {
                    distances[next] = Some(depth + 1);
                    queue.push_back(next);
                }
            }
        }
        distances
    }

    fn compute_non_bonded_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.n_atoms();
        let mut pairs = Vec::new();
        for i in 0..n {
            let distances = self.graph_distances(i, self.exclusion_depth);
            for (j, distance) in distances.iter().enumerate().skip(i + 1) {
                if distance.is_none() {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// Guesses covalent bonds from coordinates and element types.
///
/// Two atoms are bonded when their distance is below the sum of their covalent radii plus
/// `tolerance`. Atoms with an unknown element never receive bonds.
pub fn guess_bonds(
    coords: &[Point3<f64>],
    atom_types: &[String],
    tolerance: f64,
) -> Vec<(usize, usize)> {
    if coords.is_empty() {
        return Vec::new();
    }

    let radii: Vec<Option<f64>> = atom_types.iter().map(|t| covalent_radius(t)).collect();
    let max_radius = radii.iter().flatten().cloned().fold(0.0, f64::max);
    let search_radius = 2.0 * max_radius + tolerance;

    let positions: Vec<[f64; 3]> = coords.iter().map(|p| [p.x, p.y, p.z]).collect();
    let kdtree: KdTree<f64, 3> = (&positions).into();

    let mut bonds = Vec::new();
    for (i, position) in positions.iter().enumerate() {
        let Some(r_i) = radii.get(i).copied().flatten() else {
            continue;
        };
        let mut neighbors: Vec<usize> = kdtree
            .within_unsorted::<SquaredEuclidean>(position, search_radius * search_radius)
            .into_iter()
            .map(|nn| nn.item as usize)
            .filter(|&j| j > i)
            .collect();
        neighbors.sort_unstable();

        for j in neighbors {
            let Some(r_j) = radii.get(j).copied().flatten() else {
                continue;
            };
            let cutoff = r_i + r_j + tolerance;
            if (coords[i] - coords[j]).norm() < cutoff {
                bonds.push((i, j));
            }
        }
    }
    bonds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_chain(n: usize) -> Vec<(usize, usize)> {
        (0..n - 1).map(|i| (i, i + 1)).collect()
    }

    #[test]
    fn bond_new_orders_indices() {
        let bond = Bond::new(5, 2);
        assert_eq!((bond.atom1, bond.atom2), (2, 5));
        assert!(bond.contains(5));
        assert!(!bond.contains(3));
    }

    #[test]
    fn new_rejects_out_of_range_and_self_bonds() {
        assert_eq!(
            Topology::new(3, &[(0, 3)], 3),
            Err(TopologyError::IndexOutOfRange(0, 3, 3))
        );
        assert_eq!(
            Topology::new(3, &[(1, 1)], 3),
            Err(TopologyError::SelfBond(1))
        );
    }

    #[test]
    fn duplicate_bonds_are_collapsed() {
        let topology = Topology::new(3, &[(0, 1), (1, 0), (1, 2)], 3).unwrap();
        assert_eq!(topology.bonds().len(), 2);
        assert_eq!(topology.neighbors(1), &[0, 2]);
    }

    #[test]
    fn non_bonded_pairs_exclude_atoms_within_three_bonds() {
        let topology = Topology::new(6, &linear_chain(6), 3).unwrap();
        assert_eq!(topology.non_bonded_pairs(), &[(0, 4), (0, 5), (1, 5)]);
    }

    #[test]
    fn exclusion_depth_controls_the_pair_list() {
        let topology = Topology::new(4, &linear_chain(4), 1).unwrap();
        assert_eq!(topology.non_bonded_pairs(), &[(0, 2), (0, 3), (1, 3)]);
    }

    #[test]
    fn disconnected_atoms_are_always_non_bonded() {
        let topology = Topology::new(3, &[(0, 1)], 3).unwrap();
        assert_eq!(topology.non_bonded_pairs(), &[(0, 2), (1, 2)]);
    }

    #[test]
    fn graph_distances_stop_at_max_depth() {
        let topology = Topology::new(5, &linear_chain(5), 3).unwrap();
        let distances = topology.graph_distances(0, 2);
        assert_eq!(distances, vec![Some(0), Some(1), Some(2), None, None]);
    }

    #[test]
    fn guess_bonds_finds_covalent_contacts_only() {
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.53, 0.0, 0.0),
            Point3::new(2.0, 1.43, 0.0),
            Point3::new(6.0, 0.0, 0.0),
        ];
        let types = vec!["C".to_string(), "C".to_string(), "O".to_string(), "N".to_string()];
        let bonds = guess_bonds(&coords, &types, DEFAULT_BOND_TOLERANCE);
        assert_eq!(bonds, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn guess_bonds_skips_unknown_elements() {
        let coords = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let types = vec!["C".to_string(), "Q".to_string()];
        assert!(guess_bonds(&coords, &types, DEFAULT_BOND_TOLERANCE).is_empty());
    }
}
