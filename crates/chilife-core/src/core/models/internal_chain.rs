use super::internal_atom::{AtomIdentity, InternalAtom};
use super::topology::{Topology, TopologyError};
use crate::core::utils::geometry::{self, Frame};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum InternalCoordError {
    #[error("Dihedral {atoms} not found on residue {residue} of chain '{chain}'")]
    DihedralNotFound {
        chain: String,
        residue: isize,
        atoms: String,
    },
    #[error("Chain '{0}' is not present in the internal coordinates")]
    ChainNotFound(String),
    #[error("A chain must be specified when more than one is present: {0:?}")]
    AmbiguousChain(Vec<String>),
    #[error("Received {values} dihedral values for {atoms} atom definitions")]
    LengthMismatch { values: usize, atoms: usize },
    #[error("Atom {atom} references atom {reference}, which is not placed before it in the same segment")]
    UndefinedReference { atom: usize, reference: usize },
    #[error("Expected coordinates for {expected} atoms but found {found}")]
    CoordinateCount { expected: usize, found: usize },
    #[error("The seed atoms of segment {segment} are degenerate and do not define a frame")]
    DegenerateSeed { segment: usize },
    #[error("Atom {atom} belongs to segment {segment}, but only {operators} placement operators were given")]
    MissingOperator {
        atom: usize,
        segment: usize,
        operators: usize,
    },
    #[error("Atom '{0}' required for site alignment was not found")]
    AtomNotFound(String),
    #[error("Invalid bond topology: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },
}

/// How a chain's N, CA and C atoms are superimposed onto a host site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentMethod {
    /// Frame x axis along the bisector of the N-CA-C angle.
    #[default]
    Bisect,
    /// Frame x axis along CA->C with N in the xy-plane.
    Backbone,
}

impl AlignmentMethod {
    pub fn frame(
        &self,
        n: &Point3<f64>,
        ca: &Point3<f64>,
        c: &Point3<f64>,
    ) -> Option<Frame> {
        match self {
            AlignmentMethod::Bisect => Frame::bisect(n, ca, c),
            AlignmentMethod::Backbone => Frame::backbone(n, ca, c),
        }
    }
}

/// Stable reference to a dihedral-defining atom, resolved once from its atom names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DihedralHandle(usize);

impl DihedralHandle {
    pub fn atom_index(&self) -> usize {
        self.0
    }
}

type NameKey = Vec<String>;

// Lookup tables shared read-only between clones of one chain.
#[derive(Debug)]
struct ChainIndex {
    topology: Topology,
    chain_ids: Vec<String>,
    lookup: HashMap<(String, isize), HashMap<NameKey, usize>>,
    siblings: Vec<Vec<usize>>,
}

impl ChainIndex {
    fn build(atoms: &[InternalAtom], topology: Topology) -> Self {
        let mut chain_ids: Vec<String> = Vec::new();
        let mut lookup: HashMap<(String, isize), HashMap<NameKey, usize>> = HashMap::new();
        let mut stems: HashMap<(String, isize, NameKey), Vec<usize>> = HashMap::new();

        for atom in atoms {
            if !chain_ids.iter().any(|c| c == atom.chain_id()) {
                chain_ids.push(atom.chain_id().to_string());
            }
            let group = (atom.chain_id().to_string(), atom.dihedral_residue);
            lookup
                .entry(group)
                .or_default()
                .insert(atom.atom_names.clone(), atom.index);

            if let Some(stem) = atom.stem() {
                stems
                    .entry((
                        atom.chain_id().to_string(),
                        atom.dihedral_residue,
                        stem.to_vec(),
                    ))
                    .or_default()
                    .push(atom.index);
            }
        }

        let mut siblings = vec![Vec::new(); atoms.len()];
        for members in stems.values() {
            for &member in members {
                siblings[member] = members.iter().copied().filter(|&m| m != member).collect();
            }
        }

        Self {
            topology,
            chain_ids,
            lookup,
            siblings,
        }
    }
}

/// A molecular fragment represented by internal coordinates.
///
/// Atoms are stored in definition order, so every atom's reference atoms precede it. Each
/// chain segment starts with three seed atoms laid out in a local frame that the segment's
/// placement operator maps into Cartesian space.
///
/// Cartesian coordinates are cached and tagged with the generation at which they were
/// computed; any mutation of the internal coordinates bumps the generation.
#[derive(Debug, Clone)]
pub struct InternalChain {
    atoms: Vec<InternalAtom>,
    operators: Vec<Frame>,
    index: Arc<ChainIndex>,
    generation: u64,
    cache: Option<(u64, Vec<Point3<f64>>)>,
}

impl InternalChain {
    /// Assembles a chain from explicit internal coordinates.
    ///
    /// `operators` must contain one placement operator per segment referenced by the atoms.
    pub fn from_internal(
        atoms: Vec<InternalAtom>,
        bonds: &[(usize, usize)],
        operators: Vec<Frame>,
        exclusion_depth: usize,
    ) -> Result<Self, InternalCoordError> {
        for (i, atom) in atoms.iter().enumerate() {
            let refs = [atom.bond_idx, atom.angle_idx, atom.dihedral_idx];
            for reference in refs.into_iter().flatten() {
                if reference >= i || atoms[reference].segment != atom.segment {
                    return Err(InternalCoordError::UndefinedReference { atom: i, reference });
                }
            }
            let expected_refs = atom.atom_names.len().saturating_sub(1);
            let found_refs = refs.iter().flatten().count();
            if atom.index != i || expected_refs != found_refs {
                return Err(InternalCoordError::UndefinedReference {
                    atom: i,
                    reference: atom.index,
                });
            }
            if atom.segment >= operators.len() {
                return Err(InternalCoordError::MissingOperator {
                    atom: i,
                    segment: atom.segment,
                    operators: operators.len(),
                });
            }
        }

        let topology = Topology::new(atoms.len(), bonds, exclusion_depth)?;
        let index = Arc::new(ChainIndex::build(&atoms, topology));
        Ok(Self {
            atoms,
            operators,
            index,
            generation: 0,
            cache: None,
        })
    }

    /// Derives internal coordinates for a fragment from its Cartesian coordinates and bonds.
    ///
    /// Reference atoms follow the bond graph: the bond reference is the earliest bonded
    /// predecessor, the angle reference its earliest earlier neighbour, and the dihedral
    /// reference a neighbour of the angle reference (or, for branch points, another neighbour
    /// of the bond reference). `preferred_dihedrals` lists atom-name quadruples (in
    /// `[dihedral, angle, bond, atom]` order) that override this choice for the named atom.
    /// An atom without a bonded predecessor starts a new segment.
    pub fn from_cartesian(
        identities: &[AtomIdentity],
        coords: &[Point3<f64>],
        bonds: &[(usize, usize)],
        preferred_dihedrals: &[[String; 4]],
        exclusion_depth: usize,
    ) -> Result<Self, InternalCoordError> {
        if identities.len() != coords.len() {
            return Err(InternalCoordError::CoordinateCount {
                expected: identities.len(),
                found: coords.len(),
            });
        }
        let topology = Topology::new(identities.len(), bonds, exclusion_depth)?;

        let mut atoms: Vec<InternalAtom> = Vec::with_capacity(identities.len());
        let mut segment_starts: Vec<usize> = Vec::new();

        for i in 0..identities.len() {
            let bonded_before = |start: usize| {
                topology
                    .neighbors(i)
                    .iter()
                    .any(|&n| n >= start && n < i)
            };
            let start = match segment_starts.last().copied() {
                Some(s) if i < s + 3 || bonded_before(s) => s,
                _ => {
                    segment_starts.push(i);
                    i
                }
            };
            let segment = segment_starts.len() - 1;

            let refs = match i - start {
                0 => Vec::new(),
                1 => vec![start],
                2 => {
                    if topology.neighbors(i).contains(&(start + 1)) {
                        vec![start + 1, start]
                    } else {
                        vec![start, start + 1]
                    }
                }
                _ => preferred_references(identities, i, start, preferred_dihedrals)
                    .unwrap_or_else(|| graph_references(&topology, i, start)),
            };

            let mut atom_names = vec![identities[i].name.clone()];
            atom_names.extend(refs.iter().map(|&r| identities[r].name.clone()));
            let dihedral_residue = InternalAtom::owner_residue(&atom_names, identities[i].residue_id);

            atoms.push(InternalAtom {
                identity: identities[i].clone(),
                index: i,
                atom_names,
                bond_idx: refs.first().copied(),
                angle_idx: refs.get(1).copied(),
                dihedral_idx: refs.get(2).copied(),
                bond: 0.0,
                angle: 0.0,
                dihedral: 0.0,
                dihedral_residue,
                segment,
            });
        }

        let index = Arc::new(ChainIndex::build(&atoms, topology));
        let mut chain = Self {
            atoms,
            operators: vec![Frame::identity(); segment_starts.len()],
            index,
            generation: 0,
            cache: None,
        };
        chain.update_from_cartesian(coords)?;
        Ok(chain)
    }

    pub fn atoms(&self) -> &[InternalAtom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn topology(&self) -> &Topology {
        &self.index.topology
    }

    pub fn operators(&self) -> &[Frame] {
        &self.operators
    }

    pub fn chain_ids(&self) -> &[String] {
        &self.index.chain_ids
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn atom_names(&self) -> Vec<String> {
        self.atoms.iter().map(|a| a.identity.name.clone()).collect()
    }

    pub fn atom_types(&self) -> Vec<String> {
        self.atoms
            .iter()
            .map(|a| a.identity.atom_type.clone())
            .collect()
    }

    pub fn identities(&self) -> Vec<AtomIdentity> {
        self.atoms.iter().map(|a| a.identity.clone()).collect()
    }

    /// Every dihedral definition as `(chain, owning residue, [dihedral, angle, bond, atom])`.
    pub fn dihedral_definitions(&self) -> Vec<(String, isize, [String; 4])> {
        self.atoms
            .iter()
            .filter(|a| !a.is_seed())
            .map(|a| {
                let n = &a.atom_names;
                (
                    a.chain_id().to_string(),
                    a.dihedral_residue,
                    [n[3].clone(), n[2].clone(), n[1].clone(), n[0].clone()],
                )
            })
            .collect()
    }

    fn resolve_chain<'a>(&'a self, chain: Option<&'a str>) -> Result<&'a str, InternalCoordError> {
        match chain {
            Some(c) if self.index.chain_ids.iter().any(|id| id == c) => Ok(c),
            Some(c) => Err(InternalCoordError::ChainNotFound(c.to_string())),
            None => match self.index.chain_ids.as_slice() {
                [only] => Ok(only.as_str()),
                [] => Err(InternalCoordError::ChainNotFound(String::new())),
                many => Err(InternalCoordError::AmbiguousChain(many.to_vec())),
            },
        }
    }

    /// Resolves dihedral definitions (each given as `[dihedral, angle, bond, atom]` names or
    /// the reverse) to stable handles.
    pub fn resolve_dihedrals<S: AsRef<str>>(
        &self,
        residue: isize,
        atoms: &[[S; 4]],
        chain: Option<&str>,
    ) -> Result<Vec<DihedralHandle>, InternalCoordError> {
        let chain = self.resolve_chain(chain)?;
        let group = self.index.lookup.get(&(chain.to_string(), residue));

        atoms
            .iter()
            .map(|names| {
                let forward: NameKey = names.iter().map(|s| s.as_ref().to_string()).collect();
                let reversed: NameKey = forward.iter().rev().cloned().collect();
                group
                    .and_then(|g| g.get(&reversed).or_else(|| g.get(&forward)))
                    .map(|&idx| DihedralHandle(idx))
                    .ok_or_else(|| InternalCoordError::DihedralNotFound {
                        chain: chain.to_string(),
                        residue,
                        atoms: format!("{:?} / {:?}", forward, reversed),
                    })
            })
            .collect()
    }

    pub fn get_dihedral<S: AsRef<str>>(
        &self,
        residue: isize,
        atoms: &[[S; 4]],
        chain: Option<&str>,
    ) -> Result<Vec<f64>, InternalCoordError> {
        let handles = self.resolve_dihedrals(residue, atoms, chain)?;
        Ok(self.resolved_dihedrals(&handles))
    }

    pub fn resolved_dihedrals(&self, handles: &[DihedralHandle]) -> Vec<f64> {
        handles.iter().map(|h| self.atoms[h.0].dihedral).collect()
    }

    /// Sets dihedral angles (radians) of one residue.
    ///
    /// Other atoms of the residue that rotate about the same three-atom stem follow the change
    /// so that whole branches move rigidly.
    pub fn set_dihedral<S: AsRef<str>>(
        &mut self,
        values: &[f64],
        residue: isize,
        atoms: &[[S; 4]],
        chain: Option<&str>,
    ) -> Result<(), InternalCoordError> {
        if values.len() != atoms.len() {
            return Err(InternalCoordError::LengthMismatch {
                values: values.len(),
                atoms: atoms.len(),
            });
        }
        let handles = self.resolve_dihedrals(residue, atoms, chain)?;
        self.set_resolved_dihedrals(&handles, values)
    }

    pub fn set_resolved_dihedrals(
        &mut self,
        handles: &[DihedralHandle],
        values: &[f64],
    ) -> Result<(), InternalCoordError> {
        if values.len() != handles.len() {
            return Err(InternalCoordError::LengthMismatch {
                values: values.len(),
                atoms: handles.len(),
            });
        }

        let explicit: Vec<usize> = handles.iter().map(|h| h.0).collect();
        let mut sibling_deltas: HashMap<usize, f64> = HashMap::new();

        for (&idx, &value) in explicit.iter().zip(values) {
            let delta = self.atoms[idx].dihedral - value;
            self.atoms[idx].dihedral = value;
            for &sibling in &self.index.siblings[idx] {
                if !explicit.contains(&sibling) {
                    sibling_deltas.insert(sibling, delta);
                }
            }
        }
        for (sibling, delta) in sibling_deltas {
            self.atoms[sibling].dihedral -= delta;
        }

        self.generation += 1;
        Ok(())
    }

    /// Computes Cartesian coordinates without touching the cache.
    pub fn to_cartesian(&self) -> Vec<Point3<f64>> {
        let mut local: Vec<Point3<f64>> = Vec::with_capacity(self.atoms.len());

        for atom in &self.atoms {
            let p = match (atom.bond_idx, atom.angle_idx, atom.dihedral_idx) {
                (Some(j), Some(k), Some(l)) => geometry::nerf_place(
                    &local[l],
                    &local[k],
                    &local[j],
                    atom.bond,
                    atom.angle,
                    atom.dihedral,
                ),
                (Some(j), Some(k), None) => {
                    geometry::seed_place(&local[j], &local[k], atom.bond, atom.angle)
                }
                (Some(j), None, _) => local[j] + Vector3::x() * atom.bond,
                _ => Point3::origin(),
            };
            local.push(p);
        }

        self.atoms
            .iter()
            .zip(local.iter())
            .map(|(atom, p)| self.operators[atom.segment].to_global(p))
            .collect()
    }

    /// Cartesian coordinates, recomputed only when the internal coordinates have changed.
    pub fn coords(&mut self) -> &[Point3<f64>] {
        let stale = !matches!(&self.cache, Some((g, _)) if *g == self.generation);
        if stale {
            trace!(generation = self.generation, "Recomputing Cartesian coordinates.");
            let coords = self.to_cartesian();
            self.cache = Some((self.generation, coords));
        }
        match &self.cache {
            Some((_, coords)) => coords,
            None => &[],
        }
    }

    /// Returns true if any non-bonded atom pair is closer than `distance`.
    pub fn has_clashes(&mut self, distance: f64) -> bool {
        let index = Arc::clone(&self.index);
        let coords = self.coords();
        let cutoff_sq = distance * distance;
        index
            .topology
            .non_bonded_pairs()
            .iter()
            .any(|&(i, j)| (coords[i] - coords[j]).norm_squared() < cutoff_sq)
    }

    /// Recomputes all internal coordinates and placement operators from new Cartesian
    /// coordinates of the same atoms.
    pub fn update_from_cartesian(&mut self, coords: &[Point3<f64>]) -> Result<(), InternalCoordError> {
        if coords.len() != self.atoms.len() {
            return Err(InternalCoordError::CoordinateCount {
                expected: self.atoms.len(),
                found: coords.len(),
            });
        }

        for atom in self.atoms.iter_mut() {
            let p = &coords[atom.index];
            if let Some(j) = atom.bond_idx {
                atom.bond = geometry::distance(p, &coords[j]);
            }
            if let (Some(j), Some(k)) = (atom.bond_idx, atom.angle_idx) {
                atom.angle = geometry::angle(p, &coords[j], &coords[k]);
            }
            if let (Some(j), Some(k), Some(l)) = (atom.bond_idx, atom.angle_idx, atom.dihedral_idx) {
                atom.dihedral = geometry::dihedral(&coords[l], &coords[k], &coords[j], p);
            }
        }

        for (segment, operator) in self.operators.iter_mut().enumerate() {
            let seeds: Vec<Point3<f64>> = self
                .atoms
                .iter()
                .filter(|a| a.segment == segment)
                .take(3)
                .map(|a| coords[a.index])
                .collect();
            *operator = segment_frame(&seeds).ok_or(InternalCoordError::DegenerateSeed { segment })?;
        }

        self.generation += 1;
        self.cache = Some((self.generation, coords.to_vec()));
        Ok(())
    }

    /// Moves the whole chain rigidly so that its first N, CA and C atoms superimpose onto the
    /// given site atoms.
    pub fn place_at_site(
        &mut self,
        n: &Point3<f64>,
        ca: &Point3<f64>,
        c: &Point3<f64>,
        method: AlignmentMethod,
    ) -> Result<(), InternalCoordError> {
        let [own_n, own_ca, own_c] = {
            let find = |name: &str| {
                self.atoms
                    .iter()
                    .position(|a| a.name() == name)
                    .ok_or_else(|| InternalCoordError::AtomNotFound(name.to_string()))
            };
            [find("N")?, find("CA")?, find("C")?]
        };
        let coords = self.coords();
        let (p_n, p_ca, p_c) = (coords[own_n], coords[own_ca], coords[own_c]);

        let source = method
            .frame(&p_n, &p_ca, &p_c)
            .ok_or(InternalCoordError::DegenerateSeed { segment: 0 })?;
        let target = method
            .frame(n, ca, c)
            .ok_or(InternalCoordError::AtomNotFound("site backbone".to_string()))?;
        let superposition = Frame::superposition(&source, &target);

        for operator in self.operators.iter_mut() {
            *operator = operator.then(&superposition);
        }
        self.generation += 1;
        Ok(())
    }

    /// Renumbers every residue by `delta`.
    pub fn shift_residue_numbers(&mut self, delta: isize) {
        if delta == 0 {
            return;
        }
        for atom in self.atoms.iter_mut() {
            atom.identity.residue_id += delta;
            atom.dihedral_residue += delta;
        }
        let topology = self.index.topology.clone();
        self.index = Arc::new(ChainIndex::build(&self.atoms, topology));
    }

    /// Reassigns the chain id of every atom.
    pub fn set_chain_id(&mut self, chain_id: &str) {
        for atom in self.atoms.iter_mut() {
            atom.identity.chain_id = chain_id.to_string();
        }
        let topology = self.index.topology.clone();
        self.index = Arc::new(ChainIndex::build(&self.atoms, topology));
    }
}

fn segment_frame(seeds: &[Point3<f64>]) -> Option<Frame> {
    match seeds {
        [a] => Some(Frame {
            origin: *a,
            ..Frame::identity()
        }),
        [a, b] => {
            let x = b - a;
            let helper = if x.x.abs() < 0.9 * x.norm() {
                Vector3::x()
            } else {
                Vector3::y()
            };
            Frame::from_three_points(a, b, &(a + helper))
        }
        [a, b, c, ..] => Frame::from_three_points(a, b, c),
        [] => None,
    }
}

fn preferred_references(
    identities: &[AtomIdentity],
    i: usize,
    start: usize,
    preferred: &[[String; 4]],
) -> Option<Vec<usize>> {
    let atom = &identities[i];
    let definition = preferred.iter().find(|d| d[3] == atom.name)?;

    let find = |name: &str| {
        (start..i)
            .rev()
            .find(|&r| {
                identities[r].name == name
                    && identities[r].chain_id == atom.chain_id
                    && identities[r].residue_id == atom.residue_id
            })
            .or_else(|| (start..i).rev().find(|&r| identities[r].name == name))
    };
    Some(vec![find(&definition[2])?, find(&definition[1])?, find(&definition[0])?])
}

fn graph_references(topology: &Topology, i: usize, start: usize) -> Vec<usize> {
    let placed = |n: usize| n >= start && n < i;

    let j = topology
        .neighbors(i)
        .iter()
        .copied()
        .find(|&n| placed(n))
        .unwrap_or(i - 1);
    let k = topology
        .neighbors(j)
        .iter()
        .copied()
        .find(|&n| placed(n) && n != j)
        .or_else(|| (start..i).find(|&n| n != j))
        .unwrap_or(start);
    let l = topology
        .neighbors(k)
        .iter()
        .copied()
        .find(|&n| placed(n) && n != j && n != k)
        .or_else(|| {
            topology
                .neighbors(j)
                .iter()
                .copied()
                .find(|&n| placed(n) && n != k)
        })
        .or_else(|| (start..i).find(|&n| n != j && n != k))
        .unwrap_or(start);
    vec![j, k, l]
}
