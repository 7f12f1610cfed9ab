use super::config::{BridgeConfig, ClashOrigin, SiteSpecifier};
use super::ensemble::{RotamerEnsemble, spin_centers};
use super::environment::HostEnvironment;
use super::error::EngineError;
use super::progress::{MinimizationObserver, ProgressReporter};
use super::tasks::bridge_minimization::{self, BridgeOutcome, BridgeProblem};
use super::tasks::clash_evaluation::{self, ClashModel};
use super::utils::sampling::{boltzmann_factors, reweight, trim_indices};
use crate::core::forcefield::params::LjParam;
use crate::core::forcefield::scoring::ClashEnergy;
use crate::core::models::internal_chain::DihedralHandle;
use crate::core::models::structure::HostStructure;
use crate::core::models::topology::Topology;
use crate::core::rotamers::library::BridgedLibrary;
use crate::core::utils::geometry::{centroid, weighted_centroid};
use crate::core::utils::identifiers::is_backbone_atom;
use itertools::Itertools;
use nalgebra::Point3;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Maps the atoms of two bridged halves onto one fused atom set.
///
/// Fused order is the non-bridge atoms of the first half, then those of the second half,
/// then one atom per bridge pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedLayout {
    first_map: Vec<usize>,
    second_map: Vec<usize>,
    bridge_start: usize,
    len: usize,
}

impl FusedLayout {
    pub fn new(n_first: usize, n_second: usize, bridge_pairs: &[(usize, usize)]) -> Self {
        let mut first_map = vec![usize::MAX; n_first];
        let mut second_map = vec![usize::MAX; n_second];
        let n_bridges = bridge_pairs.len();
        let bridge_start = n_first + n_second - 2 * n_bridges;

        for (k, &(a, b)) in bridge_pairs.iter().enumerate() {
            first_map[a] = bridge_start + k;
            second_map[b] = bridge_start + k;
        }
        let mut next = 0;
        for slot in first_map.iter_mut().chain(second_map.iter_mut()) {
            if *slot == usize::MAX {
                *slot = next;
                next += 1;
            }
        }

        Self {
            first_map,
            second_map,
            bridge_start,
            len: bridge_start + n_bridges,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fused index of atom `i` of the first half.
    pub fn first_index(&self, i: usize) -> usize {
        self.first_map[i]
    }

    /// Fused index of atom `i` of the second half.
    pub fn second_index(&self, i: usize) -> usize {
        self.second_map[i]
    }

    pub fn is_bridge(&self, fused: usize) -> bool {
        fused >= self.bridge_start && fused < self.len
    }

    /// Fused coordinates; every bridge atom sits at the mean of its two source positions.
    pub fn fuse(&self, first: &[Point3<f64>], second: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let mut sums = vec![Point3::origin(); self.len];
        let mut counts = vec![0u32; self.len];
        let sources = self
            .first_map
            .iter()
            .zip(first)
            .chain(self.second_map.iter().zip(second));
        for (&slot, p) in sources {
            sums[slot].coords += p.coords;
            counts[slot] += 1;
        }
        sums.iter()
            .zip(counts)
            .map(|(sum, n)| Point3::from(sum.coords / f64::from(n.max(1))))
            .collect()
    }
}

/// Outcome of closing the bridges of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeDiagnostics {
    /// Closure error of every conformer before rejection, in Angstrom.
    pub closure_errors: Vec<f64>,
    pub min_error: f64,
    /// Set when even the best conformer exceeds the soft threshold.
    pub distorted: bool,
    /// Number of conformers rejected for exceeding the hard threshold.
    pub removed: usize,
    /// Minimizer iterations per conformer.
    pub iterations: Vec<usize>,
}

/// A label anchored at two residues whose halves are joined through bridge atoms.
///
/// Both halves hold the same number of conformers, paired by index, and share one set of
/// population weights.
#[derive(Debug, Clone)]
pub struct BridgingEnsemble {
    label: String,
    first: RotamerEnsemble,
    second: RotamerEnsemble,
    bridge_names: Vec<[String; 2]>,
    bridge_pairs: Vec<(usize, usize)>,
    target_distances: Vec<Vec<f64>>,
    layout: FusedLayout,
    atom_names: Vec<String>,
    atom_types: Vec<String>,
    side_chain: Vec<usize>,
    spin_indices: Vec<usize>,
    spin_weights: Vec<f64>,
    topology: Topology,
    lj_params: Vec<LjParam>,
    environment: HostEnvironment,
    energies: Option<Vec<ClashEnergy>>,
    partition: f64,
    diagnostics: Option<BridgeDiagnostics>,
    config: BridgeConfig,
}

impl BridgingEnsemble {
    /// Places both halves of `library` onto their sites and collects the host environment
    /// around the fused label.
    #[instrument(skip_all, name = "bridging_ensemble", fields(label, first = first_site.residue_number, second = second_site.residue_number))]
    pub fn new<H: HostStructure + ?Sized>(
        label: &str,
        library: &BridgedLibrary,
        host: &H,
        first_site: &SiteSpecifier,
        second_site: &SiteSpecifier,
        config: BridgeConfig,
    ) -> Result<Self, EngineError> {
        if let Some(increment) = library.increment {
            let actual = second_site.residue_number - first_site.residue_number;
            if actual != increment {
                return Err(EngineError::Configuration(format!(
                    "library bridges residues {increment} apart but the sites are {actual} apart"
                )));
            }
        }
        let first = RotamerEnsemble::place(
            label,
            &library.first,
            host,
            first_site,
            config.ensemble.clone(),
        )?;
        let second = RotamerEnsemble::place(
            label,
            &library.second,
            host,
            second_site,
            config.ensemble.clone(),
        )?;

        let mut ensemble = Self::from_ensembles(
            label,
            first,
            second,
            library.bridge_names.clone(),
            library.target_distances.clone(),
            config,
        )?;
        ensemble.attach_environment(host)?;
        Ok(ensemble)
    }

    /// Joins two placed halves. Weights of the first half become the shared weights.
    pub fn from_ensembles(
        label: &str,
        first: RotamerEnsemble,
        mut second: RotamerEnsemble,
        bridge_names: Vec<[String; 2]>,
        target_distances: Vec<Vec<f64>>,
        config: BridgeConfig,
    ) -> Result<Self, EngineError> {
        if first.len() != second.len() {
            return Err(EngineError::Configuration(format!(
                "bridged halves have {} and {} conformers",
                first.len(),
                second.len()
            )));
        }
        if bridge_names.is_empty() {
            return Err(EngineError::Configuration(
                "at least one bridge pair is required".to_string(),
            ));
        }
        if target_distances.len() != first.len()
            || target_distances.iter().any(|row| row.len() != bridge_names.len())
        {
            return Err(EngineError::Configuration(
                "target distances need one value per bridge pair and conformer".to_string(),
            ));
        }

        let index_of = |names: &[String], name: &str| names.iter().position(|n| n == name);
        let mut seen_first = HashSet::new();
        let mut seen_second = HashSet::new();
        let mut bridge_pairs = Vec::with_capacity(bridge_names.len());
        for [a, b] in &bridge_names {
            let ia = index_of(first.atom_names(), a);
            let ib = index_of(second.atom_names(), b);
            let (Some(ia), Some(ib)) = (ia, ib) else {
                return Err(EngineError::Configuration(format!(
                    "bridge atoms '{a}'/'{b}' are not present in both halves"
                )));
            };
            if !seen_first.insert(ia) || !seen_second.insert(ib) {
                return Err(EngineError::Configuration(format!(
                    "bridge atoms '{a}'/'{b}' are used by more than one pair"
                )));
            }
            bridge_pairs.push((ia, ib));
        }

        let layout = FusedLayout::new(first.atom_names().len(), second.atom_names().len(), &bridge_pairs);
        let mut atom_names = vec![String::new(); layout.len()];
        let mut atom_types = vec![String::new(); layout.len()];
        let mut side_chain = HashSet::new();
        // Second half first so that bridge atoms carry the first half's names.
        for i in 0..second.atom_names().len() {
            let fused = layout.second_index(i);
            atom_names[fused] = second.atom_names()[i].clone();
            atom_types[fused] = second.atom_types()[i].clone();
            if !is_backbone_atom(&second.atom_names()[i]) {
                side_chain.insert(fused);
            }
        }
        for i in 0..first.atom_names().len() {
            let fused = layout.first_index(i);
            atom_names[fused] = first.atom_names()[i].clone();
            atom_types[fused] = first.atom_types()[i].clone();
            if !is_backbone_atom(&first.atom_names()[i]) {
                side_chain.insert(fused);
            }
        }
        let side_chain: Vec<usize> = side_chain.into_iter().sorted_unstable().collect();

        // A bridge atom named as spin atom by both halves keeps its combined density.
        let mut spin: Vec<(usize, f64)> = Vec::new();
        let spin_sources = first
            .spin_indices()
            .iter()
            .map(|&i| layout.first_index(i))
            .zip(first.spin_weights())
            .chain(
                second
                    .spin_indices()
                    .iter()
                    .map(|&i| layout.second_index(i))
                    .zip(second.spin_weights()),
            );
        for (fused, &w) in spin_sources {
            match spin.iter_mut().find(|(i, _)| *i == fused) {
                Some((_, total)) => *total += w,
                None => spin.push((fused, w)),
            }
        }
        let (spin_indices, spin_weights): (Vec<usize>, Vec<f64>) = spin.into_iter().unzip();

        let bonds: Vec<(usize, usize)> = first
            .topology()
            .bond_pairs()
            .into_iter()
            .map(|(a, b)| (layout.first_index(a), layout.first_index(b)))
            .chain(
                second
                    .topology()
                    .bond_pairs()
                    .into_iter()
                    .map(|(a, b)| (layout.second_index(a), layout.second_index(b))),
            )
            .filter(|(a, b)| a != b)
            .collect();
        let topology = Topology::new(layout.len(), &bonds, config.ensemble.exclusion_depth)?;
        let lj_params = config.ensemble.steric.resolve(&atom_types)?;

        second.set_weights(first.weights())?;

        Ok(Self {
            label: label.to_string(),
            first,
            second,
            bridge_names,
            bridge_pairs,
            target_distances,
            layout,
            atom_names,
            atom_types,
            side_chain,
            spin_indices,
            spin_weights,
            topology,
            lj_params,
            environment: HostEnvironment::empty(),
            energies: None,
            partition: 1.0,
            diagnostics: None,
            config,
        })
    }

    /// Collects host atoms around the clash origin, skipping both anchor residues.
    pub fn attach_environment<H: HostStructure + ?Sized>(&mut self, host: &H) -> Result<(), EngineError> {
        let origin = self.clash_origin()?;
        let excluded = [self.first.site().clone(), self.second.site().clone()];
        let ensemble = &self.config.ensemble;
        self.environment = HostEnvironment::collect(
            host,
            &origin,
            ensemble.clash_radius,
            &excluded,
            ensemble.exclude_water,
            &ensemble.steric,
        )?;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `<native><site1><native><site2><label>_<chain>`, named after the first anchor's native
    /// residue.
    pub fn name(&self) -> String {
        let native = self.first.native();
        format!(
            "{}{}{}{}{}_{}",
            native,
            self.first.site().residue_number,
            native,
            self.second.site().residue_number,
            self.label,
            self.first.site().chain_id
        )
    }

    pub fn first(&self) -> &RotamerEnsemble {
        &self.first
    }

    pub fn second(&self) -> &RotamerEnsemble {
        &self.second
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        self.first.weights()
    }

    pub fn bridge_names(&self) -> &[[String; 2]] {
        &self.bridge_names
    }

    pub fn target_distances(&self) -> &[Vec<f64>] {
        &self.target_distances
    }

    pub fn layout(&self) -> &FusedLayout {
        &self.layout
    }

    pub fn atom_names(&self) -> &[String] {
        &self.atom_names
    }

    pub fn atom_types(&self) -> &[String] {
        &self.atom_types
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    /// Fused-set energies from the last evaluation, aligned with the conformers.
    pub fn energies(&self) -> Option<&[ClashEnergy]> {
        self.energies.as_deref()
    }

    pub fn partition(&self) -> f64 {
        self.partition
    }

    pub fn diagnostics(&self) -> Option<&BridgeDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fused coordinates of every conformer.
    pub fn fused_coords(&self) -> Vec<Vec<Point3<f64>>> {
        self.first
            .coords()
            .iter()
            .zip(self.second.coords())
            .map(|(a, b)| self.layout.fuse(a, b))
            .collect()
    }

    /// Fused indices of the spin atoms of both halves.
    pub fn spin_indices(&self) -> &[usize] {
        &self.spin_indices
    }

    /// Spin-density weighted center of every fused conformer, or `None` without spin atoms.
    pub fn spin_coords(&self) -> Option<Vec<Point3<f64>>> {
        spin_centers(&self.fused_coords(), &self.spin_indices, &self.spin_weights)
    }

    pub fn spin_centroid(&self) -> Option<Point3<f64>> {
        weighted_centroid(&self.spin_coords()?, self.weights())
    }

    /// Root-mean-square bridge distance error of every conformer at its current geometry.
    pub fn closure_errors(&self) -> Vec<f64> {
        self.first
            .coords()
            .iter()
            .zip(self.second.coords())
            .zip(&self.target_distances)
            .map(|((a, b), targets)| {
                bridge_minimization::bridge_error(a, b, &self.bridge_pairs, targets).sqrt()
            })
            .collect()
    }

    pub fn clash_origin(&self) -> Result<Point3<f64>, EngineError> {
        match &self.config.ensemble.clash_origin {
            ClashOrigin::Centroid => {
                let all: Vec<Point3<f64>> = self.fused_coords().into_iter().flatten().collect();
                centroid(&all).ok_or(EngineError::EmptyEnsemble)
            }
            ClashOrigin::Atom(name) => {
                let index = self.atom_names.iter().position(|n| n == name);
                let fused = self.fused_coords();
                index
                    .and_then(|i| fused.first().map(|c| c[i]))
                    .ok_or_else(|| EngineError::AtomNotFound {
                        chain: self.first.site().chain_id.clone(),
                        residue: self.first.site().residue_number,
                        name: name.clone(),
                    })
            }
            ClashOrigin::Point(p) => Ok(*p),
        }
    }

    pub fn close_bridges(&mut self) -> Result<&BridgeDiagnostics, EngineError> {
        self.close_bridges_with(None, &ProgressReporter::new())
    }

    /// Adjusts the free dihedrals of every conformer pair so the bridge atoms meet, commits the
    /// result and folds the final scores into the shared weights.
    ///
    /// Conformers whose closure error stays above the hard threshold are removed. Fails when
    /// no conformer closes within the hard threshold.
    #[instrument(skip_all, name = "close_bridges", fields(name = %self.name()))]
    pub fn close_bridges_with(
        &mut self,
        observer: Option<&dyn MinimizationObserver>,
        reporter: &ProgressReporter,
    ) -> Result<&BridgeDiagnostics, EngineError> {
        let first_handles = self.free_dihedrals(true)?;
        let second_handles = self.free_dihedrals(false)?;

        let outcomes: Vec<BridgeOutcome> = {
            let problem = BridgeProblem {
                first_handles: &first_handles,
                second_handles: &second_handles,
                layout: &self.layout,
                bridge_pairs: &self.bridge_pairs,
                restraint_weight: self.config.restraint_weight,
                displacement_penalty: self.config.displacement_penalty,
                clash: ClashModel {
                    params: &self.lj_params,
                    internal_pairs: self.topology.non_bonded_pairs(),
                    side_chain: &self.side_chain,
                    environment: &self.environment,
                    globals: &self.config.ensemble.steric.globals,
                },
                minimize: self.config.minimize,
                minimizer: &self.config.minimizer,
            };
            bridge_minimization::run(
                self.first.conformers(),
                self.second.conformers(),
                &self.target_distances,
                &problem,
                observer,
                reporter,
            )?
        };

        for (i, outcome) in outcomes.iter().enumerate() {
            let missing = || EngineError::Internal(format!("conformer {i} disappeared during minimization"));
            self.first
                .conformer_mut(i)
                .ok_or_else(missing)?
                .set_resolved_dihedrals(&first_handles, &outcome.first_dihedrals)?;
            self.second
                .conformer_mut(i)
                .ok_or_else(missing)?
                .set_resolved_dihedrals(&second_handles, &outcome.second_dihedrals)?;
        }
        self.first.refresh_coords();
        self.second.refresh_coords();

        let closure_errors: Vec<f64> = outcomes.iter().map(|o| o.closure_error).collect();
        let min_error = closure_errors.iter().copied().fold(f64::INFINITY, f64::min);
        let hard = self.config.hard_threshold;
        if !(min_error <= hard) {
            return Err(EngineError::BridgeClosure {
                min_error,
                threshold: hard,
            });
        }
        let distorted = min_error > self.config.soft_threshold;
        if distorted {
            warn!(
                min_error,
                threshold = self.config.soft_threshold,
                "Bridge closes only with distorted geometry."
            );
        }

        let keep: Vec<usize> = (0..outcomes.len())
            .filter(|&i| closure_errors[i] <= hard)
            .collect();
        let scores: Vec<f64> = keep.iter().map(|&i| outcomes[i].score).collect();
        let factors = boltzmann_factors(&scores, self.config.ensemble.temperature)?;
        let weights: Vec<f64> = keep
            .iter()
            .zip(&factors)
            .map(|(&i, f)| self.first.weights()[i] * f)
            .collect();
        self.retain(&keep)?;
        self.set_shared_weights(&weights)?;

        let removed = outcomes.len() - keep.len();
        info!(
            kept = keep.len(),
            removed, min_error, "Closed bridges."
        );
        Ok(self.diagnostics.insert(BridgeDiagnostics {
            closure_errors,
            min_error,
            distorted,
            removed,
            iterations: outcomes.iter().map(|o| o.iterations).collect(),
        }))
    }

    fn free_dihedrals(&self, first: bool) -> Result<Vec<DihedralHandle>, EngineError> {
        let half = if first { &self.first } else { &self.second };
        let conformer = half.conformers().first().ok_or(EngineError::EmptyEnsemble)?;
        Ok(conformer.resolve_dihedrals(
            half.site().residue_number,
            half.dihedral_atoms(),
            Some(&half.site().chain_id),
        )?)
    }

    pub fn evaluate(&mut self) -> Result<(), EngineError> {
        self.evaluate_with_progress(&ProgressReporter::new())
    }

    /// Scores the fused conformers against themselves and the host and reweights the shared
    /// populations.
    #[instrument(skip_all, name = "evaluate_bridged_ensemble", fields(name = %self.name()))]
    pub fn evaluate_with_progress(&mut self, reporter: &ProgressReporter) -> Result<(), EngineError> {
        if self.is_empty() {
            return Err(EngineError::EmptyEnsemble);
        }
        let fused = self.fused_coords();
        let model = ClashModel {
            params: &self.lj_params,
            internal_pairs: self.topology.non_bonded_pairs(),
            side_chain: &self.side_chain,
            environment: &self.environment,
            globals: &self.config.ensemble.steric.globals,
        };
        let energies = clash_evaluation::run(&fused, &model, reporter)?;
        let totals: Vec<f64> = energies.iter().map(ClashEnergy::total).collect();
        let result = reweight(&totals, self.config.ensemble.temperature, self.first.weights())?;
        self.set_shared_weights(&result.weights)?;
        self.partition = result.partition;
        self.energies = Some(energies);
        info!(partition = self.partition, "Bridged ensemble evaluated.");
        Ok(())
    }

    pub fn trim_rotamers(&mut self) -> Result<(), EngineError> {
        let before = self.len();
        let keep = trim_indices(self.first.weights(), &self.config.ensemble.trim);
        self.retain(&keep)?;
        info!(
            kept = self.len(),
            removed = before - self.len(),
            "Trimmed bridged ensemble."
        );
        Ok(())
    }

    fn retain(&mut self, indices: &[usize]) -> Result<(), EngineError> {
        self.first.retain(indices)?;
        self.second.retain(indices)?;
        self.target_distances = indices
            .iter()
            .map(|&i| self.target_distances[i].clone())
            .collect();
        self.energies = self
            .energies
            .as_ref()
            .map(|e| indices.iter().map(|&i| e[i]).collect());
        Ok(())
    }

    fn set_shared_weights(&mut self, weights: &[f64]) -> Result<(), EngineError> {
        self.first.set_weights(weights)?;
        self.second.set_weights(weights)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::internal_atom::AtomIdentity;
    use crate::core::models::internal_chain::InternalChain;
    use crate::core::models::structure::Structure;
    use crate::core::rotamers::library::RotamerLibrary;
    use crate::engine::config::{BridgeConfigBuilder, EnsembleConfigBuilder};
    use std::sync::Mutex;

    const NAMES: [&str; 6] = ["N", "CA", "C", "CB", "CG", "X"];
    const TYPES: [&str; 6] = ["N", "C", "C", "C", "C", "S"];

    fn first_coords() -> Vec<Point3<f64>> {
        vec![
            Point3::new(-1.0, 1.2, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.2, -0.9, 0.0),
            Point3::new(1.2, -0.3, 0.6),
            Point3::new(2.5, 0.2, 0.3),
            Point3::new(3.5, -0.4, 0.9),
        ]
    }

    fn second_coords() -> Vec<Point3<f64>> {
        vec![
            Point3::new(8.0, 1.2, 0.0),
            Point3::new(7.0, 0.0, 0.0),
            Point3::new(8.2, -0.9, 0.0),
            Point3::new(5.8, -0.3, 0.6),
            Point3::new(4.5, 0.2, 0.3),
            Point3::new(3.5, -0.4, 0.9),
        ]
    }

    fn chi() -> Vec<[String; 4]> {
        vec![
            ["N", "CA", "CB", "CG"].map(String::from),
            ["CA", "CB", "CG", "X"].map(String::from),
        ]
    }

    fn half(coords: &[Point3<f64>], perturbations: &[f64]) -> RotamerLibrary {
        let identities: Vec<AtomIdentity> = NAMES
            .iter()
            .zip(TYPES)
            .map(|(name, t)| AtomIdentity::new(name, t, 1, "CYS", "A"))
            .collect();
        let bonds = [(0, 1), (1, 2), (1, 3), (3, 4), (4, 5)];
        let template = InternalChain::from_cartesian(&identities, coords, &bonds, &chi(), 3).unwrap();
        let closed = template.get_dihedral(1, &chi(), None).unwrap();

        let conformers: Vec<InternalChain> = perturbations
            .iter()
            .map(|&delta| {
                let mut c = template.clone();
                let values: Vec<f64> = closed.iter().map(|v| v + delta).collect();
                c.set_dihedral(&values, 1, &chi(), None).unwrap();
                c
            })
            .collect();
        let n = conformers.len();
        RotamerLibrary::from_internal_coords("CYS", chi(), conformers, vec![1.0; n]).unwrap()
    }

    /// Only the first half is perturbed away from the closed geometry.
    pub(crate) fn library(perturbations: &[f64]) -> BridgedLibrary {
        BridgedLibrary::new(
            half(&first_coords(), perturbations),
            half(&second_coords(), &vec![0.0; perturbations.len()]),
            vec![["X".to_string(), "X".to_string()]],
            None,
            Some(1),
        )
        .unwrap()
    }

    /// Two anchor residues; `second_offset` shifts the second anchor along x.
    pub(crate) fn host(second_offset: f64) -> Structure {
        let mut identities = Vec::new();
        let mut positions = Vec::new();
        for (resi, native, coords, offset) in [
            (1, "CYS", first_coords(), 0.0),
            (2, "ALA", second_coords(), second_offset),
        ] {
            for (name, p) in NAMES.iter().zip(coords).take(3) {
                identities.push(AtomIdentity::new(name, "C", resi, native, "A"));
                positions.push(Point3::new(p.x + offset, p.y, p.z));
            }
        }
        Structure::from_parts(identities, &positions)
    }

    pub(crate) fn config() -> BridgeConfig {
        // Contacts are made negligible so only the bridge restraint drives the search.
        let ensemble = EnsembleConfigBuilder::new().forgive(0.01).build().unwrap();
        BridgeConfigBuilder::new().ensemble(ensemble).build().unwrap()
    }

    fn build(perturbations: &[f64], second_offset: f64) -> BridgingEnsemble {
        BridgingEnsemble::new(
            "XL",
            &library(perturbations),
            &host(second_offset),
            &SiteSpecifier::new("A", 1),
            &SiteSpecifier::new("A", 2),
            config(),
        )
        .unwrap()
    }

    #[test]
    fn fused_layout_merges_bridge_atoms() {
        let layout = FusedLayout::new(3, 2, &[(2, 0)]);
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.first_index(2), 3);
        assert_eq!(layout.second_index(0), 3);
        assert_eq!(layout.second_index(1), 2);
        assert!(layout.is_bridge(3));

        let fused = layout.fuse(
            &[Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            &[Point3::new(4.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)],
        );
        assert_eq!(fused[3], Point3::new(3.0, 0.0, 0.0));
        assert_eq!(fused[2], Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn new_builds_fused_atom_set() {
        let ensemble = build(&[0.3, 0.2], 0.0);
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.atom_names().len(), 11);
        assert_eq!(ensemble.atom_names()[10], "X");
        assert_eq!(ensemble.second().native(), "ALA");
        assert_eq!(ensemble.name(), "CYS1CYS2XL_A");
        assert!(ensemble.environment().is_empty());
    }

    #[test]
    fn spin_centers_use_fused_coordinates() {
        let mut lib = library(&[0.3, 0.2]);
        lib.first = lib.first.with_spin_atoms(vec!["CG".to_string()], None).unwrap();
        lib.second = lib.second.with_spin_atoms(vec!["X".to_string()], None).unwrap();
        let ensemble = BridgingEnsemble::new(
            "XL",
            &lib,
            &host(0.0),
            &SiteSpecifier::new("A", 1),
            &SiteSpecifier::new("A", 2),
            config(),
        )
        .unwrap();
        assert_eq!(ensemble.spin_indices(), &[4, 10]);

        let fused = ensemble.fused_coords();
        let spin = ensemble.spin_coords().unwrap();
        for (center, coords) in spin.iter().zip(&fused) {
            let midpoint = Point3::from((coords[4].coords + coords[10].coords) / 2.0);
            assert!((center - midpoint).norm() < 1e-9);
        }
        let expected = Point3::from((spin[0].coords + spin[1].coords) / 2.0);
        assert!((ensemble.spin_centroid().unwrap() - expected).norm() < 1e-9);

        assert!(build(&[0.3], 0.0).spin_coords().is_none());
    }

    #[test]
    fn close_bridges_brings_bridge_atoms_together() {
        let mut ensemble = build(&[0.3, 0.2], 0.0);
        let before = ensemble.closure_errors();
        assert!(before.iter().all(|&e| e > 0.1));

        let diagnostics = ensemble.close_bridges().unwrap().clone();
        let hard = ensemble.config().hard_threshold;
        assert!(diagnostics.min_error <= hard);
        assert_eq!(diagnostics.removed, 0);

        let after = ensemble.closure_errors();
        for (b, a) in before.iter().zip(&after) {
            assert!(a < b);
            assert!(*a <= hard);
        }
        assert!((ensemble.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(ensemble.first().weights(), ensemble.second().weights());
    }

    #[test]
    fn observer_receives_minimizer_iterations() {
        let mut ensemble = build(&[0.3], 0.0);
        let seen = Mutex::new(Vec::new());
        let observer = |objective: f64, iteration: usize| {
            seen.lock().unwrap().push((iteration, objective));
        };
        ensemble
            .close_bridges_with(Some(&observer), &ProgressReporter::new())
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(seen[0].0, 1);
    }

    #[test]
    fn unreachable_bridge_is_a_geometry_error() {
        let mut ensemble = build(&[0.0], 30.0);
        let result = ensemble.close_bridges();
        assert!(matches!(result, Err(EngineError::BridgeClosure { .. })));
    }

    #[test]
    fn mismatched_increment_is_rejected() {
        let result = BridgingEnsemble::new(
            "XL",
            &library(&[0.0]),
            &host(0.0),
            &SiteSpecifier::new("A", 1),
            &SiteSpecifier::new("A", 3),
            config(),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn evaluate_and_trim_keep_halves_in_lockstep() {
        let mut ensemble = build(&[0.3, 0.2, 0.1], 0.0);
        ensemble.close_bridges().unwrap();
        ensemble.evaluate().unwrap();
        ensemble.trim_rotamers().unwrap();

        assert_eq!(ensemble.first().len(), ensemble.second().len());
        assert_eq!(ensemble.target_distances().len(), ensemble.len());
        assert_eq!(ensemble.fused_coords().len(), ensemble.len());
        assert_eq!(ensemble.energies().map(<[ClashEnergy]>::len), Some(ensemble.len()));
        assert!((ensemble.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(ensemble.first().weights(), ensemble.second().weights());
    }

    #[test]
    fn mismatched_halves_are_rejected() {
        let lib = library(&[0.0, 0.1]);
        let host = host(0.0);
        let first = RotamerEnsemble::place(
            "XL",
            &lib.first,
            &host,
            &SiteSpecifier::new("A", 1),
            config().ensemble,
        )
        .unwrap();
        let single = RotamerLibrary::from_internal_coords(
            "CYS",
            chi(),
            vec![lib.second.internal_coords[0].clone()],
            vec![1.0],
        )
        .unwrap();
        let second = RotamerEnsemble::place(
            "XL",
            &single,
            &host,
            &SiteSpecifier::new("A", 2),
            config().ensemble,
        )
        .unwrap();
        let result = BridgingEnsemble::from_ensembles(
            "XL",
            first,
            second,
            vec![["X".to_string(), "X".to_string()]],
            vec![vec![0.0]; 2],
            config(),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
