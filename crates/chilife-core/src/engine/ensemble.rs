use super::config::{ClashOrigin, EnsembleConfig, SiteSpecifier};
use super::environment::HostEnvironment;
use super::error::EngineError;
use super::progress::ProgressReporter;
use super::tasks::clash_evaluation::{self, ClashModel};
use super::utils::sampling::{self, reweight, trim_indices, weighted_sample};
use crate::core::forcefield::params::LjParam;
use crate::core::forcefield::scoring::ClashEnergy;
use crate::core::models::internal_chain::{InternalChain, InternalCoordError};
use crate::core::models::structure::HostStructure;
use crate::core::models::topology::Topology;
use crate::core::rotamers::library::RotamerLibrary;
use crate::core::utils::geometry::{centroid, weighted_centroid};
use crate::core::utils::identifiers::is_backbone_atom;
use nalgebra::Point3;
use rand::Rng;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Side-chain conformers attached to one host residue, with their populations.
///
/// Every conformer shares the same atom ordering. Coordinates, weights and conformers are
/// kept index-aligned through evaluation and trimming.
#[derive(Debug, Clone)]
pub struct RotamerEnsemble {
    label: String,
    native: String,
    site: SiteSpecifier,
    dihedral_atoms: Vec<[String; 4]>,
    conformers: Vec<InternalChain>,
    coords: Vec<Vec<Point3<f64>>>,
    weights: Vec<f64>,
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
    config: EnsembleConfig,
}

fn conformer_coords(conformers: &mut [InternalChain]) -> Vec<Vec<Point3<f64>>> {
    #[cfg(not(feature = "parallel"))]
    let iterator = conformers.iter_mut();

    #[cfg(feature = "parallel")]
    let iterator = conformers.par_iter_mut();

    iterator.map(|c| c.coords().to_vec()).collect()
}

pub(crate) fn spin_centers(
    coords: &[Vec<Point3<f64>>],
    indices: &[usize],
    weights: &[f64],
) -> Option<Vec<Point3<f64>>> {
    if indices.is_empty() {
        return None;
    }
    coords
        .iter()
        .map(|conformer| {
            let points: Vec<Point3<f64>> = indices.iter().map(|&i| conformer[i]).collect();
            weighted_centroid(&points, weights)
        })
        .collect()
}

impl RotamerEnsemble {
    /// Places every rotamer of `library` onto `site` and collects the host environment.
    ///
    /// No energies are evaluated; call [`RotamerEnsemble::evaluate`] for that.
    #[instrument(skip_all, name = "rotamer_ensemble", fields(label, chain = %site.chain_id, residue = site.residue_number))]
    pub fn new<H: HostStructure + ?Sized>(
        label: &str,
        library: &RotamerLibrary,
        host: &H,
        site: &SiteSpecifier,
        config: EnsembleConfig,
    ) -> Result<Self, EngineError> {
        let mut ensemble = Self::place(label, library, host, site, config)?;
        ensemble.attach_environment(host, std::slice::from_ref(site))?;
        Ok(ensemble)
    }

    /// Places the rotamers without collecting an environment.
    pub(crate) fn place<H: HostStructure + ?Sized>(
        label: &str,
        library: &RotamerLibrary,
        host: &H,
        site: &SiteSpecifier,
        config: EnsembleConfig,
    ) -> Result<Self, EngineError> {
        let chain = site.chain_id.as_str();
        let residue = site.residue_number;
        let native = host
            .residue_name(chain, residue)
            .ok_or_else(|| EngineError::ResidueNotFound {
                chain: chain.to_string(),
                residue,
            })?
            .to_string();

        let position = |name: &str| {
            host.find_atom(chain, residue, name)
                .map(|i| host.atoms()[i].position)
                .ok_or_else(|| EngineError::AtomNotFound {
                    chain: chain.to_string(),
                    residue,
                    name: name.to_string(),
                })
        };
        let (n, ca, c) = (position("N")?, position("CA")?, position("C")?);

        // Library templates are numbered as residue 1.
        let conformers = library
            .internal_coords
            .iter()
            .map(|template| {
                let mut conformer = template.clone();
                conformer.shift_residue_numbers(residue - 1);
                conformer.set_chain_id(chain);
                conformer.place_at_site(&n, &ca, &c, config.alignment)?;
                Ok(conformer)
            })
            .collect::<Result<Vec<_>, InternalCoordError>>()?;

        debug!(
            native = %native,
            rotamers = conformers.len(),
            "Placed library rotamers on site."
        );
        let mut ensemble = Self::from_conformers(
            label,
            &native,
            site.clone(),
            library.dihedral_atoms.clone(),
            conformers,
            library.weights.clone(),
            config,
        )?;
        if !library.spin_atoms.is_empty() {
            ensemble.set_spin_atoms(&library.spin_atoms, &library.spin_weights)?;
        }
        Ok(ensemble)
    }

    /// Builds an ensemble from already placed conformers, without a host environment.
    pub fn from_conformers(
        label: &str,
        native: &str,
        site: SiteSpecifier,
        dihedral_atoms: Vec<[String; 4]>,
        mut conformers: Vec<InternalChain>,
        weights: Vec<f64>,
        config: EnsembleConfig,
    ) -> Result<Self, EngineError> {
        let first = conformers.first().ok_or(EngineError::EmptyEnsemble)?;
        if weights.len() != conformers.len() {
            return Err(EngineError::Configuration(format!(
                "{} weights for {} conformers",
                weights.len(),
                conformers.len()
            )));
        }
        let atom_names = first.atom_names();
        if conformers.iter().any(|c| c.atom_names() != atom_names) {
            return Err(EngineError::Configuration(
                "conformers do not share the same atom ordering".to_string(),
            ));
        }
        let atom_types = first.atom_types();
        let topology = first.topology().clone();
        let side_chain = atom_names
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_backbone_atom(name))
            .map(|(i, _)| i)
            .collect();
        let lj_params = config.steric.resolve(&atom_types)?;
        let weights = sampling::normalize(&weights)?;
        let coords = conformer_coords(&mut conformers);

        Ok(Self {
            label: label.to_string(),
            native: native.to_string(),
            site,
            dihedral_atoms,
            conformers,
            coords,
            weights,
            atom_names,
            atom_types,
            side_chain,
            spin_indices: Vec::new(),
            spin_weights: Vec::new(),
            topology,
            lj_params,
            environment: HostEnvironment::empty(),
            energies: None,
            partition: 1.0,
            config,
        })
    }

    /// Marks the spin-bearing atoms by name, with their spin densities.
    pub fn set_spin_atoms(&mut self, names: &[String], weights: &[f64]) -> Result<(), EngineError> {
        if names.is_empty() || names.len() != weights.len() {
            return Err(EngineError::Configuration(format!(
                "{} spin weights for {} spin atoms",
                weights.len(),
                names.len()
            )));
        }
        let indices = names
            .iter()
            .map(|name| {
                self.atom_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| EngineError::AtomNotFound {
                        chain: self.site.chain_id.clone(),
                        residue: self.site.residue_number,
                        name: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.spin_weights = sampling::normalize(weights)?;
        self.spin_indices = indices;
        Ok(())
    }

    /// Collects the host atoms around the clash origin, skipping the `excluded` residues.
    pub fn attach_environment<H: HostStructure + ?Sized>(
        &mut self,
        host: &H,
        excluded: &[SiteSpecifier],
    ) -> Result<(), EngineError> {
        let origin = self.clash_origin()?;
        self.environment = HostEnvironment::collect(
            host,
            &origin,
            self.config.clash_radius,
            excluded,
            self.config.exclude_water,
            &self.config.steric,
        )?;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Residue name of the host residue the ensemble replaces.
    pub fn native(&self) -> &str {
        &self.native
    }

    pub fn site(&self) -> &SiteSpecifier {
        &self.site
    }

    /// `<native><site><label>_<chain>`, e.g. `CYS28R1M_A`.
    pub fn name(&self) -> String {
        format!(
            "{}{}{}_{}",
            self.native, self.site.residue_number, self.label, self.site.chain_id
        )
    }

    pub fn len(&self) -> usize {
        self.conformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conformers.is_empty()
    }

    pub fn conformers(&self) -> &[InternalChain] {
        &self.conformers
    }

    pub fn coords(&self) -> &[Vec<Point3<f64>>] {
        &self.coords
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn atom_names(&self) -> &[String] {
        &self.atom_names
    }

    pub fn atom_types(&self) -> &[String] {
        &self.atom_types
    }

    /// Indices of the non-backbone atoms.
    pub fn side_chain_indices(&self) -> &[usize] {
        &self.side_chain
    }

    pub fn spin_indices(&self) -> &[usize] {
        &self.spin_indices
    }

    pub fn spin_weights(&self) -> &[f64] {
        &self.spin_weights
    }

    /// Spin-density weighted center of every conformer, or `None` without spin atoms.
    pub fn spin_coords(&self) -> Option<Vec<Point3<f64>>> {
        spin_centers(&self.coords, &self.spin_indices, &self.spin_weights)
    }

    /// Population-weighted mean of the per-conformer spin centers.
    pub fn spin_centroid(&self) -> Option<Point3<f64>> {
        weighted_centroid(&self.spin_coords()?, &self.weights)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn lj_params(&self) -> &[LjParam] {
        &self.lj_params
    }

    pub fn dihedral_atoms(&self) -> &[[String; 4]] {
        &self.dihedral_atoms
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    /// Energies from the last evaluation, aligned with the conformers.
    pub fn energies(&self) -> Option<&[ClashEnergy]> {
        self.energies.as_deref()
    }

    /// Fraction of the prior population retained by the last evaluation.
    pub fn partition(&self) -> f64 {
        self.partition
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Library dihedral values (radians) of every conformer.
    pub fn dihedrals(&self) -> Result<Vec<Vec<f64>>, EngineError> {
        self.conformers
            .iter()
            .map(|c| {
                c.get_dihedral(
                    self.site.residue_number,
                    &self.dihedral_atoms,
                    Some(&self.site.chain_id),
                )
                .map_err(EngineError::from)
            })
            .collect()
    }

    /// Mean position over every atom of every conformer.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        let all: Vec<Point3<f64>> = self.coords.iter().flatten().copied().collect();
        centroid(&all)
    }

    pub fn clash_origin(&self) -> Result<Point3<f64>, EngineError> {
        match &self.config.clash_origin {
            ClashOrigin::Centroid => self.centroid().ok_or(EngineError::EmptyEnsemble),
            ClashOrigin::Atom(name) => self
                .atom_names
                .iter()
                .position(|n| n == name)
                .and_then(|i| self.coords.first().map(|c| c[i]))
                .ok_or_else(|| EngineError::AtomNotFound {
                    chain: self.site.chain_id.clone(),
                    residue: self.site.residue_number,
                    name: name.clone(),
                }),
            ClashOrigin::Point(p) => Ok(*p),
        }
    }

    pub fn evaluate(&mut self) -> Result<(), EngineError> {
        self.evaluate_with_progress(&ProgressReporter::new())
    }

    /// Scores every conformer against itself and the host environment and reweights the
    /// populations by their Boltzmann factors.
    #[instrument(skip_all, name = "evaluate_ensemble", fields(name = %self.name()))]
    pub fn evaluate_with_progress(&mut self, reporter: &ProgressReporter) -> Result<(), EngineError> {
        if self.is_empty() {
            return Err(EngineError::EmptyEnsemble);
        }
        let model = ClashModel {
            params: &self.lj_params,
            internal_pairs: self.topology.non_bonded_pairs(),
            side_chain: &self.side_chain,
            environment: &self.environment,
            globals: &self.config.steric.globals,
        };
        let energies = clash_evaluation::run(&self.coords, &model, reporter)?;

        let totals: Vec<f64> = energies.iter().map(ClashEnergy::total).collect();
        let result = reweight(&totals, self.config.temperature, &self.weights)?;
        self.weights = result.weights;
        self.partition = result.partition;
        self.energies = Some(energies);

        info!(partition = self.partition, "Ensemble evaluated.");
        Ok(())
    }

    /// Drops low-population conformers according to the trim configuration and
    /// renormalizes the remaining weights.
    pub fn trim_rotamers(&mut self) -> Result<(), EngineError> {
        let before = self.len();
        let keep = trim_indices(&self.weights, &self.config.trim);
        self.retain(&keep)?;
        info!(
            kept = self.len(),
            removed = before - self.len(),
            "Trimmed ensemble."
        );
        Ok(())
    }

    /// Keeps only the conformers at `indices` (ascending), renormalizing the weights.
    pub(crate) fn retain(&mut self, indices: &[usize]) -> Result<(), EngineError> {
        if indices.is_empty() {
            return Err(EngineError::EmptyEnsemble);
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(EngineError::Internal(format!(
                "conformer index {bad} out of range for {} conformers",
                self.len()
            )));
        }
        let pick = |values: &[f64]| -> Vec<f64> { indices.iter().map(|&i| values[i]).collect() };

        let weights = sampling::normalize(&pick(&self.weights))?;
        self.conformers = indices.iter().map(|&i| self.conformers[i].clone()).collect();
        self.coords = indices.iter().map(|&i| self.coords[i].clone()).collect();
        self.energies = self
            .energies
            .as_ref()
            .map(|e| indices.iter().map(|&i| e[i]).collect());
        self.weights = weights;
        Ok(())
    }

    /// Replaces the population weights, normalizing them.
    pub(crate) fn set_weights(&mut self, weights: &[f64]) -> Result<(), EngineError> {
        if weights.len() != self.len() {
            return Err(EngineError::Internal(format!(
                "{} weights for {} conformers",
                weights.len(),
                self.len()
            )));
        }
        self.weights = sampling::normalize(weights)?;
        Ok(())
    }

    /// Mutable access to one conformer; its cached coordinates are refreshed by
    /// [`RotamerEnsemble::refresh_coords`].
    pub(crate) fn conformer_mut(&mut self, index: usize) -> Option<&mut InternalChain> {
        self.conformers.get_mut(index)
    }

    pub(crate) fn refresh_coords(&mut self) {
        self.coords = conformer_coords(&mut self.conformers);
    }

    /// Draws one conformer index according to the current weights.
    pub fn sample(&self, rng: &mut impl Rng) -> Result<usize, EngineError> {
        Ok(weighted_sample(&self.weights, rng)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::internal_atom::AtomIdentity;
    use crate::engine::config::EnsembleConfigBuilder;
    use crate::core::models::structure::Structure;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    pub(crate) fn serine_library() -> RotamerLibrary {
        let identities = vec![
            AtomIdentity::new("N", "N", 1, "SER", "A"),
            AtomIdentity::new("CA", "C", 1, "SER", "A"),
            AtomIdentity::new("C", "C", 1, "SER", "A"),
            AtomIdentity::new("O", "O", 1, "SER", "A"),
            AtomIdentity::new("CB", "C", 1, "SER", "A"),
            AtomIdentity::new("OG", "O", 1, "SER", "A"),
        ];
        let coords = vec![
            Point3::new(-1.0, 1.2, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.2, -0.9, 0.0),
            Point3::new(-2.3, -0.6, 0.4),
            Point3::new(1.2, -0.3, 0.6),
            Point3::new(2.3, 0.4, 0.1),
        ];
        let bonds = vec![(0, 1), (1, 2), (2, 3), (1, 4), (4, 5)];
        let chi = vec![[
            "N".to_string(),
            "CA".to_string(),
            "CB".to_string(),
            "OG".to_string(),
        ]];
        let template = InternalChain::from_cartesian(&identities, &coords, &bonds, &chi, 3).unwrap();

        let conformers = [-PI / 3.0, PI / 3.0, PI]
            .iter()
            .map(|&value| {
                let mut c = template.clone();
                c.set_dihedral(&[value], 1, &chi, None).unwrap();
                c
            })
            .collect();
        RotamerLibrary::from_internal_coords("SER", chi, conformers, vec![1.0, 1.0, 1.0]).unwrap()
    }

    /// Three-residue host stretch on chain A, with residue 2 as the labelling site.
    pub(crate) fn host_with_blocker(blocker: Option<Point3<f64>>) -> Structure {
        let mut identities = Vec::new();
        let mut positions = Vec::new();
        for (resi, offset) in [(1, -3.8), (2, 0.0), (3, 3.8)] {
            for (name, element, p) in [
                ("N", "N", Point3::new(-1.0, 1.2, 0.0)),
                ("CA", "C", Point3::new(0.0, 0.0, 0.0)),
                ("C", "C", Point3::new(-1.2, -0.9, 0.0)),
            ] {
                identities.push(AtomIdentity::new(name, element, resi, "ALA", "A"));
                positions.push(Point3::new(p.x, p.y, p.z + offset));
            }
        }
        if let Some(p) = blocker {
            identities.push(AtomIdentity::new("C1", "C", 99, "LIG", "B"));
            positions.push(p);
        }
        Structure::from_parts(identities, &positions)
    }

    fn site() -> SiteSpecifier {
        SiteSpecifier::new("A", 2)
    }

    #[test]
    fn new_places_rotamers_on_site_backbone() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let ensemble =
            RotamerEnsemble::new("SR", &library, &host, &site(), EnsembleConfig::default()).unwrap();

        assert_eq!(ensemble.len(), 3);
        assert_eq!(ensemble.name(), "ALA2SR_A");
        for coords in ensemble.coords() {
            assert!((coords[1] - Point3::origin()).norm() < 1e-6);
            assert!((coords[0] - Point3::new(-1.0, 1.2, 0.0)).norm() < 1e-6);
        }
        let dihedrals = ensemble.dihedrals().unwrap();
        assert!((dihedrals[1][0] - PI / 3.0).abs() < 1e-9);
        assert_eq!(ensemble.side_chain_indices(), &[4, 5]);
    }

    #[test]
    fn new_excludes_site_residue_from_environment() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let ensemble =
            RotamerEnsemble::new("SR", &library, &host, &site(), EnsembleConfig::default()).unwrap();
        let atoms = host.atoms();
        assert!(!ensemble.environment().is_empty());
        assert!(
            ensemble
                .environment()
                .host_indices()
                .iter()
                .all(|&i| atoms[i].identity.residue_id != 2)
        );
    }

    #[test]
    fn missing_site_is_reported() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let result = RotamerEnsemble::new(
            "SR",
            &library,
            &host,
            &SiteSpecifier::new("A", 40),
            EnsembleConfig::default(),
        );
        assert!(matches!(
            result,
            Err(EngineError::ResidueNotFound { residue: 40, .. })
        ));
    }

    #[test]
    fn evaluate_penalizes_clashing_rotamer_and_normalizes() {
        let library = serine_library();
        let clean = host_with_blocker(None);
        let reference =
            RotamerEnsemble::new("SR", &library, &clean, &site(), EnsembleConfig::default()).unwrap();
        let og = reference.coords()[2][5];

        // A soft contact radius keeps the other rotamers clear of the blocker.
        let config = EnsembleConfigBuilder::new().forgive(0.5).build().unwrap();
        let blocked = host_with_blocker(Some(og));
        let mut ensemble = RotamerEnsemble::new("SR", &library, &blocked, &site(), config).unwrap();
        ensemble.evaluate().unwrap();

        let weights = ensemble.weights();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(weights[2] < weights[0]);
        assert!(weights[2] < weights[1]);
        let energies = ensemble.energies().unwrap();
        assert!(energies[2].external > 0.0);
        assert!(ensemble.partition() < 1.0);
    }

    #[test]
    fn evaluate_removes_buried_rotamer_population() {
        let library = serine_library();
        let pair = RotamerLibrary::from_internal_coords(
            "SER",
            library.dihedral_atoms.clone(),
            vec![library.internal_coords[0].clone(), library.internal_coords[2].clone()],
            vec![0.5, 0.5],
        )
        .unwrap();
        let reference =
            RotamerEnsemble::new("SR", &pair, &host_with_blocker(None), &site(), EnsembleConfig::default())
                .unwrap();
        let (cb, og) = (reference.coords()[1][4], reference.coords()[1][5]);
        let blocker = og + (og - cb).normalize() * 0.5;

        let config = EnsembleConfigBuilder::new()
            .forgive(0.5)
            .energy_cap(100.0)
            .build()
            .unwrap();
        let host = host_with_blocker(Some(blocker));
        let mut ensemble = RotamerEnsemble::new("SR", &pair, &host, &site(), config).unwrap();
        ensemble.evaluate().unwrap();

        let energies = ensemble.energies().unwrap();
        assert_eq!(energies[0].total(), 0.0);
        assert!((energies[1].external - 100.0).abs() < 1e-9);
        assert!((ensemble.weights()[0] - 1.0).abs() < 1e-12);
        assert!(ensemble.weights()[1] < 1e-12);
        assert!((ensemble.partition() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn spin_centers_follow_spin_atoms_and_weights() {
        let library = serine_library()
            .with_spin_atoms(vec!["CB".to_string(), "OG".to_string()], None)
            .unwrap();
        let host = host_with_blocker(None);
        let mut ensemble =
            RotamerEnsemble::new("SR", &library, &host, &site(), EnsembleConfig::default()).unwrap();
        assert_eq!(ensemble.spin_indices(), &[4, 5]);

        let spin = ensemble.spin_coords().unwrap();
        assert_eq!(spin.len(), 3);
        for (center, coords) in spin.iter().zip(ensemble.coords()) {
            let midpoint = Point3::from((coords[4].coords + coords[5].coords) / 2.0);
            assert!((center - midpoint).norm() < 1e-9);
        }

        ensemble.set_weights(&[0.0, 1.0, 0.0]).unwrap();
        let centroid = ensemble.spin_centroid().unwrap();
        assert!((centroid - spin[1]).norm() < 1e-9);
    }

    #[test]
    fn spin_centers_need_spin_atoms() {
        let host = host_with_blocker(None);
        let mut ensemble =
            RotamerEnsemble::new("SR", &serine_library(), &host, &site(), EnsembleConfig::default())
                .unwrap();
        assert!(ensemble.spin_coords().is_none());
        assert!(ensemble.spin_centroid().is_none());

        let result = ensemble.set_spin_atoms(&["NX".to_string()], &[1.0]);
        assert!(matches!(result, Err(EngineError::AtomNotFound { .. })));
    }

    #[test]
    fn trim_rotamers_keeps_order_and_renormalizes() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let mut ensemble =
            RotamerEnsemble::new("SR", &library, &host, &site(), EnsembleConfig::default()).unwrap();
        ensemble.set_weights(&[0.6, 0.001, 0.399]).unwrap();
        let kept_coords = [ensemble.coords()[0].clone(), ensemble.coords()[2].clone()];

        ensemble.trim_rotamers().unwrap();
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.coords(), &kept_coords);
        assert!((ensemble.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((ensemble.weights()[0] - 0.6 / 0.999).abs() < 1e-12);
    }

    #[test]
    fn clash_origin_options() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let config = EnsembleConfig {
            clash_origin: ClashOrigin::Atom("CA".to_string()),
            ..EnsembleConfig::default()
        };
        let ensemble = RotamerEnsemble::new("SR", &library, &host, &site(), config).unwrap();
        assert!((ensemble.clash_origin().unwrap() - Point3::origin()).norm() < 1e-6);

        let config = EnsembleConfig {
            clash_origin: ClashOrigin::Atom("ZZ".to_string()),
            ..EnsembleConfig::default()
        };
        let result = RotamerEnsemble::new("SR", &library, &host, &site(), config);
        assert!(matches!(result, Err(EngineError::AtomNotFound { .. })));
    }

    #[test]
    fn sample_follows_weights() {
        let library = serine_library();
        let host = host_with_blocker(None);
        let mut ensemble =
            RotamerEnsemble::new("SR", &library, &host, &site(), EnsembleConfig::default()).unwrap();
        ensemble.set_weights(&[0.0, 1.0, 0.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(ensemble.sample(&mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn from_conformers_rejects_empty_and_mismatched_input() {
        let library = serine_library();
        let result = RotamerEnsemble::from_conformers(
            "SR",
            "SER",
            site(),
            library.dihedral_atoms.clone(),
            Vec::new(),
            Vec::new(),
            EnsembleConfig::default(),
        );
        assert!(matches!(result, Err(EngineError::EmptyEnsemble)));

        let result = RotamerEnsemble::from_conformers(
            "SR",
            "SER",
            site(),
            library.dihedral_atoms.clone(),
            library.internal_coords.clone(),
            vec![1.0],
            EnsembleConfig::default(),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
