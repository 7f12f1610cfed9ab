use crate::core::forcefield::params::{LjParam, StericParams};
use crate::core::models::structure::HostStructure;
use crate::core::utils::identifiers::is_water;
use crate::engine::config::SiteSpecifier;
use crate::engine::error::EngineError;
use nalgebra::Point3;
use tracing::debug;

/// Snapshot of the host atoms that can clash with an ensemble.
///
/// Positions and steric parameters are copied out of the host once, so evaluation never
/// touches the host again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostEnvironment {
    host_indices: Vec<usize>,
    positions: Vec<Point3<f64>>,
    params: Vec<LjParam>,
}

impl HostEnvironment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collects host atoms within `radius` of `origin`, skipping the atoms of the
    /// `excluded` residues and, optionally, solvent.
    pub fn collect<H: HostStructure + ?Sized>(
        host: &H,
        origin: &Point3<f64>,
        radius: f64,
        excluded: &[SiteSpecifier],
        exclude_water: bool,
        steric: &StericParams,
    ) -> Result<Self, EngineError> {
        let atoms = host.atoms();
        let host_indices: Vec<usize> = host
            .atoms_within(origin, radius)
            .into_iter()
            .filter(|&i| {
                let identity = &atoms[i].identity;
                let in_site = excluded.iter().any(|site| {
                    site.chain_id == identity.chain_id && site.residue_number == identity.residue_id
                });
                let solvent = exclude_water && is_water(&identity.residue_name, &identity.name);
                !in_site && !solvent
            })
            .collect();

        let atom_types: Vec<String> = host_indices
            .iter()
            .map(|&i| atoms[i].identity.atom_type.clone())
            .collect();
        let params = steric.resolve(&atom_types)?;
        let positions = host_indices.iter().map(|&i| atoms[i].position).collect();

        debug!(
            atoms = host_indices.len(),
            radius, "Collected host environment."
        );
        Ok(Self {
            host_indices,
            positions,
            params,
        })
    }

    /// Indices of the collected atoms in the host.
    pub fn host_indices(&self) -> &[usize] {
        &self.host_indices
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn params(&self) -> &[LjParam] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::internal_atom::AtomIdentity;
    use crate::core::models::structure::Structure;

    fn host() -> Structure {
        let identities = vec![
            AtomIdentity::new("CA", "C", 10, "ALA", "A"),
            AtomIdentity::new("CB", "C", 10, "ALA", "A"),
            AtomIdentity::new("CA", "C", 11, "GLY", "A"),
            AtomIdentity::new("OH2", "O", 500, "HOH", "W"),
            AtomIdentity::new("CA", "C", 10, "ALA", "B"),
            AtomIdentity::new("CA", "C", 12, "LEU", "A"),
        ];
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(3.8, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
            Point3::new(0.0, 0.0, 4.0),
            Point3::new(30.0, 0.0, 0.0),
        ];
        Structure::from_parts(identities, &positions)
    }

    #[test]
    fn collect_excludes_site_residue_and_water() {
        let env = HostEnvironment::collect(
            &host(),
            &Point3::origin(),
            10.0,
            &[SiteSpecifier::new("A", 10)],
            true,
            &StericParams::uff(),
        )
        .unwrap();
        assert_eq!(env.host_indices(), &[2, 4]);
        assert_eq!(env.positions()[0], Point3::new(3.8, 0.0, 0.0));
        assert_eq!(env.params().len(), 2);
    }

    #[test]
    fn collect_keeps_water_when_requested() {
        let env = HostEnvironment::collect(
            &host(),
            &Point3::origin(),
            10.0,
            &[],
            false,
            &StericParams::uff(),
        )
        .unwrap();
        assert_eq!(env.host_indices(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn collect_reports_unknown_host_atom_types() {
        let structure = Structure::from_parts(
            vec![AtomIdentity::new("X1", "Qq", 1, "UNK", "A")],
            &[Point3::origin()],
        );
        let result = HostEnvironment::collect(
            &structure,
            &Point3::origin(),
            5.0,
            &[],
            true,
            &StericParams::uff(),
        );
        assert!(matches!(result, Err(EngineError::Parameters { .. })));
    }

    #[test]
    fn empty_environment_has_no_atoms() {
        let env = HostEnvironment::empty();
        assert!(env.is_empty());
        assert_eq!(env.len(), 0);
    }
}
