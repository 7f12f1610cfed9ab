use super::params::{LjParam, StericGlobals};
use super::potentials::{combine_lj, lennard_jones_repulsive};
use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ScoringError {
    #[error("Expected {expected} steric parameters but found {found}")]
    ParameterCountMismatch { expected: usize, found: usize },
    #[error("Atom index {index} is out of range for {len} atoms")]
    AtomIndexOutOfRange { index: usize, len: usize },
}

/// Steric clash energy of one conformer, split into its two sources.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ClashEnergy {
    /// Repulsion between non-bonded atoms of the conformer itself.
    pub internal: f64,
    /// Repulsion between the conformer's side-chain atoms and the host environment.
    pub external: f64,
}

impl ClashEnergy {
    pub fn total(&self) -> f64 {
        self.internal + self.external
    }
}

/// Scores repulsive Lennard-Jones contacts with a shared set of global settings.
pub struct Scorer<'a> {
    globals: &'a StericGlobals,
}

impl<'a> Scorer<'a> {
    pub fn new(globals: &'a StericGlobals) -> Self {
        Self { globals }
    }

    #[inline]
    pub fn pair_energy(&self, a: &Point3<f64>, b: &Point3<f64>, pa: &LjParam, pb: &LjParam) -> f64 {
        let (r_min, eps) = combine_lj(
            pa.rmin_half,
            pb.rmin_half,
            pa.epsilon,
            pb.epsilon,
            self.globals.forgive,
        );
        let dist_sq = (a - b).norm_squared();
        if dist_sq >= r_min * r_min {
            return 0.0;
        }
        lennard_jones_repulsive(dist_sq.sqrt(), r_min, eps, self.globals.cap)
    }

    /// Sums the pair energy over the given index pairs of one coordinate set.
    pub fn score_pairs(
        &self,
        coords: &[Point3<f64>],
        params: &[LjParam],
        pairs: &[(usize, usize)],
    ) -> Result<f64, ScoringError> {
        if coords.len() != params.len() {
            return Err(ScoringError::ParameterCountMismatch {
                expected: coords.len(),
                found: params.len(),
            });
        }
        let mut energy = 0.0;
        for &(i, j) in pairs {
            let len = coords.len();
            if i >= len || j >= len {
                return Err(ScoringError::AtomIndexOutOfRange {
                    index: i.max(j),
                    len,
                });
            }
            energy += self.pair_energy(&coords[i], &coords[j], &params[i], &params[j]);
        }
        Ok(energy)
    }

    /// Sums the pair energy between the `query` atoms of `coords` and every environment atom.
    pub fn score_against(
        &self,
        coords: &[Point3<f64>],
        params: &[LjParam],
        query: &[usize],
        environment: &[Point3<f64>],
        environment_params: &[LjParam],
    ) -> Result<f64, ScoringError> {
        if coords.len() != params.len() {
            return Err(ScoringError::ParameterCountMismatch {
                expected: coords.len(),
                found: params.len(),
            });
        }
        if environment.len() != environment_params.len() {
            return Err(ScoringError::ParameterCountMismatch {
                expected: environment.len(),
                found: environment_params.len(),
            });
        }

        let mut energy = 0.0;
        for &i in query {
            let p = coords.get(i).ok_or(ScoringError::AtomIndexOutOfRange {
                index: i,
                len: coords.len(),
            })?;
            for (env, env_param) in environment.iter().zip(environment_params) {
                energy += self.pair_energy(p, env, &params[i], env_param);
            }
        }
        Ok(energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn carbon() -> LjParam {
        LjParam {
            rmin_half: 2.0,
            epsilon: 0.1,
        }
    }

    #[test]
    fn pair_energy_is_zero_beyond_contact_distance() {
        let globals = StericGlobals::default();
        let scorer = Scorer::new(&globals);
        let e = scorer.pair_energy(
            &Point3::origin(),
            &Point3::new(4.5, 0.0, 0.0),
            &carbon(),
            &carbon(),
        );
        assert_eq!(e, 0.0);
    }

    #[test]
    fn forgive_factor_softens_contacts() {
        let strict = StericGlobals::default();
        let soft = StericGlobals {
            forgive: 0.8,
            ..StericGlobals::default()
        };
        let a = Point3::origin();
        let b = Point3::new(3.5, 0.0, 0.0);
        let e_strict = Scorer::new(&strict).pair_energy(&a, &b, &carbon(), &carbon());
        let e_soft = Scorer::new(&soft).pair_energy(&a, &b, &carbon(), &carbon());
        assert!(e_strict > 0.0);
        assert_eq!(e_soft, 0.0);
    }

    #[test]
    fn score_pairs_only_counts_listed_pairs() {
        let globals = StericGlobals::default();
        let scorer = Scorer::new(&globals);
        let coords = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ];
        let params = vec![carbon(); 3];

        let none = scorer.score_pairs(&coords, &params, &[(0, 2), (1, 2)]).unwrap();
        assert_eq!(none, 0.0);

        let capped = scorer.score_pairs(&coords, &params, &[(0, 1)]).unwrap();
        assert!((capped - globals.cap).abs() < TOLERANCE);
    }

    #[test]
    fn score_pairs_rejects_bad_indices_and_parameter_counts() {
        let globals = StericGlobals::default();
        let scorer = Scorer::new(&globals);
        let coords = vec![Point3::origin(); 2];
        assert_eq!(
            scorer.score_pairs(&coords, &[carbon()], &[]),
            Err(ScoringError::ParameterCountMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            scorer.score_pairs(&coords, &[carbon(); 2], &[(0, 5)]),
            Err(ScoringError::AtomIndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn score_against_sums_over_environment_for_query_atoms_only() {
        let globals = StericGlobals::default();
        let scorer = Scorer::new(&globals);
        let coords = vec![Point3::origin(), Point3::new(20.0, 0.0, 0.0)];
        // Inside 2^(-1/6) r_min, where the clipped 12-6 term turns positive.
        let environment = vec![Point3::new(3.4, 0.0, 0.0), Point3::new(20.0, 3.4, 0.0)];
        let params = vec![carbon(); 2];

        let only_first = scorer
            .score_against(&coords, &params, &[0], &environment, &params)
            .unwrap();
        let both = scorer
            .score_against(&coords, &params, &[0, 1], &environment, &params)
            .unwrap();
        assert!(only_first > 0.0);
        assert!((both - 2.0 * only_first).abs() < TOLERANCE);
    }

    #[test]
    fn clash_energy_total_adds_components() {
        let energy = ClashEnergy {
            internal: 1.5,
            external: 2.0,
        };
        assert_eq!(energy.total(), 3.5);
    }
}
