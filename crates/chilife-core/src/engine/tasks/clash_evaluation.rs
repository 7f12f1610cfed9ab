use crate::core::forcefield::params::{LjParam, StericGlobals};
use crate::core::forcefield::scoring::{ClashEnergy, Scorer, ScoringError};
use crate::engine::environment::HostEnvironment;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::Point3;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything needed to score one conformer's coordinates; shared read-only by all conformers.
#[derive(Clone, Copy)]
pub struct ClashModel<'a> {
    pub params: &'a [LjParam],
    pub internal_pairs: &'a [(usize, usize)],
    /// Atoms scored against the host environment.
    pub side_chain: &'a [usize],
    pub environment: &'a HostEnvironment,
    pub globals: &'a StericGlobals,
}

impl ClashModel<'_> {
    pub fn energy(&self, coords: &[Point3<f64>]) -> Result<ClashEnergy, ScoringError> {
        let scorer = Scorer::new(self.globals);
        let internal = scorer.score_pairs(coords, self.params, self.internal_pairs)?;
        let external = scorer.score_against(
            coords,
            self.params,
            self.side_chain,
            self.environment.positions(),
            self.environment.params(),
        )?;
        Ok(ClashEnergy { internal, external })
    }
}

#[instrument(skip_all, name = "clash_evaluation_task")]
pub fn run(
    conformers: &[Vec<Point3<f64>>],
    model: &ClashModel,
    reporter: &ProgressReporter,
) -> Result<Vec<ClashEnergy>, EngineError> {
    info!(
        conformers = conformers.len(),
        environment_atoms = model.environment.len(),
        "Evaluating clash energies."
    );
    if conformers.is_empty() {
        return Ok(Vec::new());
    }

    reporter.report(Progress::TaskStart {
        total_steps: conformers.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = conformers.iter();

    #[cfg(feature = "parallel")]
    let iterator = conformers.par_iter();

    let energies = iterator
        .map(|coords| {
            let energy = model.energy(coords);
            reporter.report(Progress::TaskIncrement);
            energy
        })
        .collect::<Result<Vec<_>, ScoringError>>()?;

    reporter.report(Progress::TaskFinish);

    let lowest = energies
        .iter()
        .map(ClashEnergy::total)
        .fold(f64::INFINITY, f64::min);
    debug!(lowest, "Clash evaluation complete.");

    Ok(energies)
}
