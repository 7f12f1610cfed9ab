use super::clash_evaluation::ClashModel;
use crate::core::models::internal_chain::{DihedralHandle, InternalChain};
use crate::core::utils::geometry::{distance, wrap_angle};
use crate::engine::bridging::FusedLayout;
use crate::engine::config::MinimizerConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{MinimizationObserver, Progress, ProgressReporter};
use crate::engine::utils::minimize::{MinimizationResult, minimize_bounded};
use nalgebra::Point3;
use std::f64::consts::PI;
use tracing::{info, instrument, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Shared description of the restrained dihedral search for every conformer pair.
pub struct BridgeProblem<'a> {
    pub first_handles: &'a [DihedralHandle],
    pub second_handles: &'a [DihedralHandle],
    pub layout: &'a FusedLayout,
    /// Bridge atom pairs as `(index in first, index in second)`.
    pub bridge_pairs: &'a [(usize, usize)],
    pub restraint_weight: f64,
    pub displacement_penalty: f64,
    /// Steric model over the fused atom set.
    pub clash: ClashModel<'a>,
    pub minimize: bool,
    pub minimizer: &'a MinimizerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOutcome {
    pub first_dihedrals: Vec<f64>,
    pub second_dihedrals: Vec<f64>,
    /// Restraint plus steric energy at the final dihedrals.
    pub objective: f64,
    /// Objective plus the dihedral displacement penalty.
    pub score: f64,
    /// Root-mean-square deviation of the bridge distances from their targets, in Angstrom.
    pub closure_error: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Mean squared deviation of the bridge distances from their targets.
pub fn bridge_error(
    first: &[Point3<f64>],
    second: &[Point3<f64>],
    pairs: &[(usize, usize)],
    targets: &[f64],
) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let sum: f64 = pairs
        .iter()
        .enumerate()
        .map(|(p, &(a, b))| {
            let target = targets.get(p).copied().unwrap_or(0.0);
            (distance(&first[a], &second[b]) - target).powi(2)
        })
        .sum();
    sum / pairs.len() as f64
}

/// Runs the bounded minimizer over a fallible objective.
///
/// A failing evaluation is treated as an infinitely bad point so the search can continue,
/// but the first failure is returned once the search ends.
fn search<F>(
    mut objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &MinimizerConfig,
    observer: Option<&dyn MinimizationObserver>,
) -> Result<MinimizationResult, EngineError>
where
    F: FnMut(&[f64]) -> Result<f64, EngineError>,
{
    let mut failure: Option<EngineError> = None;
    let result = minimize_bounded(
        |x: &[f64]| match objective(x) {
            Ok(value) => value,
            Err(e) => {
                if failure.is_none() {
                    warn!(error = %e, "Bridge objective failed during minimization.");
                    failure = Some(e);
                }
                f64::INFINITY
            }
        },
        x0,
        bounds,
        config,
        observer,
    );
    match failure {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

impl BridgeProblem<'_> {
    /// Applies `x` to both chains and returns `(objective, closure error)`.
    fn objective(
        &self,
        x: &[f64],
        targets: &[f64],
        first: &mut InternalChain,
        second: &mut InternalChain,
    ) -> Result<(f64, f64), EngineError> {
        let split = self.first_handles.len();
        first.set_resolved_dihedrals(self.first_handles, &x[..split])?;
        second.set_resolved_dihedrals(self.second_handles, &x[split..])?;

        let a = first.to_cartesian();
        let b = second.to_cartesian();
        let restraint = bridge_error(&a, &b, self.bridge_pairs, targets);
        let steric = self.clash.energy(&self.layout.fuse(&a, &b))?.total();
        Ok((self.restraint_weight * restraint + steric, restraint.sqrt()))
    }

    fn solve(
        &self,
        first: &InternalChain,
        second: &InternalChain,
        targets: &[f64],
        observer: Option<&dyn MinimizationObserver>,
    ) -> Result<BridgeOutcome, EngineError> {
        let mut a = first.clone();
        let mut b = second.clone();
        let x0: Vec<f64> = a
            .resolved_dihedrals(self.first_handles)
            .into_iter()
            .chain(b.resolved_dihedrals(self.second_handles))
            .map(wrap_angle)
            .collect();

        let (initial, _) = self.objective(&x0, targets, &mut a, &mut b)?;
        let result = if self.minimize {
            let bounds = vec![(-PI, PI); x0.len()];
            search(
                |x: &[f64]| self.objective(x, targets, &mut a, &mut b).map(|(f, _)| f),
                &x0,
                &bounds,
                self.minimizer,
                observer,
            )?
        } else {
            MinimizationResult {
                x: x0.clone(),
                value: initial,
                iterations: 0,
                converged: true,
            }
        };

        let (objective, closure_error) = self.objective(&result.x, targets, &mut a, &mut b)?;
        let displacement: f64 = result
            .x
            .iter()
            .zip(&x0)
            .map(|(x, x0)| wrap_angle(x - x0).abs())
            .sum();
        trace!(
            initial,
            objective,
            closure_error,
            iterations = result.iterations,
            "Bridge conformer minimized."
        );

        let split = self.first_handles.len();
        Ok(BridgeOutcome {
            first_dihedrals: result.x[..split].to_vec(),
            second_dihedrals: result.x[split..].to_vec(),
            objective,
            score: objective + self.displacement_penalty * displacement,
            closure_error,
            iterations: result.iterations,
            converged: result.converged,
        })
    }
}

#[instrument(skip_all, name = "bridge_minimization_task")]
pub fn run(
    first: &[InternalChain],
    second: &[InternalChain],
    targets: &[Vec<f64>],
    problem: &BridgeProblem,
    observer: Option<&dyn MinimizationObserver>,
    reporter: &ProgressReporter,
) -> Result<Vec<BridgeOutcome>, EngineError> {
    if first.len() != second.len() || first.len() != targets.len() {
        return Err(EngineError::Configuration(format!(
            "bridge halves have {} and {} conformers with {} target rows",
            first.len(),
            second.len(),
            targets.len()
        )));
    }
    info!(
        conformers = first.len(),
        dihedrals = problem.first_handles.len() + problem.second_handles.len(),
        minimize = problem.minimize,
        "Closing bridges."
    );

    reporter.report(Progress::TaskStart {
        total_steps: first.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..first.len();

    #[cfg(feature = "parallel")]
    let iterator = (0..first.len()).into_par_iter();

    let outcomes = iterator
        .map(|i| {
            let outcome = problem.solve(&first[i], &second[i], &targets[i], observer);
            reporter.report(Progress::TaskIncrement);
            outcome
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    reporter.report(Progress::TaskFinish);
    Ok(outcomes)
}
