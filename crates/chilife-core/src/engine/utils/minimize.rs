use crate::engine::config::MinimizerConfig;
use crate::engine::progress::MinimizationObserver;
use std::collections::VecDeque;
use tracing::trace;

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;
const CURVATURE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizationResult {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct CorrectionPair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn bound(bounds: &[(f64, f64)], i: usize) -> (f64, f64) {
    bounds
        .get(i)
        .copied()
        .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
}

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (i, v) in x.iter_mut().enumerate() {
        let (lo, hi) = bound(bounds, i);
        *v = v.clamp(lo, hi);
    }
}

/// Finite-difference gradient; the step is clamped to the box.
fn gradient<F: FnMut(&[f64]) -> f64>(
    objective: &mut F,
    x: &[f64],
    bounds: &[(f64, f64)],
    step: f64,
) -> Vec<f64> {
    let mut shifted = x.to_vec();
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        let (lo, hi) = bound(bounds, i);
        let up = (x[i] + step).min(hi);
        let down = (x[i] - step).max(lo);
        let width = up - down;
        if width <= 0.0 {
            continue;
        }
        shifted[i] = up;
        let f_up = objective(&shifted);
        shifted[i] = down;
        let f_down = objective(&shifted);
        shifted[i] = x[i];
        grad[i] = (f_up - f_down) / width;
    }
    grad
}

/// Infinity norm of the projected gradient step `P(x - g) - x`.
fn projected_gradient_norm(x: &[f64], grad: &[f64], bounds: &[(f64, f64)]) -> f64 {
    x.iter()
        .zip(grad)
        .enumerate()
        .map(|(i, (&xi, &gi))| {
            let (lo, hi) = bound(bounds, i);
            ((xi - gi).clamp(lo, hi) - xi).abs()
        })
        .fold(0.0, f64::max)
}

/// Zeroes direction components that would leave the box from an active bound.
fn mask_active(direction: &mut [f64], x: &[f64], bounds: &[(f64, f64)]) {
    for (i, d) in direction.iter_mut().enumerate() {
        let (lo, hi) = bound(bounds, i);
        if (x[i] <= lo && *d < 0.0) || (x[i] >= hi && *d > 0.0) {
            *d = 0.0;
        }
    }
}

fn two_loop_direction(grad: &[f64], history: &VecDeque<CorrectionPair>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for pair in history.iter().rev() {
        let a = pair.rho * dot(&pair.s, &q);
        for (qi, yi) in q.iter_mut().zip(&pair.y) {
            *qi -= a * yi;
        }
        alphas.push(a);
    }

    if let Some(last) = history.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        q.iter_mut().for_each(|v| *v *= gamma);
    }

    for (pair, a) in history.iter().zip(alphas.iter().rev()) {
        let b = pair.rho * dot(&pair.y, &q);
        for (qi, si) in q.iter_mut().zip(&pair.s) {
            *qi += si * (a - b);
        }
    }
    q.iter_mut().for_each(|v| *v = -*v);
    q
}

/// Minimizes `objective` inside the box `bounds` with a projected L-BFGS iteration
/// driven by finite-difference gradients.
///
/// Missing bounds are treated as unbounded. The observer, when given, sees the
/// objective value after each accepted step.
pub fn minimize_bounded<F: FnMut(&[f64]) -> f64>(
    mut objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &MinimizerConfig,
    observer: Option<&dyn MinimizationObserver>,
) -> MinimizationResult {
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let mut value = objective(&x);
    if x.is_empty() {
        return MinimizationResult {
            x,
            value,
            iterations: 0,
            converged: true,
        };
    }

    let step = config.finite_difference_step;
    let mut grad = gradient(&mut objective, &x, bounds, step);
    let mut history: VecDeque<CorrectionPair> = VecDeque::with_capacity(config.history_size);
    let mut converged = projected_gradient_norm(&x, &grad, bounds) < config.gradient_tolerance;
    let mut iterations = 0;

    while !converged && iterations < config.max_iterations {
        let mut direction = two_loop_direction(&grad, &history);
        mask_active(&mut direction, &x, bounds);
        if dot(&direction, &grad) >= 0.0 {
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            mask_active(&mut direction, &x, bounds);
            if dot(&direction, &grad) >= 0.0 {
                converged = true;
                break;
            }
        }

        let mut alpha = if history.is_empty() {
            let norm = dot(&direction, &direction).sqrt();
            (1.0 / norm).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            project(&mut candidate, bounds);
            let f_candidate = objective(&candidate);
            let decrease: f64 = grad
                .iter()
                .zip(candidate.iter().zip(&x))
                .map(|(g, (c, xi))| g * (c - xi))
                .sum();
            if f_candidate.is_finite() && f_candidate <= value + ARMIJO_C1 * decrease.min(0.0) {
                accepted = Some((candidate, f_candidate));
                break;
            }
            alpha *= 0.5;
        }

        let Some((x_new, value_new)) = accepted else {
            trace!(iterations, value, "Line search failed to find a decrease.");
            break;
        };
        iterations += 1;

        let grad_new = gradient(&mut objective, &x_new, bounds, step);
        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = grad_new.iter().zip(&grad).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > CURVATURE_EPSILON {
            if history.len() == config.history_size {
                history.pop_front();
            }
            history.push_back(CorrectionPair { s, y, rho: 1.0 / sy });
        }

        let change = (value - value_new).abs();
        x = x_new;
        grad = grad_new;
        value = value_new;

        if let Some(observer) = observer {
            observer.on_iteration(value, iterations);
        }

        converged = change <= config.function_tolerance * value.abs().max(1.0)
            || projected_gradient_norm(&x, &grad, bounds) < config.gradient_tolerance;
    }

    MinimizationResult {
        x,
        value,
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn config() -> MinimizerConfig {
        MinimizerConfig::default()
    }

    #[test]
    fn minimizes_unbounded_quadratic() {
        let f = |x: &[f64]| (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2);
        let result = minimize_bounded(f, &[0.0, 0.0], &[], &config(), None);
        assert!(result.converged);
        assert!((result.x[0] - 1.0).abs() < 1e-4);
        assert!((result.x[1] + 2.0).abs() < 1e-4);
        assert!(result.value < 1e-7);
    }

    #[test]
    fn stops_at_active_bound() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2);
        let result = minimize_bounded(f, &[0.0], &[(-1.0, 2.0)], &config(), None);
        assert!((result.x[0] - 2.0).abs() < 1e-9);
        assert!((result.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn start_outside_box_is_projected() {
        let f = |x: &[f64]| x[0].powi(2);
        let result = minimize_bounded(f, &[10.0], &[(-1.0, 1.0)], &config(), None);
        assert!(result.x[0].abs() <= 1.0);
        assert!(result.value < 1e-6);
    }

    #[test]
    fn observer_sees_non_increasing_objective() {
        let values = Mutex::new(Vec::new());
        let observer = |objective: f64, iteration: usize| {
            values.lock().unwrap().push((iteration, objective));
        };
        let f = |x: &[f64]| (x[0] - 0.5).powi(2) + (x[0] * x[1] - 1.0).powi(2);
        minimize_bounded(f, &[2.0, 2.0], &[(-3.0, 3.0), (-3.0, 3.0)], &config(), Some(&observer));

        let values = values.into_inner().unwrap();
        assert!(!values.is_empty());
        for (k, window) in values.windows(2).enumerate() {
            assert_eq!(window[0].0, k + 1);
            assert!(window[1].1 <= window[0].1 + 1e-12);
        }
    }

    #[test]
    fn respects_iteration_budget() {
        let limited = MinimizerConfig {
            max_iterations: 2,
            ..MinimizerConfig::default()
        };
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let result = minimize_bounded(f, &[-1.2, 1.0], &[], &limited, None);
        assert!(result.iterations <= 2);
        assert!(!result.converged);
    }

    #[test]
    fn empty_problem_is_trivially_converged() {
        let result = minimize_bounded(|_: &[f64]| 4.0, &[], &[], &config(), None);
        assert!(result.converged);
        assert_eq!(result.value, 4.0);
    }
}
