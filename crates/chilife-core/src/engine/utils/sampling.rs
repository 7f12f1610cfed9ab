use crate::core::forcefield::potentials::GAS_CONSTANT;
use crate::engine::config::TrimConfig;
use itertools::Itertools;
use rand::{distributions::WeightedIndex, prelude::*};
use thiserror::Error;
use tracing::{instrument, trace};

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Input energies list is empty, cannot compute populations")]
    EmptyEnergies,
    #[error("Got {energies} energies but {weights} prior weights")]
    LengthMismatch { energies: usize, weights: usize },
    #[error("Invalid temperature value: {0}. Temperature must be positive")]
    InvalidTemperature(f64),
    #[error("Energy of conformer {0} is not a finite number")]
    NonFiniteEnergy(usize),
    #[error("Prior weights sum to zero, resulting in zero total population")]
    ZeroTotalWeight,
    #[error("Failed to create weighted distribution: {source}")]
    DistributionError {
        #[from]
        source: rand::distributions::WeightedError,
    },
}

/// Populations after Boltzmann reweighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Reweighted {
    /// Normalized weights, one per conformer.
    pub weights: Vec<f64>,
    /// Fraction of the prior population retained, `sum(p_i exp(-E_i/kT)) / sum(p_i)`.
    pub partition: f64,
}

fn validate(energies: &[f64], temperature: f64) -> Result<f64, SamplingError> {
    if energies.is_empty() {
        return Err(SamplingError::EmptyEnergies);
    }
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(SamplingError::InvalidTemperature(temperature));
    }
    if let Some(bad) = energies.iter().position(|e| !e.is_finite()) {
        return Err(SamplingError::NonFiniteEnergy(bad));
    }
    Ok(energies.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Boltzmann factors `exp(-(E_i - E_min)/kT)`; the lowest energy maps to exactly 1.
pub fn boltzmann_factors(energies: &[f64], temperature: f64) -> Result<Vec<f64>, SamplingError> {
    let min_energy = validate(energies, temperature)?;
    let kt = GAS_CONSTANT * temperature;
    Ok(energies
        .iter()
        .map(|&e| (-(e - min_energy) / kt).exp())
        .collect())
}

/// Rescales `weights` to sum to one.
pub fn normalize(weights: &[f64]) -> Result<Vec<f64>, SamplingError> {
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(SamplingError::ZeroTotalWeight);
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

#[instrument(level = "trace", skip_all, fields(temperature))]
pub fn reweight(
    energies: &[f64],
    temperature: f64,
    prior: &[f64],
) -> Result<Reweighted, SamplingError> {
    if energies.len() != prior.len() {
        return Err(SamplingError::LengthMismatch {
            energies: energies.len(),
            weights: prior.len(),
        });
    }
    validate(energies, temperature)?;
    let prior_total: f64 = prior.iter().sum();
    if !(prior_total > 0.0) {
        return Err(SamplingError::ZeroTotalWeight);
    }

    // Conformers without prior population cannot set the reference energy.
    let min_energy = energies
        .iter()
        .zip(prior)
        .filter(|&(_, &p)| p > 0.0)
        .map(|(&e, _)| e)
        .fold(f64::INFINITY, f64::min);
    let kt = GAS_CONSTANT * temperature;
    let unnormalized: Vec<f64> = energies
        .iter()
        .zip(prior)
        .map(|(&e, &p)| if p > 0.0 { p * (-(e - min_energy) / kt).exp() } else { 0.0 })
        .collect();
    let weights = normalize(&unnormalized)?;

    let retained: f64 = unnormalized.iter().sum();
    let partition = (-min_energy / kt).exp() * retained / prior_total;
    trace!(partition, min_energy, "Reweighted populations.");

    Ok(Reweighted { weights, partition })
}

/// Draws one index with probability proportional to its weight.
pub fn weighted_sample(weights: &[f64], rng: &mut impl Rng) -> Result<usize, SamplingError> {
    if weights.is_empty() {
        return Err(SamplingError::EmptyEnergies);
    }
    let dist = WeightedIndex::new(weights)?;
    Ok(dist.sample(rng))
}

/// Indices of the conformers surviving a trim, in ascending order.
///
/// Conformers are taken heaviest first until the cumulative weight reaches
/// `1 - tolerance`; the conformer that crosses the threshold is kept. The optional
/// weight floor never removes the heaviest conformer.
pub fn trim_indices(weights: &[f64], config: &TrimConfig) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let order: Vec<usize> = (0..weights.len())
        .sorted_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)))
        .collect();

    let total: f64 = weights.iter().sum();
    let threshold = (1.0 - config.tolerance) * total;
    let mut cumulative = 0.0;
    let mut keep = 0;
    for &idx in &order {
        keep += 1;
        cumulative += weights[idx];
        if cumulative >= threshold {
            break;
        }
    }

    let mut kept: Vec<usize> = order[..keep].to_vec();
    if let Some(floor) = config.min_weight {
        let top = kept[0];
        kept.retain(|&i| i == top || weights[i] >= floor * total);
    }
    if let Some(max) = config.max_rotamers {
        kept.truncate(max.max(1));
    }
    kept.into_iter().sorted_unstable().collect()
}
