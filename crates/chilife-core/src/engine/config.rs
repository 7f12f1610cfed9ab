use crate::core::forcefield::params::StericParams;
use crate::core::models::internal_chain::AlignmentMethod;
use crate::core::models::topology::DEFAULT_EXCLUSION_DEPTH;
use nalgebra::Point3;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {message}")]
    InvalidValue {
        parameter: &'static str,
        message: String,
    },
    #[error("Failed to read configuration '{path}': {message}")]
    File { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteSpecifier {
    pub chain_id: String,
    pub residue_number: isize,
}

impl SiteSpecifier {
    pub fn new(chain_id: &str, residue_number: isize) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            residue_number,
        }
    }
}

/// Centre of the sphere from which host atoms are collected for clash evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClashOrigin {
    /// Mean position over all atoms of all conformers.
    #[default]
    Centroid,
    /// Position of the named atom in the first conformer.
    Atom(String),
    Point(Point3<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimConfig {
    /// Population fraction allowed to be discarded from the low-weight tail.
    pub tolerance: f64,
    /// Conformers lighter than this are removed.
    pub min_weight: Option<f64>,
    /// Keep at most this many of the heaviest conformers.
    pub max_rotamers: Option<usize>,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.005,
            min_weight: None,
            max_rotamers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    /// Temperature in Kelvin.
    pub temperature: f64,
    /// Radius in Angstrom of the host environment considered for clashes.
    pub clash_radius: f64,
    pub clash_origin: ClashOrigin,
    pub exclusion_depth: usize,
    pub steric: StericParams,
    pub alignment: AlignmentMethod,
    pub trim: TrimConfig,
    /// Score and reweight conformers against the host once built.
    pub evaluate: bool,
    /// Trim low-population conformers after evaluation.
    pub trim_after_evaluate: bool,
    pub exclude_water: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            temperature: 298.0,
            clash_radius: 14.0,
            clash_origin: ClashOrigin::Centroid,
            exclusion_depth: DEFAULT_EXCLUSION_DEPTH,
            steric: StericParams::uff(),
            alignment: AlignmentMethod::Bisect,
            trim: TrimConfig::default(),
            evaluate: true,
            trim_after_evaluate: true,
            exclude_water: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the infinity norm of the projected gradient.
    pub gradient_tolerance: f64,
    /// Convergence threshold on the relative change of the objective.
    pub function_tolerance: f64,
    /// Number of correction pairs kept by the L-BFGS update.
    pub history_size: usize,
    /// Step used for finite-difference gradients.
    pub finite_difference_step: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-5,
            function_tolerance: 1e-10,
            history_size: 10,
            finite_difference_step: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub ensemble: EnsembleConfig,
    /// Weight of the squared bridge-distance error in kcal/mol/A^2.
    pub restraint_weight: f64,
    /// Penalty per radian of dihedral displacement from the library value.
    pub displacement_penalty: f64,
    /// Closure error in Angstrom above which a warning is raised.
    pub soft_threshold: f64,
    /// Closure error in Angstrom above which a conformer pair is rejected.
    pub hard_threshold: f64,
    pub minimize: bool,
    pub minimizer: MinimizerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig::default(),
            restraint_weight: 200.0,
            displacement_penalty: 0.0,
            soft_threshold: 0.1,
            hard_threshold: 0.5,
            minimize: true,
            minimizer: MinimizerConfig::default(),
        }
    }
}

fn positive(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            message: format!("expected a positive number, found {value}"),
        })
    }
}

fn non_negative(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            message: format!("expected a non-negative number, found {value}"),
        })
    }
}

#[derive(Default)]
pub struct EnsembleConfigBuilder {
    temperature: Option<f64>,
    clash_radius: Option<f64>,
    clash_origin: Option<ClashOrigin>,
    exclusion_depth: Option<usize>,
    steric: Option<StericParams>,
    forgive: Option<f64>,
    energy_cap: Option<f64>,
    alignment: Option<AlignmentMethod>,
    trim_tolerance: Option<f64>,
    min_weight: Option<f64>,
    max_rotamers: Option<usize>,
    evaluate: Option<bool>,
    trim_after_evaluate: Option<bool>,
    exclude_water: Option<bool>,
}

impl EnsembleConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn clash_radius(mut self, radius: f64) -> Self {
        self.clash_radius = Some(radius);
        self
    }
    pub fn clash_origin(mut self, origin: ClashOrigin) -> Self {
        self.clash_origin = Some(origin);
        self
    }
    pub fn exclusion_depth(mut self, depth: usize) -> Self {
        self.exclusion_depth = Some(depth);
        self
    }
    pub fn steric(mut self, params: StericParams) -> Self {
        self.steric = Some(params);
        self
    }
    pub fn forgive(mut self, forgive: f64) -> Self {
        self.forgive = Some(forgive);
        self
    }
    pub fn energy_cap(mut self, cap: f64) -> Self {
        self.energy_cap = Some(cap);
        self
    }
    pub fn alignment(mut self, method: AlignmentMethod) -> Self {
        self.alignment = Some(method);
        self
    }
    pub fn trim_tolerance(mut self, tolerance: f64) -> Self {
        self.trim_tolerance = Some(tolerance);
        self
    }
    pub fn min_weight(mut self, weight: f64) -> Self {
        self.min_weight = Some(weight);
        self
    }
    pub fn max_rotamers(mut self, n: usize) -> Self {
        self.max_rotamers = Some(n);
        self
    }
    pub fn evaluate(mut self, evaluate: bool) -> Self {
        self.evaluate = Some(evaluate);
        self
    }
    pub fn trim_after_evaluate(mut self, trim: bool) -> Self {
        self.trim_after_evaluate = Some(trim);
        self
    }
    pub fn exclude_water(mut self, exclude: bool) -> Self {
        self.exclude_water = Some(exclude);
        self
    }

    pub fn build(self) -> Result<EnsembleConfig, ConfigError> {
        let defaults = EnsembleConfig::default();

        let mut steric = self.steric.unwrap_or(defaults.steric);
        if let Some(forgive) = self.forgive {
            steric.globals.forgive = positive("forgive", forgive)?;
        }
        if let Some(cap) = self.energy_cap {
            steric.globals.cap = positive("energy_cap", cap)?;
        }
        positive("forgive", steric.globals.forgive)?;
        positive("energy_cap", steric.globals.cap)?;

        let tolerance = self.trim_tolerance.unwrap_or(defaults.trim.tolerance);
        if !(0.0..1.0).contains(&tolerance) {
            return Err(ConfigError::InvalidValue {
                parameter: "trim_tolerance",
                message: format!("expected a value in [0, 1), found {tolerance}"),
            });
        }
        if let Some(min_weight) = self.min_weight {
            non_negative("min_weight", min_weight)?;
        }
        if self.max_rotamers == Some(0) {
            return Err(ConfigError::InvalidValue {
                parameter: "max_rotamers",
                message: "at least one rotamer must be kept".to_string(),
            });
        }

        Ok(EnsembleConfig {
            temperature: positive(
                "temperature",
                self.temperature.unwrap_or(defaults.temperature),
            )?,
            clash_radius: non_negative(
                "clash_radius",
                self.clash_radius.unwrap_or(defaults.clash_radius),
            )?,
            clash_origin: self.clash_origin.unwrap_or(defaults.clash_origin),
            exclusion_depth: self.exclusion_depth.unwrap_or(defaults.exclusion_depth),
            steric,
            alignment: self.alignment.unwrap_or(defaults.alignment),
            trim: TrimConfig {
                tolerance,
                min_weight: self.min_weight,
                max_rotamers: self.max_rotamers,
            },
            evaluate: self.evaluate.unwrap_or(defaults.evaluate),
            trim_after_evaluate: self
                .trim_after_evaluate
                .unwrap_or(defaults.trim_after_evaluate),
            exclude_water: self.exclude_water.unwrap_or(defaults.exclude_water),
        })
    }
}

#[derive(Default)]
pub struct BridgeConfigBuilder {
    ensemble: Option<EnsembleConfig>,
    restraint_weight: Option<f64>,
    displacement_penalty: Option<f64>,
    soft_threshold: Option<f64>,
    hard_threshold: Option<f64>,
    minimize: Option<bool>,
    minimizer: Option<MinimizerConfig>,
}

impl BridgeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensemble(mut self, config: EnsembleConfig) -> Self {
        self.ensemble = Some(config);
        self
    }
    pub fn restraint_weight(mut self, weight: f64) -> Self {
        self.restraint_weight = Some(weight);
        self
    }
    pub fn displacement_penalty(mut self, penalty: f64) -> Self {
        self.displacement_penalty = Some(penalty);
        self
    }
    pub fn soft_threshold(mut self, threshold: f64) -> Self {
        self.soft_threshold = Some(threshold);
        self
    }
    pub fn hard_threshold(mut self, threshold: f64) -> Self {
        self.hard_threshold = Some(threshold);
        self
    }
    pub fn minimize(mut self, minimize: bool) -> Self {
        self.minimize = Some(minimize);
        self
    }
    pub fn minimizer(mut self, config: MinimizerConfig) -> Self {
        self.minimizer = Some(config);
        self
    }

    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        let defaults = BridgeConfig::default();
        let soft = positive(
            "soft_threshold",
            self.soft_threshold.unwrap_or(defaults.soft_threshold),
        )?;
        let hard = positive(
            "hard_threshold",
            self.hard_threshold.unwrap_or(defaults.hard_threshold),
        )?;
        if soft > hard {
            return Err(ConfigError::InvalidValue {
                parameter: "soft_threshold",
                message: format!("soft threshold {soft} exceeds hard threshold {hard}"),
            });
        }

        let minimizer = self.minimizer.unwrap_or(defaults.minimizer);
        if minimizer.history_size == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "history_size",
                message: "the L-BFGS history must hold at least one pair".to_string(),
            });
        }
        positive("finite_difference_step", minimizer.finite_difference_step)?;

        Ok(BridgeConfig {
            ensemble: self.ensemble.unwrap_or(defaults.ensemble),
            restraint_weight: non_negative(
                "restraint_weight",
                self.restraint_weight.unwrap_or(defaults.restraint_weight),
            )?,
            displacement_penalty: non_negative(
                "displacement_penalty",
                self.displacement_penalty
                    .unwrap_or(defaults.displacement_penalty),
            )?,
            soft_threshold: soft,
            hard_threshold: hard,
            minimize: self.minimize.unwrap_or(defaults.minimize),
            minimizer,
        })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FileClashOrigin {
    Point([f64; 3]),
    Name(String),
}

/// `[ensemble]` table of a configuration file.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEnsembleSection {
    pub temperature: Option<f64>,
    pub clash_radius: Option<f64>,
    pub clash_origin: Option<FileClashOrigin>,
    pub exclusion_depth: Option<usize>,
    pub forgive: Option<f64>,
    pub energy_cap: Option<f64>,
    pub alignment: Option<String>,
    pub trim_tolerance: Option<f64>,
    pub min_weight: Option<f64>,
    pub max_rotamers: Option<usize>,
    pub evaluate: Option<bool>,
    pub trim: Option<bool>,
    pub exclude_water: Option<bool>,
    /// TOML file with steric globals and atom-type parameters.
    pub steric_params: Option<PathBuf>,
    /// CSV file with additional atom-type parameters.
    pub steric_csv: Option<PathBuf>,
}

/// `[bridge]` table of a configuration file.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileBridgeSection {
    pub restraint_weight: Option<f64>,
    pub displacement_penalty: Option<f64>,
    pub soft_threshold: Option<f64>,
    pub hard_threshold: Option<f64>,
    pub minimize: Option<bool>,
    pub max_iterations: Option<usize>,
    pub gradient_tolerance: Option<f64>,
    pub history_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub ensemble: FileEnsembleSection,
    #[serde(default)]
    pub bridge: FileBridgeSection,
}

fn file_error(path: &Path, message: impl ToString) -> ConfigError {
    ConfigError::File {
        path: path.to_string_lossy().to_string(),
        message: message.to_string(),
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| file_error(path, e))?;
        let config: Self = toml::from_str(&content).map_err(|e| file_error(path, e))?;
        debug!(path = %path.display(), "Loaded configuration file.");
        Ok(config)
    }

    pub fn ensemble_builder(&self) -> Result<EnsembleConfigBuilder, ConfigError> {
        let section = &self.ensemble;
        let mut builder = EnsembleConfigBuilder::new();

        if section.steric_params.is_some() || section.steric_csv.is_some() {
            let mut params = match &section.steric_params {
                Some(path) => StericParams::load_toml(path).map_err(|e| file_error(path, e))?,
                None => StericParams::uff(),
            };
            if let Some(path) = &section.steric_csv {
                params = params.load_csv(path).map_err(|e| file_error(path, e))?;
            }
            builder = builder.steric(params);
        }

        if let Some(v) = section.temperature {
            builder = builder.temperature(v);
        }
        if let Some(v) = section.clash_radius {
            builder = builder.clash_radius(v);
        }
        if let Some(origin) = &section.clash_origin {
            let origin = match origin {
                FileClashOrigin::Point([x, y, z]) => ClashOrigin::Point(Point3::new(*x, *y, *z)),
                FileClashOrigin::Name(name) => match name.to_ascii_lowercase().as_str() {
                    "cen" | "centroid" => ClashOrigin::Centroid,
                    _ => ClashOrigin::Atom(name.to_ascii_uppercase()),
                },
            };
            builder = builder.clash_origin(origin);
        }
        if let Some(v) = section.exclusion_depth {
            builder = builder.exclusion_depth(v);
        }
        if let Some(v) = section.forgive {
            builder = builder.forgive(v);
        }
        if let Some(v) = section.energy_cap {
            builder = builder.energy_cap(v);
        }
        if let Some(name) = &section.alignment {
            let method = match name.to_ascii_lowercase().as_str() {
                "bisect" => AlignmentMethod::Bisect,
                "backbone" => AlignmentMethod::Backbone,
                other => {
                    return Err(ConfigError::InvalidValue {
                        parameter: "alignment",
                        message: format!("unknown alignment method '{other}'"),
                    });
                }
            };
            builder = builder.alignment(method);
        }
        if let Some(v) = section.trim_tolerance {
            builder = builder.trim_tolerance(v);
        }
        if let Some(v) = section.min_weight {
            builder = builder.min_weight(v);
        }
        if let Some(v) = section.max_rotamers {
            builder = builder.max_rotamers(v);
        }
        if let Some(v) = section.evaluate {
            builder = builder.evaluate(v);
        }
        if let Some(v) = section.trim {
            builder = builder.trim_after_evaluate(v);
        }
        if let Some(v) = section.exclude_water {
            builder = builder.exclude_water(v);
        }
        Ok(builder)
    }

    pub fn bridge_builder(&self) -> Result<BridgeConfigBuilder, ConfigError> {
        let section = &self.bridge;
        let ensemble = self.ensemble_builder()?.build()?;
        let mut builder = BridgeConfigBuilder::new().ensemble(ensemble);

        if let Some(v) = section.restraint_weight {
            builder = builder.restraint_weight(v);
        }
        if let Some(v) = section.displacement_penalty {
            builder = builder.displacement_penalty(v);
        }
        if let Some(v) = section.soft_threshold {
            builder = builder.soft_threshold(v);
        }
        if let Some(v) = section.hard_threshold {
            builder = builder.hard_threshold(v);
        }
        if let Some(v) = section.minimize {
            builder = builder.minimize(v);
        }

        let mut minimizer = MinimizerConfig::default();
        if let Some(v) = section.max_iterations {
            minimizer.max_iterations = v;
        }
        if let Some(v) = section.gradient_tolerance {
            minimizer.gradient_tolerance = v;
        }
        if let Some(v) = section.history_size {
            minimizer.history_size = v;
        }
        Ok(builder.minimizer(minimizer))
    }
}
