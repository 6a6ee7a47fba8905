//! Job configuration and wavefunction input files.
//!
//! A job is a TOML file pointing at a JSON data file:
//!
//! ```toml
//! input = "wavefunction.json"
//!
//! [disentangle]
//! routine = "optimal"
//! threshold = 0.5
//!
//! [dos]
//! points = 200
//! broadening = 0.05
//! energy_min = -3.0
//! energy_max = 3.0
//!
//! [metrics]
//! enabled = true
//! output = "metrics.jsonl"
//! ```
//!
//! Relative paths are resolved against the directory of the TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::array::{Array2, Array3};
use crate::assignment::MatchRoutine;
use crate::bands::{linspace, Bands, DEFAULT_ENERGY_SAMPLES};
use crate::error::ResultsError;
use crate::metrics::MetricsConfig;
use crate::path::KPath;
use crate::structure::{Structure, Sublattices};
use crate::wavefunction::Wavefunction;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input data: {0}")]
    Results(#[from] ResultsError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Job configuration
// ============================================================================

/// Matching routine as written in a config file: a name or a legacy code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutineSelector {
    Code(i64),
    Name(String),
}

impl Default for RoutineSelector {
    fn default() -> Self {
        Self::Name(MatchRoutine::default().as_str().to_string())
    }
}

impl RoutineSelector {
    pub fn resolve(&self) -> Result<MatchRoutine, ConfigError> {
        let routine = match self {
            Self::Code(code) => MatchRoutine::from_code(*code)?,
            Self::Name(name) => name.parse::<MatchRoutine>()?,
        };
        Ok(routine)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisentangleSection {
    #[serde(default)]
    pub routine: RoutineSelector,
    /// Overrides the `(2B)^(-1/4)` default.
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DosSection {
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default)]
    pub broadening: Option<f64>,
    #[serde(default)]
    pub energy_min: Option<f64>,
    #[serde(default)]
    pub energy_max: Option<f64>,
}

fn default_points() -> usize {
    DEFAULT_ENERGY_SAMPLES
}

impl Default for DosSection {
    fn default() -> Self {
        Self {
            points: default_points(),
            broadening: None,
            energy_min: None,
            energy_max: None,
        }
    }
}

impl DosSection {
    /// Energy grid for `energy`, or `None` when every default applies.
    ///
    /// Missing limits fall back to the NaN-free range of the table.
    pub fn energy_grid(&self, energy: &Array2<f64>) -> Option<Vec<f64>> {
        if self.energy_min.is_none()
            && self.energy_max.is_none()
            && self.points == DEFAULT_ENERGY_SAMPLES
        {
            return None;
        }
        let lo = self.energy_min.or_else(|| energy.nan_min())?;
        let hi = self.energy_max.or_else(|| energy.nan_max())?;
        Some(linspace(lo, hi, self.points))
    }
}

/// Configuration for a disentanglement job (loadable from TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// JSON data file, see [`WavefunctionInput`].
    pub input: PathBuf,
    #[serde(default)]
    pub disentangle: DisentangleSection,
    #[serde(default)]
    pub dos: DosSection,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl JobConfig {
    /// Load from a TOML file; relative paths become relative to its directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(dir) = path.parent() {
            config.input = rebase(dir, &config.input);
            if let Some(output) = &config.metrics.output {
                config.metrics.output = Some(rebase(dir, output));
            }
        }
        Ok(config)
    }

    /// Parse from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.disentangle.routine.resolve()?;
        if let Some(threshold) = self.disentangle.threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "disentangle.threshold must be finite and non-negative, got {threshold}"
                )));
            }
        }
        if self.dos.points < 2 {
            return Err(ConfigError::Invalid(format!(
                "dos.points must be at least 2, got {}",
                self.dos.points
            )));
        }
        if let Some(broadening) = self.dos.broadening {
            if !broadening.is_finite() || broadening <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "dos.broadening must be positive, got {broadening}"
                )));
            }
        }
        if let (Some(lo), Some(hi)) = (self.dos.energy_min, self.dos.energy_max) {
            if lo >= hi {
                return Err(ConfigError::Invalid(format!(
                    "dos.energy_min ({lo}) must be below dos.energy_max ({hi})"
                )));
            }
        }
        Ok(())
    }

    pub fn routine(&self) -> Result<MatchRoutine, ConfigError> {
        self.disentangle.routine.resolve()
    }

    /// Read the input file and set up the wavefunction with this job's
    /// routine, threshold and metrics sink.
    pub fn load_wavefunction(&self) -> Result<Wavefunction, ConfigError> {
        let input = WavefunctionInput::from_file(&self.input)?;
        let mut wavefunction = Wavefunction::try_from(input)?.with_routine(self.routine()?);
        if let Some(threshold) = self.disentangle.threshold {
            wavefunction = wavefunction.with_threshold(threshold)?;
        }
        if let Some(recorder) = self.metrics.build_recorder()? {
            wavefunction = wavefunction.with_metrics(Arc::new(recorder));
        }
        Ok(wavefunction)
    }
}

fn rebase(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

// ============================================================================
// Wavefunction input
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SublatticeInput {
    /// Sublattice id of every wavefunction component.
    pub ids: Vec<u16>,
    /// Name → id. Channels are ordered by id.
    pub names: BTreeMap<String, u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureInput {
    pub positions: Vec<[f64; 3]>,
    pub sublattices: Vec<String>,
}

/// JSON layout of a solved system along a k-path.
///
/// Complex amplitudes are `[re, im]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavefunctionInput {
    pub k_path: Vec<Vec<f64>>,
    #[serde(default)]
    pub point_indices: Option<Vec<usize>>,
    #[serde(default)]
    pub point_labels: Option<Vec<String>>,
    /// `energy[k][band]`
    pub energy: Vec<Vec<f64>>,
    /// `wavefunction[k][band][component]`
    pub wavefunction: Vec<Vec<Vec<Complex64>>>,
    #[serde(default)]
    pub sublattices: Option<SublatticeInput>,
    #[serde(default)]
    pub structure: Option<StructureInput>,
}

impl WavefunctionInput {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl TryFrom<SublatticeInput> for Sublattices {
    type Error = ResultsError;

    fn try_from(value: SublatticeInput) -> Result<Self, Self::Error> {
        let mut mapping: Vec<(String, u16)> = value.names.into_iter().collect();
        mapping.sort_by_key(|(_, id)| *id);
        Sublattices::new(value.ids, mapping)
    }
}

impl TryFrom<WavefunctionInput> for Wavefunction {
    type Error = ResultsError;

    fn try_from(value: WavefunctionInput) -> Result<Self, Self::Error> {
        let k_path = match value.point_indices {
            Some(indices) => KPath::new(value.k_path, indices, value.point_labels)?,
            None => {
                let last = value.k_path.len().saturating_sub(1);
                KPath::new(value.k_path, vec![0, last], value.point_labels)?
            }
        };
        let bands = Bands::new(k_path, Array2::from_rows(value.energy)?)?;
        let mut wavefunction = Wavefunction::new(bands, Array3::from_nested(value.wavefunction)?)?;
        if let Some(subs) = value.sublattices {
            wavefunction = wavefunction.with_sublattices(subs.try_into()?)?;
        }
        if let Some(structure) = value.structure {
            wavefunction = wavefunction
                .with_structure(Structure::new(structure.positions, structure.sublattices)?)?;
        }
        Ok(wavefunction)
    }
}
