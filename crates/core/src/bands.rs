//! Band structures along a k-path, optionally decorated with per-band data.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::array::{Array2, Array3};
use crate::error::{Result, ResultsError};
use crate::path::KPath;
use crate::series::{numbered, ColumnReduction, Labels, Series};

/// Number of energy samples used when no explicit energy grid is requested.
pub const DEFAULT_ENERGY_SAMPLES: usize = 100;

// ============================================================================
// Gaussian broadening
// ============================================================================

/// `n` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Energy grid and normalised Gaussian kernel for DOS-like sums over a
/// `(k, band)` energy table.
#[derive(Debug, Clone)]
pub(crate) struct Broadening {
    pub(crate) energies: Vec<f64>,
    sigma: f64,
    scale: f64,
}

impl Broadening {
    /// Resolve defaults against `energy`: the grid spans the NaN-free energy
    /// range in [`DEFAULT_ENERGY_SAMPLES`] steps and the width is one
    /// hundredth of that range.
    pub(crate) fn resolve(
        energy: &Array2<f64>,
        energies: Option<&[f64]>,
        broadening: Option<f64>,
    ) -> Result<Self> {
        let range = || -> Result<(f64, f64)> {
            match (energy.nan_min(), energy.nan_max()) {
                (Some(lo), Some(hi)) => Ok((lo, hi)),
                _ => Err(ResultsError::config(
                    "cannot derive an energy range from an all-NaN energy table",
                )),
            }
        };
        let energies = match energies {
            Some(values) => values.to_vec(),
            None => {
                let (lo, hi) = range()?;
                linspace(lo, hi, DEFAULT_ENERGY_SAMPLES)
            }
        };
        let sigma = match broadening {
            Some(value) => value,
            None => {
                let (lo, hi) = range()?;
                (hi - lo) / DEFAULT_ENERGY_SAMPLES as f64
            }
        };
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(ResultsError::config(format!(
                "broadening must be positive and finite, got {sigma}"
            )));
        }
        let n_k = energy.rows().max(1) as f64;
        Ok(Self {
            energies,
            sigma,
            scale: 1.0 / (sigma * (2.0 * PI).sqrt() * n_k),
        })
    }

    pub(crate) fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Normalised contribution of a state at `level` to every grid energy.
    pub(crate) fn kernel(&self, level: f64) -> impl Iterator<Item = f64> + '_ {
        self.energies.iter().map(move |&e| {
            let delta = level - e;
            self.scale * (-0.5 * delta * delta / (self.sigma * self.sigma)).exp()
        })
    }
}

// ============================================================================
// Bands
// ============================================================================

/// Energies `energy[k, band]` computed along a k-path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub k_path: KPath,
    pub energy: Array2<f64>,
}

impl Bands {
    pub fn new(k_path: KPath, energy: Array2<f64>) -> Result<Self> {
        if energy.rows() != k_path.len() {
            return Err(ResultsError::shape(format!(
                "energy has {} k-points but the path has {}",
                energy.rows(),
                k_path.len()
            )));
        }
        Ok(Self { k_path, energy })
    }

    pub fn num_k(&self) -> usize {
        self.energy.rows()
    }

    pub fn num_bands(&self) -> usize {
        self.energy.cols()
    }

    /// Gaussian-broadened density of states,
    /// `DOS(E) = 1/(c·√(2π)·K) Σ_k Σ_n exp(-(E_kn - E)² / 2c²)`.
    ///
    /// NaN energies (padding from disentanglement) contribute nothing.
    pub fn dos(&self, energies: Option<&[f64]>, broadening: Option<f64>) -> Result<Series> {
        let window = Broadening::resolve(&self.energy, energies, broadening)?;
        let mut dos = vec![0.0; window.energies.len()];
        for &level in self.energy.as_slice().iter().filter(|e| !e.is_nan()) {
            for (acc, g) in dos.iter_mut().zip(window.kernel(level)) {
                *acc += g;
            }
        }
        Series::from_column(window.energies.clone(), dos, Labels::new("E (eV)", "DOS"))
    }
}

// ============================================================================
// FatBands
// ============================================================================

/// Bands with a value per `(k, band, channel)`, e.g. a projected density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatBands {
    pub bands: Bands,
    pub data: Array3<f64>,
    pub labels: Labels,
}

impl FatBands {
    pub fn new(bands: Bands, data: Array3<f64>, labels: Labels) -> Result<Self> {
        let [n_k, n_b, n_c] = data.dims();
        if (n_k, n_b) != bands.energy.shape() {
            return Err(ResultsError::shape(format!(
                "fatband data leads with ({n_k}, {n_b}) but energy is {:?}",
                bands.energy.shape()
            )));
        }
        let mut labels = labels;
        if labels.orbitals.is_empty() && n_c > 1 {
            labels.orbitals = numbered(n_c);
        }
        Ok(Self {
            bands,
            data,
            labels,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.data.dims()[2]
    }

    pub fn with_data(&self, data: Array3<f64>) -> Result<Self> {
        Self::new(self.bands.clone(), data, self.labels.clone())
    }

    pub fn add(&self, other: &FatBands) -> Result<Self> {
        self.combine(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &FatBands) -> Result<Self> {
        self.combine(other, |a, b| a - b)
    }

    fn combine(&self, other: &FatBands, op: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let [n_k, n_b, lhs] = self.data.dims();
        let [o_k, o_b, rhs] = other.data.dims();
        if (n_k, n_b) != (o_k, o_b) {
            return Err(ResultsError::shape(format!(
                "cannot combine fatbands of shape ({n_k}, {n_b}) and ({o_k}, {o_b})"
            )));
        }
        let (width, reference) = if lhs == rhs || rhs == 1 {
            (lhs, self)
        } else if lhs == 1 {
            (rhs, other)
        } else {
            return Err(ResultsError::shape(format!(
                "cannot broadcast {lhs} channels against {rhs}"
            )));
        };
        let mut out = Array3::from_elem([n_k, n_b, width], 0.0);
        for k in 0..n_k {
            for b in 0..n_b {
                for c in 0..width {
                    let a = *self.data.get(k, b, c.min(lhs - 1));
                    let o = *other.data.get(k, b, c.min(rhs - 1));
                    *out.get_mut(k, b, c) = op(a, o);
                }
            }
        }
        reference.with_data(out)
    }

    /// Sum channels together, ignoring NaN entries.
    ///
    /// Same column mapping rules as [`Series::reduced`].
    pub fn reduced(
        &self,
        columns: Option<&[usize]>,
        orbitals: Option<Vec<String>>,
        fill_other: f64,
    ) -> Result<Self> {
        let plan = ColumnReduction::plan(
            self.num_channels(),
            columns,
            &self.labels.orbitals,
            orbitals,
        )?;
        let [n_k, n_b, _] = self.data.dims();
        let mut out = Array3::from_elem([n_k, n_b, plan.width], fill_other);
        for target in plan.targets() {
            for k in 0..n_k {
                for b in 0..n_b {
                    let lane = self.data.lane(k, b);
                    *out.get_mut(k, b, target) = plan
                        .sources(target)
                        .map(|src| lane[src])
                        .filter(|v| !v.is_nan())
                        .sum();
                }
            }
        }
        let mut reduced = self.with_data(out)?;
        reduced.labels.orbitals = plan.orbitals;
        Ok(reduced)
    }

    /// Density of states with every state weighted by its channel value;
    /// one output column per channel.
    pub fn dos(&self, energies: Option<&[f64]>, broadening: Option<f64>) -> Result<Series> {
        let window = Broadening::resolve(&self.bands.energy, energies, broadening)?;
        let [n_k, n_b, n_c] = self.data.dims();
        let n_e = window.energies.len();
        let mut dos = Array2::from_elem(n_e, n_c, 0.0);
        for k in 0..n_k {
            for b in 0..n_b {
                let level = *self.bands.energy.get(k, b);
                if level.is_nan() {
                    continue;
                }
                let kernel: Vec<f64> = window.kernel(level).collect();
                for (c, &weight) in self.data.lane(k, b).iter().enumerate() {
                    if weight.is_nan() {
                        continue;
                    }
                    for (e, g) in kernel.iter().enumerate() {
                        *dos.get_mut(e, c) += weight * g;
                    }
                }
            }
        }
        let mut labels = self.labels.clone();
        labels.variable = "E (eV)".to_string();
        Series::new(window.energies.clone(), dos, labels)
    }
}
