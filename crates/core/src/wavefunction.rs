//! Eigenvectors along a k-path and the views derived from them.
//!
//! A [`Wavefunction`] owns the raw band energies and the complex
//! eigenvectors `psi[k, band, component]`. The overlap tensor and the
//! disentanglement engine are built on first access and cached; energies
//! and projected densities are reordered through the same engine so they
//! stay index-aligned.

use std::sync::Arc;

use num_complex::Complex64;
use parking_lot::Mutex;

use crate::array::{Array2, Array3};
use crate::assignment::MatchRoutine;
use crate::bands::{Bands, Broadening, FatBands};
use crate::disentangle::Disentangle;
use crate::error::{Result, ResultsError};
use crate::metrics::MetricsRecorder;
use crate::overlap::compute_overlap_tensor;
use crate::series::{numbered, Labels, Series};
use crate::structure::{SpatialMap, Structure, Sublattices};

pub struct Wavefunction {
    bands: Bands,
    wavefunction: Array3<Complex64>,
    sublattices: Option<Sublattices>,
    structure: Option<Structure>,
    routine: MatchRoutine,
    threshold: Option<f64>,
    metrics: Option<Arc<MetricsRecorder>>,
    overlap: Mutex<Option<Arc<Array3<f64>>>>,
    disentangle: Mutex<Option<Arc<Disentangle>>>,
}

impl std::fmt::Debug for Wavefunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wavefunction")
            .field("dims", &self.wavefunction.dims())
            .field("routine", &self.routine)
            .field("threshold", &self.threshold)
            .field("sublattices", &self.sublattices.as_ref().map(Sublattices::names))
            .field("structure", &self.structure.as_ref().map(Structure::num_sites))
            .finish_non_exhaustive()
    }
}

impl Wavefunction {
    /// `wavefunction[k, band, component]` must lead with the energy shape.
    pub fn new(bands: Bands, wavefunction: Array3<Complex64>) -> Result<Self> {
        let [n_k, n_b, _] = wavefunction.dims();
        if (n_k, n_b) != bands.energy.shape() {
            return Err(ResultsError::shape(format!(
                "wavefunction leads with ({n_k}, {n_b}) but energy is {:?}",
                bands.energy.shape()
            )));
        }
        Ok(Self {
            bands,
            wavefunction,
            sublattices: None,
            structure: None,
            routine: MatchRoutine::default(),
            threshold: None,
            metrics: None,
            overlap: Mutex::new(None),
            disentangle: Mutex::new(None),
        })
    }

    /// Label every component with a sublattice/orbital category.
    pub fn with_sublattices(mut self, sublattices: Sublattices) -> Result<Self> {
        if sublattices.len() != self.num_components() {
            return Err(ResultsError::shape(format!(
                "{} sublattice labels for {} components",
                sublattices.len(),
                self.num_components()
            )));
        }
        self.sublattices = Some(sublattices);
        Ok(self)
    }

    /// Attach the lattice sites; one site per component.
    pub fn with_structure(mut self, structure: Structure) -> Result<Self> {
        if structure.num_sites() != self.num_components() {
            return Err(ResultsError::shape(format!(
                "{} sites for {} components",
                structure.num_sites(),
                self.num_components()
            )));
        }
        self.structure = Some(structure);
        Ok(self)
    }

    pub fn with_routine(mut self, routine: MatchRoutine) -> Self {
        self.set_routine(routine);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        self.set_threshold(Some(threshold))?;
        Ok(self)
    }

    pub fn with_metrics(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(recorder);
        self.disentangle.get_mut().take();
        self
    }

    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    pub fn wavefunction(&self) -> &Array3<Complex64> {
        &self.wavefunction
    }

    pub fn sublattices(&self) -> Option<&Sublattices> {
        self.sublattices.as_ref()
    }

    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    pub fn num_components(&self) -> usize {
        self.wavefunction.dims()[2]
    }

    pub fn routine(&self) -> MatchRoutine {
        self.routine
    }

    /// Switch the matching routine; the cached engine is dropped while the
    /// overlap tensor is kept.
    pub fn set_routine(&mut self, routine: MatchRoutine) {
        self.routine = routine;
        self.disentangle.get_mut().take();
    }

    /// Override the match threshold (`None` restores `(2B)^(-1/4)`); the
    /// cached engine is dropped.
    pub fn set_threshold(&mut self, threshold: Option<f64>) -> Result<()> {
        if let Some(value) = threshold {
            if !value.is_finite() || value < 0.0 {
                return Err(ResultsError::config(format!(
                    "threshold must be finite and non-negative, got {value}"
                )));
            }
        }
        self.threshold = threshold;
        self.disentangle.get_mut().take();
        Ok(())
    }

    /// Overlap tensor `(K-1, B, B)`, computed on first use.
    pub fn overlap_matrix(&self) -> Result<Arc<Array3<f64>>> {
        let mut guard = self.overlap.lock();
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }
        log::debug!(
            "[wavefunction] computing overlap for {:?}",
            self.wavefunction.dims()
        );
        let computed = Arc::new(compute_overlap_tensor(&self.wavefunction)?);
        *guard = Some(Arc::clone(&computed));
        Ok(computed)
    }

    /// The disentanglement engine over this wavefunction, built on first use.
    pub fn disentangle(&self) -> Result<Arc<Disentangle>> {
        let mut guard = self.disentangle.lock();
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let mut engine = Disentangle::new(self.overlap_matrix()?)?.with_routine(self.routine);
        if let Some(threshold) = self.threshold {
            engine = engine.with_threshold(threshold)?;
        }
        if let Some(recorder) = &self.metrics {
            engine = engine.with_metrics(Arc::clone(recorder));
        }
        let engine = Arc::new(engine);
        *guard = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Energies reordered into continuous tracks; retired slots are NaN.
    pub fn bands_disentangled(&self) -> Result<Bands> {
        let energy = self.disentangle()?.apply_2d(&self.bands.energy)?;
        Bands::new(self.bands.k_path.clone(), energy)
    }

    /// Raw bands with the projected density `|psi|²` per channel.
    ///
    /// With sublattice labels the components are summed per category, in
    /// mapping order; otherwise every component is its own channel.
    pub fn fatbands(&self) -> Result<FatBands> {
        let [n_k, n_b, n_c] = self.wavefunction.dims();
        let probability = self.wavefunction.map(Complex64::norm_sqr);
        let mut labels = Labels::new("E (eV)", "pDOS").with_columns("orbital");
        let data = match &self.sublattices {
            Some(subs) => {
                let groups = subs.groups();
                let mut data = Array3::from_elem([n_k, n_b, subs.num_groups()], 0.0);
                for k in 0..n_k {
                    for b in 0..n_b {
                        let lane = probability.lane(k, b);
                        let out = data.lane_mut(k, b);
                        for (c, &group) in groups.iter().enumerate().take(n_c) {
                            out[group] += lane[c];
                        }
                    }
                }
                labels.orbitals = subs.names();
                data
            }
            None => probability,
        };
        FatBands::new(self.bands.clone(), data, labels)
    }

    /// [`fatbands`](Self::fatbands) reordered by the same engine as
    /// [`bands_disentangled`](Self::bands_disentangled).
    pub fn fatbands_disentangled(&self) -> Result<FatBands> {
        let engine = self.disentangle()?;
        let fatbands = self.fatbands()?;
        let energy = engine.apply_2d(&self.bands.energy)?;
        let data = engine.apply(&fatbands.data)?;
        FatBands::new(
            Bands::new(self.bands.k_path.clone(), energy)?,
            data,
            fatbands.labels,
        )
    }

    /// Spatially resolved local density of states,
    /// `LDOS(r, E) = 1/(c·√(2π)·K) Σ_k Σ_n |psi_kn(r)|² exp(-(E_kn - E)² / 2c²)`.
    ///
    /// With a structure attached the result is a position × energy map.
    /// Otherwise it is an energy series with one column per sublattice
    /// category, or per component when no categories are known.
    pub fn spatial_ldos(
        &self,
        energies: Option<&[f64]>,
        broadening: Option<f64>,
    ) -> Result<LdosResult> {
        let window = Broadening::resolve(&self.bands.energy, energies, broadening)?;
        let [n_k, n_b, n_c] = self.wavefunction.dims();
        let n_e = window.energies.len();
        log::debug!(
            "[wavefunction] spatial LDOS over {n_e} energies (broadening {:.4})",
            window.sigma()
        );

        // ldos[component, energy]
        let mut ldos = Array2::from_elem(n_c, n_e, 0.0);
        for k in 0..n_k {
            for b in 0..n_b {
                let level = *self.bands.energy.get(k, b);
                if level.is_nan() {
                    continue;
                }
                let kernel: Vec<f64> = window.kernel(level).collect();
                for (c, psi) in self.wavefunction.lane(k, b).iter().enumerate() {
                    let weight = psi.norm_sqr();
                    if weight.is_nan() {
                        continue;
                    }
                    for (acc, g) in ldos.row_mut(c).iter_mut().zip(&kernel) {
                        *acc += weight * g;
                    }
                }
            }
        }

        if let Some(structure) = &self.structure {
            return Ok(LdosResult::Spatial(SpatialLdos::new(
                transpose(&ldos),
                window.energies,
                structure.clone(),
            )?));
        }

        let labels = Labels::new("E (eV)", "sLDOS").with_columns("orbitals");
        let series = match &self.sublattices {
            Some(subs) => {
                let mut grouped = Array2::from_elem(n_e, subs.num_groups(), 0.0);
                for (c, group) in subs.groups().into_iter().enumerate() {
                    for e in 0..n_e {
                        *grouped.get_mut(e, group) += *ldos.get(c, e);
                    }
                }
                Series::new(window.energies, grouped, labels.with_orbitals(subs.names()))?
            }
            None => Series::new(
                window.energies,
                transpose(&ldos),
                labels.with_orbitals(numbered(n_c)),
            )?,
        };
        Ok(LdosResult::Series(series))
    }
}

fn transpose(array: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = array.shape();
    let mut out = Array2::from_elem(cols, rows, 0.0);
    for r in 0..rows {
        for c in 0..cols {
            *out.get_mut(c, r) = *array.get(r, c);
        }
    }
    out
}

// ============================================================================
// Spatial LDOS
// ============================================================================

/// Output of [`Wavefunction::spatial_ldos`].
#[derive(Debug, Clone, PartialEq)]
pub enum LdosResult {
    /// Position-resolved map, available when a structure is attached.
    Spatial(SpatialLdos),
    /// Energy series per sublattice category or component.
    Series(Series),
}

/// Local density of states on every lattice site, `data[energy, site]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialLdos {
    pub data: Array2<f64>,
    pub energy: Vec<f64>,
    pub structure: Structure,
}

impl SpatialLdos {
    pub fn new(data: Array2<f64>, energy: Vec<f64>, structure: Structure) -> Result<Self> {
        if data.shape() != (energy.len(), structure.num_sites()) {
            return Err(ResultsError::shape(format!(
                "LDOS data is {:?}, expected ({}, {})",
                data.shape(),
                energy.len(),
                structure.num_sites()
            )));
        }
        Ok(Self {
            data,
            energy,
            structure,
        })
    }

    /// Site map at the energy sample closest to `energy`.
    pub fn structure_map(&self, energy: f64) -> Result<SpatialMap> {
        let idx = self
            .energy
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - energy).abs().total_cmp(&(b.1 - energy).abs()))
            .map(|(idx, _)| idx)
            .ok_or_else(|| ResultsError::shape("spatial LDOS has no energy samples"))?;
        self.structure.with_data(self.data.row(idx).to_vec())
    }

    /// LDOS as a function of energy at the site nearest to `position`.
    pub fn ldos(&self, position: &[f64], sublattice: Option<&str>) -> Result<Series> {
        let site = self
            .structure
            .find_nearest(position, sublattice)
            .ok_or_else(|| {
                ResultsError::config(format!(
                    "no site on sublattice {:?} to sample",
                    sublattice.unwrap_or("<any>")
                ))
            })?;
        let column = (0..self.data.rows()).map(|e| *self.data.get(e, site)).collect();
        Series::from_column(
            self.energy.clone(),
            column,
            Labels::new("E (eV)", "LDOS").with_columns("orbitals"),
        )
    }
}
