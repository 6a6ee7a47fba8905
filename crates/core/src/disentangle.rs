//! Band disentanglement along a k-path.
//!
//! Eigensolvers return bands sorted by energy at every k-point independently,
//! so band labels swap wherever two bands cross. This module reconstructs
//! continuous tracks from the overlap tensor produced by
//! [`compute_overlap_tensor`](crate::overlap::compute_overlap_tensor).
//!
//! # Algorithm
//!
//! 1. At `k = 0` every track starts on its own band: `index[0] = [0, 1, ..]`,
//!    all kept.
//! 2. For every step `k-1 → k`, the rows of `O[k-1]` are reordered by the
//!    already resolved `index[k-1]`, so row `b` holds the overlaps of track
//!    `b`. A [`MatchRoutine`] turns that matrix into `index[k]` and a keep
//!    mask (`overlap > threshold`). Identity is therefore followed
//!    transitively along the whole path.
//! 3. Working indices are assigned by scanning `keep` in k-then-band order.
//!    A track that is not kept is retired and continues in a fresh slot one
//!    past the largest slot in use, so two physically distinct tracks never
//!    share an output column.
//!
//! Applying the result scatters `data[k, index[k, b]]` into
//! `out[k, working_index[k, b]]`; every slot nobody writes stays NaN.
//!
//! Each step depends on the previous step's resolved ordering, so the
//! per-k matchings run strictly in sequence.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::array::{Array2, Array3};
use crate::assignment::MatchRoutine;
use crate::error::{Result, ResultsError};
use crate::metrics::{MetricsEvent, MetricsRecorder};

/// Resolved band ordering for every k-point.
#[derive(Debug, Clone, PartialEq)]
pub struct DisentangleMatrix {
    /// `index[k, b]`: raw band index at `k` that continues track `b`.
    pub index: Array2<usize>,
    /// `working_index[k, b]`: output slot of track `b` at `k`.
    pub working_index: Array2<usize>,
    /// `keep[k, b]`: the match of track `b` into `k` cleared the threshold.
    pub keep: Array2<bool>,
}

impl DisentangleMatrix {
    pub fn num_k(&self) -> usize {
        self.index.rows()
    }

    pub fn num_bands(&self) -> usize {
        self.index.cols()
    }

    /// Width of the band axis after disentanglement, `max(working_index) + 1`.
    pub fn working_slots(&self) -> usize {
        self.working_index
            .as_slice()
            .iter()
            .max()
            .map_or(0, |&max| max + 1)
    }

    /// Number of tracks that were retired and restarted in a new slot.
    pub fn retired_tracks(&self) -> usize {
        self.working_slots().saturating_sub(self.num_bands())
    }
}

/// Disentanglement engine over one overlap tensor.
///
/// The resolved [`DisentangleMatrix`] is computed on first use and cached.
/// Changing the routine or the threshold clears the cache; [`invalidate`]
/// does so explicitly.
///
/// [`invalidate`]: Disentangle::invalidate
pub struct Disentangle {
    overlap: Arc<Array3<f64>>,
    threshold: f64,
    routine: MatchRoutine,
    cache: Mutex<Option<Arc<DisentangleMatrix>>>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl std::fmt::Debug for Disentangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disentangle")
            .field("dims", &self.overlap.dims())
            .field("threshold", &self.threshold)
            .field("routine", &self.routine)
            .field("computed", &self.is_computed())
            .finish()
    }
}

impl Disentangle {
    /// Engine over `overlap[step, from, to]` with the default threshold and
    /// the optimal routine.
    pub fn new(overlap: Arc<Array3<f64>>) -> Result<Self> {
        let [_, n_b, n_b_2] = overlap.dims();
        if n_b != n_b_2 {
            return Err(ResultsError::shape(format!(
                "only square overlap matrices can be disentangled, {n_b} != {n_b_2}"
            )));
        }
        Ok(Self {
            threshold: Self::default_threshold(n_b),
            overlap,
            routine: MatchRoutine::default(),
            cache: Mutex::new(None),
            metrics: None,
        })
    }

    /// Empirical confidence threshold `(2B)^(-1/4)`.
    pub fn default_threshold(n_bands: usize) -> f64 {
        (2.0 * n_bands as f64).powf(-0.25)
    }

    pub fn with_routine(mut self, routine: MatchRoutine) -> Self {
        self.set_routine(routine);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        self.set_threshold(threshold)?;
        Ok(self)
    }

    pub fn with_metrics(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(recorder);
        self
    }

    pub fn overlap(&self) -> &Array3<f64> {
        &self.overlap
    }

    pub fn routine(&self) -> MatchRoutine {
        self.routine
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn num_k(&self) -> usize {
        self.overlap.dims()[0] + 1
    }

    pub fn num_bands(&self) -> usize {
        self.overlap.dims()[1]
    }

    /// Switch routine; the cached ordering is dropped.
    pub fn set_routine(&mut self, routine: MatchRoutine) {
        self.routine = routine;
        self.invalidate();
    }

    /// Override the threshold; the cached ordering is dropped.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ResultsError::config(format!(
                "threshold must be finite and non-negative, got {threshold}"
            )));
        }
        self.threshold = threshold;
        self.invalidate();
        Ok(())
    }

    /// Drop the cached ordering; the next access recomputes it.
    pub fn invalidate(&self) {
        if self.cache.lock().take().is_some() {
            log::debug!("[disentangle] cache invalidated");
        }
    }

    pub fn is_computed(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// The `(index, working_index, keep)` ordering, computed on first use.
    ///
    /// The lock is held while computing so concurrent callers never repeat
    /// the work.
    pub fn disentangle_matrix(&self) -> Result<Arc<DisentangleMatrix>> {
        let mut guard = self.cache.lock();
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let computed = Arc::new(self.compute()?);
        *guard = Some(Arc::clone(&computed));
        Ok(computed)
    }

    fn compute(&self) -> Result<DisentangleMatrix> {
        let start = Instant::now();
        let n_k = self.num_k();
        let n_b = self.num_bands();
        log::debug!(
            "[disentangle] routine={} k_points={} bands={} threshold={:.4}",
            self.routine,
            n_k,
            n_b,
            self.threshold
        );
        self.emit(MetricsEvent::DisentangleStart {
            routine: self.routine,
            k_points: n_k,
            bands: n_b,
            threshold: self.threshold,
        });

        let mut index = Array2::from_elem(n_k, n_b, 0usize);
        let mut keep = Array2::from_elem(n_k, n_b, true);
        for (b, slot) in index.row_mut(0).iter_mut().enumerate() {
            *slot = b;
        }

        let mut step_matrix = Array2::from_elem(n_b, n_b, 0.0);
        for k in 1..n_k {
            for b in 0..n_b {
                let source = *index.get(k - 1, b);
                step_matrix
                    .row_mut(b)
                    .copy_from_slice(self.overlap.lane(k - 1, source));
            }
            let matching = self.routine.match_bands(&step_matrix, self.threshold)?;
            index.row_mut(k).copy_from_slice(&matching.perm);
            keep.row_mut(k).copy_from_slice(&matching.keep);

            let broken = matching.broken();
            if broken > 0 {
                log::debug!(
                    "[disentangle] k#{k:03} {broken} track(s) below threshold (min overlap {:.3})",
                    matching.min_weight()
                );
            }
            self.emit(MetricsEvent::StepMatched {
                k_index: k,
                broken,
                min_overlap: matching.min_weight(),
                total_weight: matching.total_weight(),
            });
        }

        let working_index = self.assign_working_indices(&keep);
        let result = DisentangleMatrix {
            index,
            working_index,
            keep,
        };

        let retired = result.retired_tracks();
        if retired > 0 {
            log::warn!(
                "[disentangle] {retired} track(s) retired; band axis grows from {n_b} to {}",
                result.working_slots()
            );
        }
        self.emit(MetricsEvent::DisentangleDone {
            working_slots: result.working_slots(),
            retired_tracks: retired,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
        Ok(result)
    }

    fn assign_working_indices(&self, keep: &Array2<bool>) -> Array2<usize> {
        let (n_k, n_b) = keep.shape();
        let mut working = Array2::from_elem(n_k, n_b, 0usize);
        let mut current: Vec<usize> = (0..n_b).collect();
        let mut max_slot = n_b.saturating_sub(1);
        for k in 0..n_k {
            for b in 0..n_b {
                if !*keep.get(k, b) && self.threshold != 0.0 {
                    max_slot += 1;
                    current[b] = max_slot;
                }
            }
            working.row_mut(k).copy_from_slice(&current);
        }
        if self.threshold == 0.0 && n_b > 0 {
            assert_eq!(
                max_slot + 1,
                n_b,
                "working index space grew with a zero threshold"
            );
        }
        working
    }

    fn emit(&self, event: MetricsEvent) {
        if let Some(recorder) = &self.metrics {
            recorder.emit(event);
        }
    }

    /// Reorder `data[k, band, channel]` along the band axis.
    ///
    /// The output band axis has [`DisentangleMatrix::working_slots`] entries;
    /// slots without a track at a given k-point are NaN.
    pub fn apply(&self, data: &Array3<f64>) -> Result<Array3<f64>> {
        let matrix = self.disentangle_matrix()?;
        let [n_k, n_b, n_c] = data.dims();
        if (n_k, n_b) != matrix.index.shape() {
            return Err(ResultsError::shape(format!(
                "data leads with ({n_k}, {n_b}) but the ordering is {:?}",
                matrix.index.shape()
            )));
        }
        let mut out = Array3::from_elem([n_k, matrix.working_slots(), n_c], f64::NAN);
        for k in 0..n_k {
            for b in 0..n_b {
                let source = *matrix.index.get(k, b);
                let target = *matrix.working_index.get(k, b);
                out.lane_mut(k, target).copy_from_slice(data.lane(k, source));
            }
        }
        Ok(out)
    }

    /// [`apply`](Self::apply) for data without a channel axis, e.g. energies.
    pub fn apply_2d(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let (n_k, _) = data.shape();
        let out = self.apply(&Array3::from(data.clone()))?;
        let slots = out.dims()[1];
        Array2::from_vec(n_k, slots, out.into_vec())
    }
}
