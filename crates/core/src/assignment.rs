//! Band matching between consecutive k-points.
//!
//! Given a square weight matrix `M` (row = band at step k, column = candidate
//! band at step k+1) a matcher produces a bijection `perm` with
//! `perm[from] = to`, together with a `keep` flag telling whether the matched
//! weight clears the confidence threshold.
//!
//! Two routines are available:
//!
//! - [`MatchRoutine::Greedy`]: rows are processed in ascending order and each
//!   takes the best still-free column. `O(B²)`, deterministic, order
//!   dependent and not globally optimal.
//! - [`MatchRoutine::Optimal`]: exact maximum-weight perfect matching,
//!   solved as a minimum-cost assignment on `-M` with the Hungarian method
//!   (shortest augmenting paths with row/column potentials, `O(B³)`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::array::Array2;
use crate::error::{Result, ResultsError};

// ============================================================================
// Routine selection
// ============================================================================

/// Which assignment routine resolves each matching step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRoutine {
    /// Row-ordered greedy choice of the largest remaining overlap.
    Greedy,
    /// Exact maximum-weight bipartite matching.
    #[default]
    Optimal,
}

impl MatchRoutine {
    /// Decode the legacy integer selector: `0` greedy, `1` optimal.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Greedy),
            1 => Ok(Self::Optimal),
            other => Err(ResultsError::config(format!(
                "unknown matching routine {other}, expected 0 (greedy) or 1 (optimal)"
            ))),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Greedy => 0,
            Self::Optimal => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Optimal => "optimal",
        }
    }

    /// Solve one matching step.
    pub fn match_bands(self, matrix: &Array2<f64>, threshold: f64) -> Result<Matching> {
        let perm = match self {
            Self::Greedy => greedy_assignment(matrix)?,
            Self::Optimal => optimal_assignment(matrix)?,
        };
        Ok(Matching::new(matrix, perm, threshold))
    }
}

impl fmt::Display for MatchRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchRoutine {
    type Err = ResultsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" | "0" => Ok(Self::Greedy),
            "optimal" | "1" => Ok(Self::Optimal),
            other => Err(ResultsError::config(format!(
                "unknown matching routine \"{other}\", expected \"greedy\" or \"optimal\""
            ))),
        }
    }
}

// ============================================================================
// Matching result
// ============================================================================

/// Outcome of one matching step.
#[derive(Debug, Clone, PartialEq)]
pub struct Matching {
    /// `perm[from] = to`, a bijection on `0..B`.
    pub perm: Vec<usize>,
    /// `keep[from]` is true when `M[from, perm[from]] > threshold`.
    pub keep: Vec<bool>,
    /// `M[from, perm[from]]` for every row.
    pub weights: Vec<f64>,
}

impl Matching {
    fn new(matrix: &Array2<f64>, perm: Vec<usize>, threshold: f64) -> Self {
        let weights: Vec<f64> = perm
            .iter()
            .enumerate()
            .map(|(from, &to)| *matrix.get(from, to))
            .collect();
        let keep = weights.iter().map(|&w| w > threshold).collect();
        Self {
            perm,
            keep,
            weights,
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Smallest matched weight; `0.0` for an empty matching.
    pub fn min_weight(&self) -> f64 {
        let min = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        if min == f64::INFINITY {
            0.0
        } else {
            min
        }
    }

    pub fn broken(&self) -> usize {
        self.keep.iter().filter(|&&k| !k).count()
    }
}

fn ensure_square(matrix: &Array2<f64>) -> Result<usize> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(ResultsError::shape(format!(
            "only square matrices can be matched, got {rows}x{cols}"
        )));
    }
    Ok(rows)
}

// ============================================================================
// Greedy routine
// ============================================================================

/// Row-ordered greedy assignment.
///
/// Row `from` takes the largest entry among the columns not yet claimed by
/// rows `0..from`; ties go to the lowest column index.
pub fn greedy_assignment(matrix: &Array2<f64>) -> Result<Vec<usize>> {
    let n = ensure_square(matrix)?;
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut perm = Vec::with_capacity(n);
    for from in 0..n {
        let row = matrix.row(from);
        let mut best_pos = 0;
        let mut best = row[remaining[0]];
        for (pos, &to) in remaining.iter().enumerate().skip(1) {
            let value = row[to];
            // NaN beats everything, as a NaN-propagating argmax would
            if value > best || (value.is_nan() && !best.is_nan()) {
                best = value;
                best_pos = pos;
            }
        }
        perm.push(remaining.remove(best_pos));
    }
    Ok(perm)
}

// ============================================================================
// Optimal routine
// ============================================================================

/// Maximum-weight perfect matching on a square matrix.
///
/// The returned vector is indexed by row, so rows are matched in index order
/// by construction.
pub fn optimal_assignment(matrix: &Array2<f64>) -> Result<Vec<usize>> {
    let n = ensure_square(matrix)?;
    if let Some(pos) = matrix.as_slice().iter().position(|v| !v.is_finite()) {
        return Err(ResultsError::NonFinite(format!(
            "weight matrix entry ({}, {}) is {}",
            pos / n,
            pos % n,
            matrix.as_slice()[pos]
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    // 1-based potentials; column 0 is the virtual source of each augmenting path.
    let cost = |row: usize, col: usize| -*matrix.get(row - 1, col - 1);
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut owner = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut j0 = 0;
        let mut min_reduced = vec![f64::INFINITY; n + 1];
        let mut visited = vec![false; n + 1];
        loop {
            visited[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if visited[j] {
                    continue;
                }
                let reduced = cost(i0, j) - u[i0] - v[j];
                if reduced < min_reduced[j] {
                    min_reduced[j] = reduced;
                    way[j] = j0;
                }
                if min_reduced[j] < delta {
                    delta = min_reduced[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if visited[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_reduced[j] -= delta;
                }
            }
            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }
        // unwind the augmenting path
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut perm = vec![usize::MAX; n];
    for col in 1..=n {
        perm[owner[col] - 1] = col - 1;
    }
    assert!(
        perm.iter().all(|&c| c != usize::MAX),
        "assignment left a row unmatched"
    );
    Ok(perm)
}
