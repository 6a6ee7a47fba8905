//! Wavefunction overlap between consecutive k-points.
//!
//! For a path of `K` k-points with `B` bands each, the overlap tensor has
//! shape `(K-1, B, B)`:
//!
//! ```text
//! O[i, a, b] = |⟨ψ_a(k_i), ψ_b(k_{i+1})⟩|
//! ```
//!
//! For normalised wavefunctions every entry lies in `[0, 1]`; a value near 1
//! means band `a` at `k_i` continues as band `b` at `k_{i+1}`.

use num_complex::Complex64;

use crate::array::Array3;
use crate::error::{Result, ResultsError};

/// Build the overlap tensor from `wavefunction[k, band, component]`.
///
/// Fails with a shape error when fewer than two k-points are given.
pub fn compute_overlap_tensor(wavefunction: &Array3<Complex64>) -> Result<Array3<f64>> {
    let [n_k, n_b, _] = wavefunction.dims();
    if n_k < 2 {
        return Err(ResultsError::shape(format!(
            "overlap needs at least two k-points, got {n_k}"
        )));
    }

    let mut overlap = Array3::from_elem([n_k - 1, n_b, n_b], 0.0);
    for i_k in 0..n_k - 1 {
        for a in 0..n_b {
            let prev = wavefunction.lane(i_k, a);
            for b in 0..n_b {
                let curr = wavefunction.lane(i_k + 1, b);
                *overlap.get_mut(i_k, a, b) = inner_product(prev, curr).norm();
            }
        }
    }
    Ok(overlap)
}

/// Standard inner product `⟨x, y⟩ = Σ x^* · y`.
fn inner_product(x: &[Complex64], y: &[Complex64]) -> Complex64 {
    x.iter().zip(y.iter()).map(|(xi, yi)| xi.conj() * yi).sum()
}
