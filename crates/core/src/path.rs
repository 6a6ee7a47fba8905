//! Paths through reciprocal space.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultsError};

/// An ordered list of k-points plus the indices of the significant points
/// (start, corners, end) along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KPath {
    points: Vec<Vec<f64>>,
    point_indices: Vec<usize>,
    point_labels: Option<Vec<String>>,
}

impl KPath {
    pub fn new(
        points: Vec<Vec<f64>>,
        point_indices: Vec<usize>,
        point_labels: Option<Vec<String>>,
    ) -> Result<Self> {
        if point_indices.len() < 2 {
            return Err(ResultsError::shape(
                "a k-path needs at least two significant points",
            ));
        }
        if let Some(&bad) = point_indices.iter().find(|&&idx| idx >= points.len()) {
            return Err(ResultsError::shape(format!(
                "significant point index {bad} is outside a path of {} points",
                points.len()
            )));
        }
        if let Some(labels) = &point_labels {
            if labels.len() != point_indices.len() {
                return Err(ResultsError::shape(format!(
                    "{} labels for {} significant points",
                    labels.len(),
                    point_indices.len()
                )));
            }
        }
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if points.iter().any(|p| p.len() != dim) {
            return Err(ResultsError::shape("all k-points must have the same dimension"));
        }
        Ok(Self {
            points,
            point_indices,
            point_labels,
        })
    }

    /// Path whose only significant points are the first and last sample.
    pub fn from_points(points: Vec<Vec<f64>>) -> Result<Self> {
        let last = points.len().saturating_sub(1);
        Self::new(points, vec![0, last], None)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.points.first().map(Vec::len).unwrap_or(0)
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.points
    }

    pub fn point_indices(&self) -> &[usize] {
        &self.point_indices
    }

    pub fn point_labels(&self) -> Option<&[String]> {
        self.point_labels.as_deref()
    }

    /// Significant points along the path, including start and end.
    pub fn points(&self) -> Vec<Vec<f64>> {
        self.point_indices
            .iter()
            .map(|&idx| self.points[idx].clone())
            .collect()
    }

    /// Just a straight line between two points?
    pub fn is_simple(&self) -> bool {
        self.point_indices.len() == 2
    }

    /// 1D coordinate for every sample, usable as the horizontal axis of a
    /// band plot.
    ///
    /// Simple paths return the first axis along which the endpoints differ,
    /// so the values are real k-space coordinates. Anything else returns the
    /// cumulative arc length starting at zero.
    pub fn as_1d(&self) -> Vec<f64> {
        if self.is_simple() {
            let ends = self.points();
            let axis = (0..self.dim()).find(|&axis| ends[1][axis] != ends[0][axis]);
            if let Some(axis) = axis {
                return self.points.iter().map(|p| p[axis]).collect();
            }
        }
        accumulate_distances(&self.points)
    }
}

fn accumulate_distances(points: &[Vec<f64>]) -> Vec<f64> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut distances = Vec::with_capacity(points.len());
    let mut total = 0.0;
    distances.push(0.0);
    for pair in points.windows(2) {
        total += euclidean(&pair[0], &pair[1]);
        distances.push(total);
    }
    distances
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (y - x) * (y - x))
        .sum::<f64>()
        .sqrt()
}

/// Connect the given k-points with evenly spaced samples.
///
/// Each leg gets `floor(|k_end - k_start| / step)` samples, its end point
/// excluded; the final point is appended once at the end.
pub fn make_path(
    nodes: &[Vec<f64>],
    step: f64,
    point_labels: Option<Vec<String>>,
) -> Result<KPath> {
    if nodes.len() < 2 {
        return Err(ResultsError::shape("make_path needs at least two k-points"));
    }
    if step.is_nan() || step <= 0.0 {
        return Err(ResultsError::config(format!("step must be positive, got {step}")));
    }
    let dim = nodes[0].len();
    if nodes.iter().any(|k| k.len() != dim) {
        return Err(ResultsError::shape("all k-points must have the same shape"));
    }

    let mut samples = Vec::new();
    let mut point_indices = vec![0];
    for leg in nodes.windows(2) {
        let (start, end) = (&leg[0], &leg[1]);
        let num_steps = (euclidean(start, end) / step).floor() as usize;
        for s in 0..num_steps {
            let t = s as f64 / num_steps as f64;
            samples.push(
                start
                    .iter()
                    .zip(end)
                    .map(|(a, b)| a + t * (b - a))
                    .collect(),
            );
        }
        let last = point_indices[point_indices.len() - 1];
        point_indices.push(last + num_steps);
    }
    samples.push(nodes[nodes.len() - 1].clone());
    KPath::new(samples, point_indices, point_labels)
}
