//! Lattice-site bookkeeping consumed by the projected-density views.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultsError};

// ============================================================================
// Sublattice labels
// ============================================================================

/// Category label for every wavefunction component, plus the ordered
/// mapping from category name to id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sublattices {
    ids: Vec<u16>,
    mapping: Vec<(String, u16)>,
}

impl Sublattices {
    pub fn new(ids: Vec<u16>, mapping: Vec<(String, u16)>) -> Result<Self> {
        for (pos, (name, id)) in mapping.iter().enumerate() {
            if mapping[..pos].iter().any(|(other, other_id)| other == name || other_id == id) {
                return Err(ResultsError::config(format!(
                    "sublattice \"{name}\" (id {id}) is listed twice"
                )));
            }
        }
        if let Some(unknown) = ids.iter().find(|id| !mapping.iter().any(|(_, m)| m == *id)) {
            return Err(ResultsError::config(format!(
                "component labelled with unmapped sublattice id {unknown}"
            )));
        }
        Ok(Self { ids, mapping })
    }

    /// Number of labelled components.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u16] {
        &self.ids
    }

    /// Category names in mapping order; this is the channel order of every
    /// grouped output.
    pub fn names(&self) -> Vec<String> {
        self.mapping.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Group index of every component, following [`names`](Self::names).
    pub fn groups(&self) -> Vec<usize> {
        self.ids
            .iter()
            .map(|id| {
                self.mapping
                    .iter()
                    .position(|(_, m)| m == id)
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn num_groups(&self) -> usize {
        self.mapping.len()
    }
}

// ============================================================================
// Structure
// ============================================================================

/// Site positions and sublattice names of a tight-binding system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    positions: Vec<[f64; 3]>,
    sublattices: Vec<String>,
}

/// Half-open `[lo, hi)` limits per axis for [`Structure::cropped`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CropLimits {
    pub x: Option<(f64, f64)>,
    pub y: Option<(f64, f64)>,
    pub z: Option<(f64, f64)>,
}

impl CropLimits {
    fn contains(&self, p: &[f64; 3]) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .zip(p)
            .all(|(limit, &v)| limit.map_or(true, |(lo, hi)| v >= lo && v < hi))
    }
}

impl Structure {
    pub fn new(positions: Vec<[f64; 3]>, sublattices: Vec<String>) -> Result<Self> {
        if positions.len() != sublattices.len() {
            return Err(ResultsError::shape(format!(
                "{} positions but {} sublattice labels",
                positions.len(),
                sublattices.len()
            )));
        }
        Ok(Self {
            positions,
            sublattices,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    pub fn sublattices(&self) -> &[String] {
        &self.sublattices
    }

    pub fn x(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p[0]).collect()
    }

    pub fn y(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p[1]).collect()
    }

    pub fn z(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p[2]).collect()
    }

    /// Index of the site closest to `position`, optionally restricted to one
    /// sublattice. Missing trailing coordinates are treated as zero.
    pub fn find_nearest(&self, position: &[f64], sublattice: Option<&str>) -> Option<usize> {
        let target = [
            position.first().copied().unwrap_or(0.0),
            position.get(1).copied().unwrap_or(0.0),
            position.get(2).copied().unwrap_or(0.0),
        ];
        self.positions
            .iter()
            .zip(&self.sublattices)
            .enumerate()
            .filter(|(_, (_, sub))| sublattice.map_or(true, |want| sub.as_str() == want))
            .map(|(idx, (p, _))| {
                let d2: f64 = p.iter().zip(&target).map(|(a, b)| (a - b) * (a - b)).sum();
                (idx, d2)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    /// Sites within the given limits, with the indices they had here.
    pub fn cropped(&self, limits: &CropLimits) -> (Structure, Vec<usize>) {
        let kept: Vec<usize> = (0..self.num_sites())
            .filter(|&idx| limits.contains(&self.positions[idx]))
            .collect();
        let structure = Structure {
            positions: kept.iter().map(|&i| self.positions[i]).collect(),
            sublattices: kept.iter().map(|&i| self.sublattices[i].clone()).collect(),
        };
        (structure, kept)
    }

    /// Attach one value per site.
    pub fn with_data(&self, data: Vec<f64>) -> Result<SpatialMap> {
        SpatialMap::new(data, self.clone())
    }
}

// ============================================================================
// SpatialMap
// ============================================================================

/// One value per lattice site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMap {
    pub data: Vec<f64>,
    pub structure: Structure,
}

impl SpatialMap {
    pub fn new(data: Vec<f64>, structure: Structure) -> Result<Self> {
        if data.len() != structure.num_sites() {
            return Err(ResultsError::shape(format!(
                "{} values for {} sites",
                data.len(),
                structure.num_sites()
            )));
        }
        Ok(Self { data, structure })
    }

    pub fn num_sites(&self) -> usize {
        self.data.len()
    }

    pub fn cropped(&self, limits: &CropLimits) -> SpatialMap {
        let (structure, kept) = self.structure.cropped(limits);
        SpatialMap {
            data: kept.iter().map(|&i| self.data[i]).collect(),
            structure,
        }
    }

    /// Copy with every value clamped to `[v_min, v_max]`.
    pub fn clipped(&self, v_min: f64, v_max: f64) -> SpatialMap {
        SpatialMap {
            data: self.data.iter().map(|v| v.clamp(v_min, v_max)).collect(),
            structure: self.structure.clone(),
        }
    }
}
