//! One-dimensional data series `y = f(x)`, possibly with several columns.

use serde::{Deserialize, Serialize};

use crate::array::Array2;
use crate::error::{Result, ResultsError};

/// Axis and channel labels carried along with computed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub variable: String,
    pub data: String,
    pub columns: String,
    pub title: String,
    pub orbitals: Vec<String>,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            variable: "x".to_string(),
            data: "y".to_string(),
            columns: String::new(),
            title: String::new(),
            orbitals: Vec::new(),
        }
    }
}

impl Labels {
    pub fn new(variable: &str, data: &str) -> Self {
        Self {
            variable: variable.to_string(),
            data: data.to_string(),
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn with_orbitals(mut self, orbitals: Vec<String>) -> Self {
        self.orbitals = orbitals;
        self
    }
}

pub(crate) fn numbered(count: usize) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}

/// A series of data points sharing one independent variable.
///
/// `data` is `(variable.len(), n_columns)`; a plain function of `x` is a
/// single column with no orbital labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub variable: Vec<f64>,
    pub data: Array2<f64>,
    pub labels: Labels,
}

impl Series {
    pub fn new(variable: Vec<f64>, data: Array2<f64>, labels: Labels) -> Result<Self> {
        if data.rows() != variable.len() {
            return Err(ResultsError::shape(format!(
                "series has {} variable samples but {} data rows",
                variable.len(),
                data.rows()
            )));
        }
        let mut labels = labels;
        if labels.orbitals.is_empty() && data.cols() > 1 {
            labels.orbitals = numbered(data.cols());
        }
        Ok(Self {
            variable,
            data,
            labels,
        })
    }

    /// Single-column series.
    pub fn from_column(variable: Vec<f64>, column: Vec<f64>, labels: Labels) -> Result<Self> {
        let data = Array2::from_vec(column.len(), 1, column)?;
        Self::new(variable, data, labels)
    }

    pub fn num_columns(&self) -> usize {
        self.data.cols()
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.data.rows()).map(|row| *self.data.get(row, col)).collect()
    }

    /// Copy of this series carrying different data.
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self> {
        Self::new(self.variable.clone(), data, self.labels.clone())
    }

    pub fn add(&self, other: &Series) -> Result<Self> {
        self.combine(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Series) -> Result<Self> {
        self.combine(other, |a, b| a - b)
    }

    /// Elementwise combination; a single-column side is broadcast across the
    /// columns of the other and the wider side keeps its labels.
    fn combine(&self, other: &Series, op: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let rows = self.data.rows();
        if other.data.rows() != rows {
            return Err(ResultsError::shape(format!(
                "cannot combine series of length {rows} and {}",
                other.data.rows()
            )));
        }
        let (lhs_cols, rhs_cols) = (self.num_columns(), other.num_columns());
        let (cols, reference) = if lhs_cols == rhs_cols {
            (lhs_cols, self)
        } else if lhs_cols == 1 {
            (rhs_cols, other)
        } else if rhs_cols == 1 {
            (lhs_cols, self)
        } else {
            return Err(ResultsError::shape(format!(
                "cannot broadcast {lhs_cols} columns against {rhs_cols}"
            )));
        };
        let mut out = Array2::from_elem(rows, cols, 0.0);
        for row in 0..rows {
            for col in 0..cols {
                let a = *self.data.get(row, col.min(lhs_cols - 1));
                let b = *other.data.get(row, col.min(rhs_cols - 1));
                *out.get_mut(row, col) = op(a, b);
            }
        }
        reference.with_data(out)
    }

    /// Sum columns together.
    ///
    /// `columns[i]` is the output column that input column `i` is added to.
    /// Without `columns`, or when every entry is zero, everything is summed
    /// into a single unlabelled column. Output columns nobody maps into are
    /// filled with `fill_other`.
    pub fn reduced(
        &self,
        columns: Option<&[usize]>,
        orbitals: Option<Vec<String>>,
        fill_other: f64,
    ) -> Result<Self> {
        let plan = ColumnReduction::plan(self.num_columns(), columns, &self.labels.orbitals, orbitals)?;
        let rows = self.data.rows();
        let mut data = Array2::from_elem(rows, plan.width, fill_other);
        for target in plan.targets() {
            for row in 0..rows {
                *data.get_mut(row, target) = plan
                    .sources(target)
                    .map(|src| *self.data.get(row, src))
                    .sum();
            }
        }
        let mut out = self.with_data(data)?;
        out.labels.orbitals = plan.orbitals;
        Ok(out)
    }
}

/// Shared bookkeeping for column reductions of series and fat bands.
pub(crate) struct ColumnReduction {
    pub(crate) map: Vec<usize>,
    pub(crate) width: usize,
    pub(crate) orbitals: Vec<String>,
}

impl ColumnReduction {
    pub(crate) fn plan(
        n_cols: usize,
        columns: Option<&[usize]>,
        current: &[String],
        orbitals: Option<Vec<String>>,
    ) -> Result<Self> {
        let map = match columns {
            Some(cols) if cols.len() != n_cols => {
                return Err(ResultsError::config(format!(
                    "{} column targets given for {n_cols} columns",
                    cols.len()
                )));
            }
            Some(cols) => cols.to_vec(),
            None => vec![0; n_cols],
        };
        if map.iter().all(|&c| c == 0) {
            return Ok(Self {
                map,
                width: 1,
                orbitals: Vec::new(),
            });
        }
        let width = map.iter().max().map_or(1, |m| m + 1);
        let orbitals = match orbitals {
            Some(list) => list,
            None => {
                let mut list = numbered(width);
                for (target, name) in list.iter_mut().enumerate() {
                    if let Some(first) = map.iter().position(|&c| c == target) {
                        if let Some(label) = current.get(first) {
                            *name = label.clone();
                        }
                    }
                }
                list
            }
        };
        Ok(Self {
            map,
            width,
            orbitals,
        })
    }

    /// Output columns that receive at least one input column.
    pub(crate) fn targets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).filter(move |t| self.map.contains(t))
    }

    pub(crate) fn sources(&self, target: usize) -> impl Iterator<Item = usize> + '_ {
        self.map
            .iter()
            .enumerate()
            .filter(move |(_, c)| **c == target)
            .map(|(src, _)| src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column() -> Series {
        let data = Array2::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        Series::new(
            vec![0.0, 1.0],
            data,
            Labels::new("E", "LDOS").with_orbitals(vec!["A".into(), "B".into()]),
        )
        .unwrap()
    }

    #[test]
    fn single_column_broadcasts_against_wider_series() {
        let wide = two_column();
        let narrow = Series::from_column(vec![0.0, 1.0], vec![10.0, 20.0], Labels::default()).unwrap();
        let sum = narrow.add(&wide).unwrap();
        assert_eq!(sum.data.row(0), &[11.0, 12.0]);
        assert_eq!(sum.data.row(1), &[23.0, 24.0]);
        assert_eq!(sum.labels.orbitals, vec!["A".to_string(), "B".to_string()]);

        let diff = wide.sub(&narrow).unwrap();
        assert_eq!(diff.data.row(1), &[-17.0, -16.0]);
    }

    #[test]
    fn incompatible_columns_fail() {
        let wide = two_column();
        let three = Series::new(
            vec![0.0, 1.0],
            Array2::from_elem(2, 3, 0.0),
            Labels::default(),
        )
        .unwrap();
        assert!(matches!(wide.add(&three), Err(ResultsError::Shape(_))));
    }

    #[test]
    fn reduced_without_columns_sums_everything() {
        let reduced = two_column().reduced(None, None, 0.0).unwrap();
        assert_eq!(reduced.num_columns(), 1);
        assert_eq!(reduced.column(0), vec![3.0, 7.0]);
        assert!(reduced.labels.orbitals.is_empty());
    }

    #[test]
    fn reduced_moves_columns_and_fills_gaps() {
        let reduced = two_column().reduced(Some(&[2, 2]), None, -1.0).unwrap();
        assert_eq!(reduced.num_columns(), 3);
        assert_eq!(reduced.data.row(0), &[-1.0, -1.0, 3.0]);
        assert_eq!(
            reduced.labels.orbitals,
            vec!["0".to_string(), "1".to_string(), "A".to_string()]
        );
    }

    #[test]
    fn reduced_rejects_wrong_column_count() {
        let err = two_column().reduced(Some(&[1]), None, 0.0).unwrap_err();
        assert!(matches!(err, ResultsError::Configuration(_)));
    }
}
