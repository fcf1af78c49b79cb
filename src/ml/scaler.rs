//! Per-feature min-max scaling

use serde::{Deserialize, Serialize};

use super::ModelError;

/// Rescales each feature column independently to [0, 1] using the min and max
/// observed at fit time. A constant column has its range treated as 1, so it
/// maps to 0 and inverts back exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let first = rows
            .first()
            .ok_or_else(|| ModelError::InsufficientData("cannot fit a scaler on no rows".into()))?;
        let width = first.len();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];

        for row in rows {
            if row.len() != width {
                return Err(ModelError::shape(format!("{width} features"), row.len()));
            }
            for (j, &value) in row.iter().enumerate() {
                min[j] = min[j].min(value);
                max[j] = max[j].max(value);
            }
        }
        Ok(Self { min, max })
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    fn range(&self, j: usize) -> f64 {
        let range = self.max[j] - self.min[j];
        if range.abs() < f64::EPSILON {
            1.0
        } else {
            range
        }
    }

    fn check_width(&self, row: &[f64]) -> Result<(), ModelError> {
        if row.len() != self.width() {
            return Err(ModelError::shape(format!("{} features", self.width()), row.len()));
        }
        Ok(())
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.min[j]) / self.range(j))
            .collect())
    }

    pub fn inverse_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, v)| v * self.range(j) + self.min[j])
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn inverse(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.inverse_row(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_and_transform() {
        let scaler = MinMaxScaler::fit(&[vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]]).unwrap();
        assert_eq!(scaler.transform_row(&[5.0, 30.0]).unwrap(), vec![0.5, 1.0]);
        assert_eq!(scaler.inverse_row(&[0.5, 0.0]).unwrap(), vec![5.0, 10.0]);
    }

    #[test]
    fn test_constant_column() {
        let scaler = MinMaxScaler::fit(&[vec![7.0], vec![7.0]]).unwrap();
        assert_eq!(scaler.transform_row(&[7.0]).unwrap(), vec![0.0]);
        assert_eq!(scaler.inverse_row(&[0.0]).unwrap(), vec![7.0]);
    }

    #[test]
    fn test_width_checks() {
        assert!(MinMaxScaler::fit(&[]).is_err());
        assert!(MinMaxScaler::fit(&[vec![1.0, 2.0], vec![1.0]]).is_err());
        let scaler = MinMaxScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_fitted_range(
            rows in prop::collection::vec(prop::collection::vec(-1e4f64..1e4, 3), 2..20),
            pick in 0usize..20,
            t in prop::collection::vec(0.0f64..=1.0, 3),
        ) {
            let scaler = MinMaxScaler::fit(&rows).unwrap();
            let base = &rows[pick % rows.len()];
            // A point inside the fitted box
            let x: Vec<f64> = (0..3)
                .map(|j| scaler.min()[j] + t[j] * (scaler.max()[j] - scaler.min()[j]))
                .collect();
            for candidate in [base.clone(), x] {
                let back = scaler.inverse_row(&scaler.transform_row(&candidate).unwrap()).unwrap();
                for (a, b) in candidate.iter().zip(&back) {
                    prop_assert!((a - b).abs() <= 1e-9 * (1.0 + a.abs()));
                }
            }
        }
    }
}
