use serde::{Deserialize, Serialize};

/// Min-max transform into [0, 1], fit on one currency's full history.
/// Stored next to the model so predictions can be mapped back to rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    /// Returns `None` for an empty slice
    pub fn fit(values: &[f64]) -> Option<Self> {
        let min = values.iter().copied().reduce(f64::min)?;
        let max = values.iter().copied().reduce(f64::max)?;
        Some(Self { min, max })
    }

    fn range(&self) -> f64 {
        self.max - self.min
    }

    /// A constant series maps to 0
    pub fn scale(&self, value: f64) -> f64 {
        let range = self.range();
        if range.abs() < f64::EPSILON {
            0.0
        } else {
            (value - self.min) / range
        }
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn scale_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.scale(v)).collect()
    }

    pub fn inverse_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scaled_range_is_unit_interval() {
        let values = vec![1.18, 0.83, 1.6, 1.07, 1.25];
        let scaler = MinMaxScaler::fit(&values).unwrap();
        let scaled = scaler.scale_all(&values);

        assert_relative_eq!(scaled[1], 0.0);
        assert_relative_eq!(scaled[2], 1.0);
        assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_inverse_restores_values() {
        let values: Vec<f64> = (0..500).map(|i| 0.8 + (i as f64 * 0.37).sin() * 0.3).collect();
        let scaler = MinMaxScaler::fit(&values).unwrap();
        let restored = scaler.inverse_all(&scaler.scale_all(&values));
        for (orig, back) in values.iter().zip(&restored) {
            assert_relative_eq!(orig, back, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_series() {
        let scaler = MinMaxScaler::fit(&[1.5, 1.5, 1.5]).unwrap();
        assert_eq!(scaler.scale(1.5), 0.0);
        assert_eq!(scaler.inverse(0.0), 1.5);
    }

    #[test]
    fn test_empty_series_has_no_scaler() {
        assert!(MinMaxScaler::fit(&[]).is_none());
    }
}
