use candle_core::{Device, Tensor};

use crate::error::{ForecastError, Result};
use crate::types::CurrencyPair;

/// `look_back` inputs followed directly by `future_days` targets.
/// `start` is the index of the first input value in the source series.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub start: usize,
    pub input: Vec<f64>,
    pub target: Vec<f64>,
}

impl Window {
    /// Index of the first target value
    pub fn target_start(&self) -> usize {
        self.start + self.input.len()
    }

    /// Index one past the last target value
    pub fn end(&self) -> usize {
        self.target_start() + self.target.len()
    }
}

/// Slide a step of 1 over `values`, in temporal order.
///
/// Yields `len - look_back - future_days` windows; a series shorter than
/// `look_back + future_days` is rejected.
pub fn build_windows(
    pair: &CurrencyPair,
    values: &[f64],
    look_back: usize,
    future_days: usize,
) -> Result<Vec<Window>> {
    let required = look_back + future_days;
    if values.len() < required {
        return Err(ForecastError::InsufficientData {
            pair: pair.clone(),
            required,
            available: values.len(),
        });
    }

    let count = values.len() - required;
    let windows = (0..count)
        .map(|start| Window {
            start,
            input: values[start..start + look_back].to_vec(),
            target: values[start + look_back..start + required].to_vec(),
        })
        .collect();

    Ok(windows)
}

/// Contiguous train/validation split: validation is always the most recent windows
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Vec<Window>,
    pub validation: Vec<Window>,
}

pub fn split_windows(mut windows: Vec<Window>, validation_split: f64) -> DatasetSplit {
    let split_at = ((windows.len() as f64) * (1.0 - validation_split)).floor() as usize;
    let validation = windows.split_off(split_at.min(windows.len()));
    DatasetSplit {
        train: windows,
        validation,
    }
}

/// Stack windows into `x: (batch, look_back, 1)` and `y: (batch, future_days)`
pub fn to_tensors(windows: &[Window], device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
    let batch = windows.len();
    let look_back = windows.first().map(|w| w.input.len()).unwrap_or(0);
    let horizon = windows.first().map(|w| w.target.len()).unwrap_or(0);

    let x: Vec<f32> = windows.iter().flat_map(|w| w.input.iter().map(|&v| v as f32)).collect();
    let y: Vec<f32> = windows.iter().flat_map(|w| w.target.iter().map(|&v| v as f32)).collect();

    let x = Tensor::from_vec(x, (batch, look_back, 1), device)?;
    let y = Tensor::from_vec(y, (batch, horizon), device)?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> CurrencyPair {
        CurrencyPair::new("USD", "EUR")
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_window_count() {
        for (len, look_back, future) in [(1200, 1000, 30), (50, 10, 5), (15, 10, 5)] {
            let windows = build_windows(&pair(), &ramp(len), look_back, future).unwrap();
            assert_eq!(windows.len(), len - look_back - future);
        }
    }

    #[test]
    fn test_long_series_scenario() {
        let windows = build_windows(&pair(), &ramp(1200), 1000, 30).unwrap();
        assert_eq!(windows.len(), 170);
        assert!(windows.iter().all(|w| w.input.len() == 1000 && w.target.len() == 30));
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let err = build_windows(&pair(), &ramp(500), 1000, 30).unwrap_err();
        match err {
            ForecastError::InsufficientData { required, available, .. } => {
                assert_eq!(required, 1030);
                assert_eq!(available, 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_input_and_target_are_adjacent() {
        let windows = build_windows(&pair(), &ramp(20), 5, 3).unwrap();
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.start, i);
            assert_eq!(w.input, ramp(20)[i..i + 5].to_vec());
            assert_eq!(w.target[0], w.input[4] + 1.0);
            assert_eq!(w.end(), i + 8);
        }
    }

    #[test]
    fn test_split_is_temporally_contiguous() {
        let windows = build_windows(&pair(), &ramp(137), 10, 4).unwrap();
        let total = windows.len();
        let split = split_windows(windows, 0.2);

        assert_eq!(split.train.len() + split.validation.len(), total);
        assert_eq!(split.train.len(), (total as f64 * 0.8).floor() as usize);

        let last_train_start = split.train.iter().map(|w| w.start).max().unwrap();
        assert!(split.validation.iter().all(|w| w.start > last_train_start));
        assert!(split.validation.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_tensor_shapes() {
        let windows = build_windows(&pair(), &ramp(30), 6, 2).unwrap();
        let (x, y) = to_tensors(&windows[..4], &Device::Cpu).unwrap();
        assert_eq!(x.dims(), &[4, 6, 1]);
        assert_eq!(y.dims(), &[4, 2]);
        let first: Vec<f32> = y.get(0).unwrap().to_vec1().unwrap();
        assert_eq!(first, vec![6.0, 7.0]);
    }
}
