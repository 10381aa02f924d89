use candle_core::{Device, Tensor};
use chrono::NaiveDate;
use ndarray::Array2;

use super::dataset::{to_tensors, Window};
use super::model::Seq2SeqForecaster;
use super::scaler::MinMaxScaler;
use crate::error::{ForecastError, Result};
use crate::types::{CurrencyPair, Forecast};

/// Scaled model outputs for each window, one row per window
pub fn predict_windows(
    model: &Seq2SeqForecaster,
    windows: &[Window],
    batch_size: usize,
    device: &Device,
) -> Result<Array2<f64>> {
    let horizon = model.params().future_days;
    let mut flat = Vec::with_capacity(windows.len() * horizon);

    for batch in windows.chunks(batch_size.max(1)) {
        let (x, _) = to_tensors(batch, device)?;
        let rows: Vec<Vec<f32>> = model.forward_t(&x, false)?.to_vec2()?;
        flat.extend(rows.into_iter().flatten().map(f64::from));
    }

    Array2::from_shape_vec((windows.len(), horizon), flat)
        .map_err(|e| ForecastError::Model(candle_core::Error::Msg(e.to_string())))
}

/// One forward pass over the most recent `look_back` scaled values.
/// The model emits the whole horizon at once; outputs are never fed back in.
pub fn forecast_next(
    pair: &CurrencyPair,
    model: &Seq2SeqForecaster,
    scaler: &MinMaxScaler,
    scaled_history: &[f64],
    last_date: NaiveDate,
    device: &Device,
) -> Result<Forecast> {
    let look_back = model.params().look_back;
    if scaled_history.len() < look_back {
        return Err(ForecastError::InsufficientData {
            pair: pair.clone(),
            required: look_back,
            available: scaled_history.len(),
        });
    }

    let recent: Vec<f32> = scaled_history[scaled_history.len() - look_back..]
        .iter()
        .map(|&v| v as f32)
        .collect();
    let x = Tensor::from_vec(recent, (1, look_back, 1), device)?;
    let scaled: Vec<f32> = model.forward_t(&x, false)?.squeeze(0)?.to_vec1()?;

    let values = scaled.into_iter().map(|v| scaler.inverse(v as f64)).collect();
    Ok(Forecast::following(pair.clone(), last_date, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dataset::build_windows;
    use crate::ml::model::ModelParams;
    use candle_core::DType;
    use candle_nn::{VarBuilder, VarMap};

    fn model(look_back: usize, future_days: usize) -> Seq2SeqForecaster {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let params = ModelParams {
            look_back,
            future_days,
            hidden_units: 4,
            dropout: 0.2,
        };
        Seq2SeqForecaster::new(params, vb).unwrap()
    }

    #[test]
    fn test_forecast_length_and_dates() {
        let pair = CurrencyPair::new("AUD", "EUR");
        let scaler = MinMaxScaler { min: 1.4, max: 2.1 };
        let history = vec![0.5; 40];
        let last = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();

        let forecast = forecast_next(&pair, &model(20, 7), &scaler, &history, last, &Device::Cpu).unwrap();

        assert_eq!(forecast.horizon(), 7);
        assert_eq!(forecast.dates[0], NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(forecast.dates[6], NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(forecast.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forecast_requires_full_look_back() {
        let pair = CurrencyPair::new("AUD", "EUR");
        let scaler = MinMaxScaler { min: 0.0, max: 1.0 };
        let last = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let err = forecast_next(&pair, &model(20, 7), &scaler, &[0.1; 10], last, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { required: 20, available: 10, .. }));
    }

    #[test]
    fn test_predict_windows_shape() {
        let pair = CurrencyPair::new("AUD", "EUR");
        let values: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();
        let windows = build_windows(&pair, &values, 10, 4).unwrap();

        let preds = predict_windows(&model(10, 4), &windows, 7, &Device::Cpu).unwrap();
        assert_eq!(preds.dim(), (26, 4));
    }
}
