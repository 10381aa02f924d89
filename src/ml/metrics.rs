use ndarray::{Array2, ArrayView1, Axis};

use crate::types::{CurrencyPair, MetricsRecord};

pub fn mae(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    (&y_true - &y_pred).mapv(f64::abs).mean().unwrap_or(0.0)
}

pub fn rmse(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    (&y_true - &y_pred).mapv(|e| e * e).mean().unwrap_or(0.0).sqrt()
}

/// Coefficient of determination. A constant truth scores 1.0 if matched exactly, else 0.0.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Score each validation window (one row per window, one column per forecast day)
/// and average the per-window scores.
pub fn evaluate_windows(pair: &CurrencyPair, y_true: &Array2<f64>, y_pred: &Array2<f64>) -> MetricsRecord {
    let n = y_true.len_of(Axis(0)).max(1) as f64;
    let mut totals = (0.0, 0.0, 0.0);

    for (t, p) in y_true.axis_iter(Axis(0)).zip(y_pred.axis_iter(Axis(0))) {
        totals.0 += mae(t, p);
        totals.1 += rmse(t, p);
        totals.2 += r2_score(t, p);
    }

    MetricsRecord {
        currency: pair.label(),
        mae: totals.0 / n,
        rmse: totals.1 / n,
        r2: totals.2 / n,
    }
}
