//! Held-out evaluation metrics.

use ndarray::ArrayView1;

pub fn mean_absolute_error(actual: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    (&actual - &predicted).mapv(f64::abs).mean().unwrap_or(0.0)
}

/// Coefficient of determination. A constant target scores 1.0 when matched exactly
/// and 0.0 otherwise.
pub fn r2_score(actual: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let Some(mean) = actual.mean() else {
        return 0.0;
    };
    let ss_res = (&actual - &predicted).mapv(|residual| residual.powi(2)).sum();
    let ss_tot = actual.mapv(|value| (value - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
