//! # Model Module
//!
//! Temporal Fusion Transformer: variable selection, LSTM encoder/decoder,
//! interpretable attention and a quantile head.

mod attention;
mod config;
mod grn;
mod head;
mod losses;
mod lstm;
mod tft;
mod vsn;

pub use attention::{Attention, InterpretableMultiHeadAttention};
pub use config::TFTConfig;
pub use grn::{GateAddNorm, GatedResidualNetwork};
pub use head::QuantileHead;
pub use losses::{ForecastMetrics, QuantileLoss, QuantilePrediction};
pub use lstm::{LstmLayer, LstmState, StackedLstm};
pub use tft::{Interpretation, TFTModel};
pub use vsn::{VariableImportance, VariableSelectionNetwork};

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Matrix with N(0, scale^2) entries
pub(crate) fn random_matrix(rows: usize, cols: usize, scale: f64, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| {
        let z: f64 = rng.sample(StandardNormal);
        z * scale
    })
}

pub(crate) fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Layer normalization with learned gain and bias
pub(crate) fn layer_norm(x: &Array1<f64>, gamma: &Array1<f64>, beta: &Array1<f64>) -> Array1<f64> {
    let mean = x.mean().unwrap_or(0.0);
    let variance = x.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(1.0);
    let std = (variance + 1e-6).sqrt();

    let normalized = x.mapv(|v| (v - mean) / std);
    &normalized * gamma + beta
}

/// Numerically stable softmax
pub(crate) fn softmax(x: &Array1<f64>) -> Array1<f64> {
    let max_val = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max_val.is_finite() {
        return Array1::from_elem(x.len(), 1.0 / x.len().max(1) as f64);
    }
    let exp_vals = x.mapv(|v| (v - max_val).exp());
    let sum = exp_vals.sum();
    exp_vals / sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_softmax() {
        let x = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let result = softmax(&x);

        assert_relative_eq!(result.sum(), 1.0, epsilon = 1e-12);
        assert!(result[2] > result[1]);
        assert!(result[1] > result[0]);
    }

    #[test]
    fn test_softmax_masked_entries() {
        let x = Array1::from_vec(vec![0.0, f64::NEG_INFINITY, 0.0]);
        let result = softmax(&x);
        assert_relative_eq!(result[0], 0.5);
        assert_eq!(result[1], 0.0);
    }

    #[test]
    fn test_random_matrix_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = random_matrix(200, 50, 0.1, &mut rng);
        let std = m.std(0.0);
        assert!((std - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_layer_norm() {
        let x = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let out = layer_norm(&x, &Array1::ones(4), &Array1::zeros(4));
        assert_relative_eq!(out.mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(out.std(0.0), 1.0, epsilon = 1e-5);
    }
}
