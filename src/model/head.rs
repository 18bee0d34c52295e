//! Quantile output head
//!
//! The only trained part of the model. Predicts, per horizon step and
//! quantile, the offset from the last observed normalized close:
//!
//! `pred[t, q] = anchor + W[q] · z_t + b[t, q]`

use ndarray::{Array1, Array2};

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileHead {
    /// Shape (num_quantiles, hidden_size)
    pub weights: Array2<f64>,
    /// Shape (prediction_length, num_quantiles)
    pub horizon_bias: Array2<f64>,
}

impl QuantileHead {
    /// Zero-initialized head: predicts the anchor for every quantile
    pub fn new(hidden_size: usize, prediction_length: usize, num_quantiles: usize) -> Self {
        Self {
            weights: Array2::zeros((num_quantiles, hidden_size)),
            horizon_bias: Array2::zeros((prediction_length, num_quantiles)),
        }
    }

    pub fn num_quantiles(&self) -> usize {
        self.weights.nrows()
    }

    /// Predictions for one window
    ///
    /// `z` holds the decoder embeddings, shape (prediction_length, hidden_size).
    pub fn forward(&self, z: &Array2<f64>, anchor: f64) -> Array2<f64> {
        z.dot(&self.weights.t()) + &self.horizon_bias + anchor
    }

    /// Parameter gradients given dL/dpred for one window
    ///
    /// Returns (dW, db) with the shapes of `weights` and `horizon_bias`.
    pub fn gradients(&self, z: &Array2<f64>, grad_pred: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        (grad_pred.t().dot(z), grad_pred.clone())
    }

    /// Learned spread between the outer quantiles, per horizon step
    pub fn bias_spread(&self) -> Array1<f64> {
        let last = self.num_quantiles().saturating_sub(1);
        Array1::from_iter(
            self.horizon_bias
                .rows()
                .into_iter()
                .map(|row| row[last] - row[0]),
        )
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.horizon_bias.len()
    }
}
