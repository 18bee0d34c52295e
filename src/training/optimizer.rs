//! Optimizers and learning-rate schedules for the quantile head

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Optimizer trait for parameter updates
pub trait Optimizer {
    /// Update weights given gradients
    fn update_weights(&mut self, weights: &mut Array2<f64>, gradients: &Array2<f64>);

    /// Update biases given gradients
    fn update_biases(&mut self, biases: &mut Array2<f64>, gradients: &Array2<f64>);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Reset optimizer state (for a new training run)
    fn reset(&mut self);
}

/// Adam with decoupled weight decay
///
/// Decay is applied to the weights only, never to the horizon biases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamW {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    #[serde(skip)]
    t: i32,
    #[serde(skip)]
    m_w: Option<Array2<f64>>,
    #[serde(skip)]
    v_w: Option<Array2<f64>>,
    #[serde(skip)]
    m_b: Option<Array2<f64>>,
    #[serde(skip)]
    v_b: Option<Array2<f64>>,
}

impl AdamW {
    pub fn new(learning_rate: f64, weight_decay: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            t: 0,
            m_w: None,
            v_w: None,
            m_b: None,
            v_b: None,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Bias-corrected Adam step for one parameter tensor
    fn adam_step(
        &self,
        params: &mut Array2<f64>,
        gradients: &Array2<f64>,
        m: &mut Array2<f64>,
        v: &mut Array2<f64>,
    ) {
        *m = &*m * self.beta1 + gradients * (1.0 - self.beta1);
        *v = &*v * self.beta2 + &(gradients * gradients) * (1.0 - self.beta2);

        let m_hat = &*m / (1.0 - self.beta1.powi(self.t));
        let v_hat = &*v / (1.0 - self.beta2.powi(self.t));

        *params = &*params - &(&m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon));
    }
}

impl Optimizer for AdamW {
    fn update_weights(&mut self, weights: &mut Array2<f64>, gradients: &Array2<f64>) {
        self.t += 1;

        // Decoupled weight decay
        if self.weight_decay > 0.0 {
            weights.mapv_inplace(|w| w * (1.0 - self.learning_rate * self.weight_decay));
        }

        let mut m = self
            .m_w
            .take()
            .unwrap_or_else(|| Array2::zeros(weights.dim()));
        let mut v = self
            .v_w
            .take()
            .unwrap_or_else(|| Array2::zeros(weights.dim()));
        self.adam_step(weights, gradients, &mut m, &mut v);
        self.m_w = Some(m);
        self.v_w = Some(v);
    }

    fn update_biases(&mut self, biases: &mut Array2<f64>, gradients: &Array2<f64>) {
        // Shares the step counter advanced by update_weights
        self.t = self.t.max(1);

        let mut m = self
            .m_b
            .take()
            .unwrap_or_else(|| Array2::zeros(biases.dim()));
        let mut v = self
            .v_b
            .take()
            .unwrap_or_else(|| Array2::zeros(biases.dim()));
        self.adam_step(biases, gradients, &mut m, &mut v);
        self.m_b = Some(m);
        self.v_b = Some(v);
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m_w = None;
        self.v_w = None;
        self.m_b = None;
        self.v_b = None;
    }
}

/// Cosine annealing of the learning rate
///
/// `lr(epoch) = eta_min + (base - eta_min) * (1 + cos(pi * epoch / t_max)) / 2`.
/// Past `t_max` the cosine keeps going, so the rate rises back towards `base`
/// with period `2 * t_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosineAnnealing {
    pub base_lr: f64,
    pub eta_min: f64,
    pub t_max: usize,
}

impl CosineAnnealing {
    pub fn new(base_lr: f64, t_max: usize) -> Self {
        Self {
            base_lr,
            eta_min: 0.0,
            t_max: t_max.max(1),
        }
    }

    pub fn with_eta_min(mut self, eta_min: f64) -> Self {
        self.eta_min = eta_min;
        self
    }

    /// Learning rate for a 0-based epoch
    pub fn learning_rate(&self, epoch: usize) -> f64 {
        let phase = PI * epoch as f64 / self.t_max as f64;
        self.eta_min + (self.base_lr - self.eta_min) * (1.0 + phase.cos()) / 2.0
    }
}

/// Scales the gradients in place so their joint L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(gradients: &mut [&mut Array2<f64>], max_norm: f64) -> f64 {
    let total_norm = gradients
        .iter()
        .map(|g| g.iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        .sqrt();

    if total_norm > max_norm && total_norm > 0.0 {
        let scale = max_norm / total_norm;
        for g in gradients.iter_mut() {
            g.mapv_inplace(|v| v * scale);
        }
    }

    total_norm
}
