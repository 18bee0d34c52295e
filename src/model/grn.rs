//! Gated Residual Network (GRN)
//!
//! Main TFT building block: nonlinear processing with a gating
//! mechanism and a residual connection.

use super::{layer_norm, random_matrix, sigmoid};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;

/// Gated Residual Network
///
/// GRN(x, c) = LayerNorm(skip(x) + GLU(W2 * ELU(W1 * x + Wc * c + b1) + b2))
#[derive(Debug, Clone)]
pub struct GatedResidualNetwork {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub context_size: Option<usize>,

    /// First layer (input -> hidden)
    weights_1: Array2<f64>,
    bias_1: Array1<f64>,

    /// Second layer (hidden -> output * 2 for the GLU)
    weights_2: Array2<f64>,
    bias_2: Array1<f64>,

    /// Context projection (optional)
    context_weights: Option<Array2<f64>>,

    /// Skip projection when input and output sizes differ
    skip_weights: Option<Array2<f64>>,

    ln_gamma: Array1<f64>,
    ln_beta: Array1<f64>,
}

impl GatedResidualNetwork {
    /// Creates a GRN with Xavier-initialized weights
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        context_size: Option<usize>,
        rng: &mut StdRng,
    ) -> Self {
        let scale_1 = (2.0 / (input_size + hidden_size) as f64).sqrt();
        let scale_2 = (2.0 / (hidden_size + output_size * 2) as f64).sqrt();

        let weights_1 = random_matrix(hidden_size, input_size, scale_1, rng);
        let bias_1 = Array1::zeros(hidden_size);

        let weights_2 = random_matrix(output_size * 2, hidden_size, scale_2, rng);
        let bias_2 = Array1::zeros(output_size * 2);

        let context_weights = context_size.map(|cs| {
            let scale = (2.0 / (cs + hidden_size) as f64).sqrt();
            random_matrix(hidden_size, cs, scale, rng)
        });

        let skip_weights = if input_size != output_size {
            let scale = (2.0 / (input_size + output_size) as f64).sqrt();
            Some(random_matrix(output_size, input_size, scale, rng))
        } else {
            None
        };

        Self {
            input_size,
            hidden_size,
            output_size,
            context_size,
            weights_1,
            bias_1,
            weights_2,
            bias_2,
            context_weights,
            skip_weights,
            ln_gamma: Array1::ones(output_size),
            ln_beta: Array1::zeros(output_size),
        }
    }

    /// Forward pass for one vector
    pub fn forward(&self, x: &Array1<f64>, context: Option<&Array1<f64>>) -> Array1<f64> {
        let mut hidden = self.weights_1.dot(x) + &self.bias_1;

        if let (Some(c), Some(cw)) = (context, &self.context_weights) {
            hidden = hidden + cw.dot(c);
        }

        // ELU
        hidden.mapv_inplace(|v| if v > 0.0 { v } else { v.exp() - 1.0 });

        let glu_input = self.weights_2.dot(&hidden) + &self.bias_2;

        let half = self.output_size;
        let main = glu_input.slice(s![..half]);
        let gate = glu_input.slice(s![half..]).mapv(sigmoid);
        let glu_output = &main * &gate;

        let skip = match &self.skip_weights {
            Some(sw) => sw.dot(x),
            None => x.clone(),
        };

        let output = skip + glu_output;
        layer_norm(&output, &self.ln_gamma, &self.ln_beta)
    }

    /// Forward pass for every row of `x`
    pub fn forward_batch(&self, x: &Array2<f64>, context: Option<&Array1<f64>>) -> Array2<f64> {
        let mut output = Array2::zeros((x.nrows(), self.output_size));

        for (i, row) in x.rows().into_iter().enumerate() {
            let yi = self.forward(&row.to_owned(), context);
            output.row_mut(i).assign(&yi);
        }

        output
    }

    /// Number of parameters
    pub fn num_parameters(&self) -> usize {
        let mut count = self.weights_1.len() + self.bias_1.len();
        count += self.weights_2.len() + self.bias_2.len();
        if let Some(cw) = &self.context_weights {
            count += cw.len();
        }
        if let Some(sw) = &self.skip_weights {
            count += sw.len();
        }
        count + self.ln_gamma.len() + self.ln_beta.len()
    }
}

/// Gate + residual add + layer norm
///
/// GateAddNorm(x, r) = LayerNorm(r + GLU(W * x + b))
#[derive(Debug, Clone)]
pub struct GateAddNorm {
    size: usize,
    weights: Array2<f64>,
    bias: Array1<f64>,
    ln_gamma: Array1<f64>,
    ln_beta: Array1<f64>,
}

impl GateAddNorm {
    pub fn new(size: usize, rng: &mut StdRng) -> Self {
        let scale = (2.0 / (size * 3) as f64).sqrt();
        Self {
            size,
            weights: random_matrix(size * 2, size, scale, rng),
            bias: Array1::zeros(size * 2),
            ln_gamma: Array1::ones(size),
            ln_beta: Array1::zeros(size),
        }
    }

    pub fn forward(&self, x: &Array1<f64>, residual: &Array1<f64>) -> Array1<f64> {
        let glu_input = self.weights.dot(x) + &self.bias;
        let main = glu_input.slice(s![..self.size]);
        let gate = glu_input.slice(s![self.size..]).mapv(sigmoid);
        let output = residual + &(&main * &gate);
        layer_norm(&output, &self.ln_gamma, &self.ln_beta)
    }

    /// Row-wise forward over two matrices of equal shape
    pub fn forward_batch(&self, x: &Array2<f64>, residual: &Array2<f64>) -> Array2<f64> {
        let mut output = Array2::zeros(x.dim());
        for i in 0..x.nrows() {
            let yi = self.forward(&x.row(i).to_owned(), &residual.row(i).to_owned());
            output.row_mut(i).assign(&yi);
        }
        output
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.len() + self.ln_gamma.len() + self.ln_beta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_grn_forward() {
        let grn = GatedResidualNetwork::new(16, 32, 16, None, &mut rng());
        let x = Array1::from_vec(vec![0.5; 16]);
        let output = grn.forward(&x, None);

        assert_eq!(output.len(), 16);
        // Layer norm output is centered
        assert!(output.mean().unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_grn_with_context() {
        let grn = GatedResidualNetwork::new(16, 32, 16, Some(8), &mut rng());
        let x = Array1::from_vec(vec![0.5; 16]);
        let c = Array1::from_vec(vec![0.3; 8]);

        let with_context = grn.forward(&x, Some(&c));
        let without_context = grn.forward(&x, None);

        assert_eq!(with_context.len(), 16);
        assert_ne!(with_context, without_context);
    }

    #[test]
    fn test_grn_different_sizes() {
        let grn = GatedResidualNetwork::new(1, 8, 24, None, &mut rng());
        let output = grn.forward(&Array1::from_vec(vec![0.7]), None);
        assert_eq!(output.len(), 24);
    }

    #[test]
    fn test_grn_batch() {
        let grn = GatedResidualNetwork::new(16, 32, 16, None, &mut rng());
        let x = Array2::from_elem((4, 16), 0.5);
        assert_eq!(grn.forward_batch(&x, None).shape(), &[4, 16]);
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = GatedResidualNetwork::new(4, 8, 4, None, &mut rng());
        let b = GatedResidualNetwork::new(4, 8, 4, None, &mut rng());
        let x = Array1::from_vec(vec![0.1, -0.2, 0.3, 0.4]);
        assert_eq!(a.forward(&x, None), b.forward(&x, None));
    }

    #[test]
    fn test_gate_add_norm() {
        let gan = GateAddNorm::new(8, &mut rng());
        let x = Array2::from_elem((3, 8), 0.2);
        let r = Array2::from_shape_fn((3, 8), |(i, j)| (i + j) as f64 * 0.1);
        let out = gan.forward_batch(&x, &r);

        assert_eq!(out.shape(), &[3, 8]);
        assert_eq!(gan.num_parameters(), 8 * 16 + 16 + 16);
    }
}
