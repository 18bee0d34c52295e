//! Interpretable Multi-Head Attention
//!
//! Heads have their own query/key projections but share one value
//! projection, so the head-averaged weights can be read as a single
//! attention pattern over time.

use super::{random_matrix, softmax};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;

/// Attention helpers
pub struct Attention;

impl Attention {
    /// Causal mask: query `i` may see key `j` iff `j <= i + offset`
    ///
    /// With queries being the last `num_queries` positions of a sequence of
    /// `num_keys`, pass `offset = num_keys - num_queries`.
    pub fn causal_mask(num_queries: usize, num_keys: usize, offset: usize) -> Array2<bool> {
        Array2::from_shape_fn((num_queries, num_keys), |(i, j)| j <= i + offset)
    }

    /// Scaled dot-product weights for one head, shape (queries, keys)
    pub fn scaled_dot_product(
        q: &Array2<f64>,
        k: &Array2<f64>,
        mask: Option<&Array2<bool>>,
    ) -> Array2<f64> {
        let scale = (q.ncols().max(1) as f64).sqrt();
        let mut scores = q.dot(&k.t()) / scale;

        if let Some(mask) = mask {
            scores.zip_mut_with(mask, |s, &visible| {
                if !visible {
                    *s = f64::NEG_INFINITY;
                }
            });
        }

        let mut weights = Array2::zeros(scores.dim());
        for (i, row) in scores.rows().into_iter().enumerate() {
            weights.row_mut(i).assign(&softmax(&row.to_owned()));
        }
        weights
    }
}

/// Multi-head attention with a shared value projection
#[derive(Debug, Clone)]
pub struct InterpretableMultiHeadAttention {
    hidden_size: usize,
    num_heads: usize,
    head_dim: usize,
    /// Per-head query projections, each (hidden, head_dim)
    w_q: Vec<Array2<f64>>,
    /// Per-head key projections, each (hidden, head_dim)
    w_k: Vec<Array2<f64>>,
    /// Shared value projection (hidden, head_dim)
    w_v: Array2<f64>,
    /// Output projection (head_dim, hidden)
    w_o: Array2<f64>,
}

impl InterpretableMultiHeadAttention {
    pub fn new(hidden_size: usize, num_heads: usize, rng: &mut StdRng) -> Self {
        let num_heads = num_heads.max(1);
        let head_dim = (hidden_size / num_heads).max(1);
        let scale = (2.0 / (hidden_size + head_dim) as f64).sqrt();

        let w_q = (0..num_heads)
            .map(|_| random_matrix(hidden_size, head_dim, scale, rng))
            .collect();
        let w_k = (0..num_heads)
            .map(|_| random_matrix(hidden_size, head_dim, scale, rng))
            .collect();
        let w_v = random_matrix(hidden_size, head_dim, scale, rng);
        let w_o = random_matrix(head_dim, hidden_size, scale, rng);

        Self {
            hidden_size,
            num_heads,
            head_dim,
            w_q,
            w_k,
            w_v,
            w_o,
        }
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Attends `queries` (Tq, hidden) over `keys_values` (Tk, hidden)
    ///
    /// Returns the output (Tq, hidden) and the head-averaged weights (Tq, Tk).
    pub fn forward(
        &self,
        queries: &Array2<f64>,
        keys_values: &Array2<f64>,
        mask: Option<&Array2<bool>>,
    ) -> (Array2<f64>, Array2<f64>) {
        let v = keys_values.dot(&self.w_v);
        let mut head_sum = Array2::<f64>::zeros((queries.nrows(), self.head_dim));
        let mut weight_sum = Array2::<f64>::zeros((queries.nrows(), keys_values.nrows()));

        for (w_q, w_k) in self.w_q.iter().zip(&self.w_k) {
            let q = queries.dot(w_q);
            let k = keys_values.dot(w_k);
            let weights = Attention::scaled_dot_product(&q, &k, mask);

            head_sum += &weights.dot(&v);
            weight_sum += &weights;
        }

        let heads = self.num_heads as f64;
        let output = (head_sum / heads).dot(&self.w_o);
        (output, weight_sum / heads)
    }

    /// Mean attention each key position receives
    pub fn attention_profile(weights: &Array2<f64>) -> Array1<f64> {
        weights
            .mean_axis(ndarray::Axis(0))
            .unwrap_or_else(|| Array1::zeros(weights.ncols()))
    }

    pub fn num_parameters(&self) -> usize {
        let qk: usize = self.w_q.iter().chain(&self.w_k).map(|w| w.len()).sum();
        qk + self.w_v.len() + self.w_o.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_causal_mask() {
        let mask = Attention::causal_mask(3, 5, 2);

        assert_eq!(mask.shape(), &[3, 5]);
        assert!(mask[[0, 2]]);
        assert!(!mask[[0, 3]]);
        assert!(mask[[2, 4]]);
    }

    #[test]
    fn test_weights_respect_mask() {
        let mut rng = StdRng::seed_from_u64(11);
        let attn = InterpretableMultiHeadAttention::new(8, 2, &mut rng);

        let keys = Array2::from_shape_fn((6, 8), |(t, j)| ((t + j) as f64 * 0.3).sin());
        let queries = keys.slice(ndarray::s![4.., ..]).to_owned();
        let mask = Attention::causal_mask(2, 6, 4);

        let (output, weights) = attn.forward(&queries, &keys, Some(&mask));

        assert_eq!(output.shape(), &[2, 8]);
        assert_eq!(weights.shape(), &[2, 6]);
        assert_eq!(weights[[0, 5]], 0.0);
        for row in weights.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_attention_profile() {
        let weights = Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.5, 0.5]).unwrap();
        let profile = InterpretableMultiHeadAttention::attention_profile(&weights);
        assert_relative_eq!(profile[0], 0.75);
        assert_relative_eq!(profile[1], 0.25);
    }

    #[test]
    fn test_num_parameters() {
        let mut rng = StdRng::seed_from_u64(11);
        let attn = InterpretableMultiHeadAttention::new(8, 2, &mut rng);
        // 2 heads * (q + k) * 8*4 + v 8*4 + o 4*8
        assert_eq!(attn.num_parameters(), 2 * 2 * 32 + 32 + 32);
        assert_eq!(attn.num_heads(), 2);
    }
}
