//! LSTM encoder/decoder layers

use super::{random_matrix, sigmoid};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;

/// Final hidden and cell state of one layer
#[derive(Debug, Clone, PartialEq)]
pub struct LstmState {
    pub h: Array1<f64>,
    pub c: Array1<f64>,
}

impl LstmState {
    pub fn zeros(hidden_size: usize) -> Self {
        Self {
            h: Array1::zeros(hidden_size),
            c: Array1::zeros(hidden_size),
        }
    }
}

/// Single LSTM layer
#[derive(Debug, Clone)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,

    // Gates: [input, forget, cell, output]
    weight_ih: Array2<f64>, // (4*hidden, input)
    weight_hh: Array2<f64>, // (4*hidden, hidden)
    bias: Array1<f64>,      // (4*hidden)
}

impl LstmLayer {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let scale = (1.0 / hidden_size as f64).sqrt();

        let weight_ih = random_matrix(4 * hidden_size, input_size, scale, rng);
        let weight_hh = random_matrix(4 * hidden_size, hidden_size, scale, rng);

        // Forget gate bias starts at 1 so the state is carried over long windows
        let mut bias = Array1::zeros(4 * hidden_size);
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            weight_ih,
            weight_hh,
            bias,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Runs the sequence from `initial` (zeros when `None`)
    ///
    /// Returns the hidden state at every step and the final state.
    pub fn forward(
        &self,
        inputs: &Array2<f64>,
        initial: Option<&LstmState>,
    ) -> (Array2<f64>, LstmState) {
        let h = self.hidden_size;
        let mut outputs = Array2::zeros((inputs.nrows(), h));

        let mut state = initial
            .cloned()
            .unwrap_or_else(|| LstmState::zeros(h));

        for (t, xt) in inputs.rows().into_iter().enumerate() {
            // Gates = W_ih * x + W_hh * h + b
            let gates = self.weight_ih.dot(&xt) + self.weight_hh.dot(&state.h) + &self.bias;

            let i = gates.slice(s![0..h]).mapv(sigmoid);
            let f = gates.slice(s![h..2 * h]).mapv(sigmoid);
            let g = gates.slice(s![2 * h..3 * h]).mapv(f64::tanh);
            let o = gates.slice(s![3 * h..4 * h]).mapv(sigmoid);

            state.c = &f * &state.c + &i * &g;
            state.h = &o * &state.c.mapv(f64::tanh);

            outputs.row_mut(t).assign(&state.h);
        }

        (outputs, state)
    }

    pub fn num_parameters(&self) -> usize {
        self.weight_ih.len() + self.weight_hh.len() + self.bias.len()
    }
}

/// Stack of LSTM layers; layer `k` reads the outputs of layer `k - 1`
#[derive(Debug, Clone)]
pub struct StackedLstm {
    layers: Vec<LstmLayer>,
}

impl StackedLstm {
    pub fn new(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut StdRng) -> Self {
        let layers = (0..num_layers.max(1))
            .map(|k| {
                let input = if k == 0 { input_size } else { hidden_size };
                LstmLayer::new(input, hidden_size, rng)
            })
            .collect();

        Self { layers }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Runs every layer, seeding layer `k` with `initial[k]` when given
    ///
    /// Returns the top layer outputs and the final state of each layer,
    /// which the decoder stack takes as its initial state.
    pub fn forward(
        &self,
        inputs: &Array2<f64>,
        initial: Option<&[LstmState]>,
    ) -> (Array2<f64>, Vec<LstmState>) {
        let mut current = inputs.to_owned();
        let mut states = Vec::with_capacity(self.layers.len());

        for (k, layer) in self.layers.iter().enumerate() {
            let init = initial.and_then(|s| s.get(k));
            let (outputs, state) = layer.forward(&current, init);
            current = outputs;
            states.push(state);
        }

        (current, states)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_lstm_layer() {
        let mut rng = StdRng::seed_from_u64(3);
        let lstm = LstmLayer::new(16, 32, &mut rng);

        let inputs = Array2::from_elem((10, 16), 0.5);
        let (hidden, state) = lstm.forward(&inputs, None);

        assert_eq!(hidden.shape(), &[10, 32]);
        assert_eq!(state.h, hidden.row(9).to_owned());
        // tanh-bounded hidden state
        assert!(hidden.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_initial_state_changes_output() {
        let mut rng = StdRng::seed_from_u64(3);
        let lstm = LstmLayer::new(4, 8, &mut rng);
        let inputs = Array2::from_elem((3, 4), 0.2);

        let (from_zero, _) = lstm.forward(&inputs, None);
        let init = LstmState {
            h: Array1::from_elem(8, 0.5),
            c: Array1::from_elem(8, -0.5),
        };
        let (from_state, _) = lstm.forward(&inputs, Some(&init));

        assert_ne!(from_zero, from_state);
    }

    #[test]
    fn test_stacked_lstm() {
        let mut rng = StdRng::seed_from_u64(3);
        let stack = StackedLstm::new(8, 8, 2, &mut rng);
        let inputs = Array2::from_elem((6, 8), 0.1);

        let (outputs, states) = stack.forward(&inputs, None);
        assert_eq!(outputs.shape(), &[6, 8]);
        assert_eq!(states.len(), 2);
        assert_eq!(stack.num_layers(), 2);

        let (decoded, _) = stack.forward(&inputs.slice(s![..2, ..]).to_owned(), Some(&states));
        assert_eq!(decoded.shape(), &[2, 8]);
        assert_eq!(stack.num_parameters(), 2 * (4 * 8 * 8 * 2 + 4 * 8));
    }
}
