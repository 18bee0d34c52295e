//! Variable Selection Network (VSN)
//!
//! Learns per-step importance weights over the input variables and
//! returns their weighted combination.

use super::{softmax, GatedResidualNetwork};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;

/// Variable Selection Network
#[derive(Debug, Clone)]
pub struct VariableSelectionNetwork {
    /// Number of input variables
    pub num_inputs: usize,

    /// Size of each variable
    pub input_size: usize,

    pub hidden_size: usize,

    pub context_size: Option<usize>,

    /// One GRN per variable
    variable_grns: Vec<GatedResidualNetwork>,

    /// GRN producing the selection logits
    selection_grn: GatedResidualNetwork,

    /// GRN applied to the combined output
    output_grn: GatedResidualNetwork,
}

impl VariableSelectionNetwork {
    pub fn new(
        num_inputs: usize,
        input_size: usize,
        hidden_size: usize,
        context_size: Option<usize>,
        rng: &mut StdRng,
    ) -> Self {
        let variable_grns: Vec<_> = (0..num_inputs)
            .map(|_| GatedResidualNetwork::new(input_size, hidden_size, hidden_size, None, rng))
            .collect();

        // Input: all variables flattened, plus the optional context
        let selection_grn = GatedResidualNetwork::new(
            num_inputs * input_size,
            hidden_size,
            num_inputs,
            context_size,
            rng,
        );

        let output_grn =
            GatedResidualNetwork::new(hidden_size, hidden_size, hidden_size, context_size, rng);

        Self {
            num_inputs,
            input_size,
            hidden_size,
            context_size,
            variable_grns,
            selection_grn,
            output_grn,
        }
    }

    /// Forward pass for one time step
    ///
    /// # Arguments
    /// * `inputs` - Variables, shape (num_inputs, input_size)
    /// * `context` - Optional static context
    ///
    /// # Returns
    /// * (output, weights) - Combined representation and selection weights
    pub fn forward(
        &self,
        inputs: &Array2<f64>,
        context: Option<&Array1<f64>>,
    ) -> (Array1<f64>, Array1<f64>) {
        debug_assert_eq!(inputs.nrows(), self.num_inputs);
        debug_assert_eq!(inputs.ncols(), self.input_size);

        let flattened = Array1::from_iter(inputs.iter().copied());
        let weights = softmax(&self.selection_grn.forward(&flattened, context));

        let mut weighted_sum = Array1::zeros(self.hidden_size);
        for (i, grn) in self.variable_grns.iter().enumerate() {
            let processed = grn.forward(&inputs.row(i).to_owned(), None);
            weighted_sum.scaled_add(weights[i], &processed);
        }

        let output = self.output_grn.forward(&weighted_sum, context);

        (output, weights)
    }

    /// Forward pass over a sequence of scalar variables
    ///
    /// # Arguments
    /// * `inputs` - Shape (time_steps, num_inputs), each variable a scalar
    ///
    /// # Returns
    /// * (outputs, weights) - Shape (time_steps, hidden_size) and the
    ///   selection weights averaged over time
    pub fn forward_sequence(
        &self,
        inputs: &Array2<f64>,
        context: Option<&Array1<f64>>,
    ) -> (Array2<f64>, Array1<f64>) {
        let time_steps = inputs.nrows();
        let mut outputs = Array2::zeros((time_steps, self.hidden_size));
        let mut all_weights = Array2::zeros((time_steps, self.num_inputs));

        for t in 0..time_steps {
            let step = inputs.row(t).to_owned().insert_axis(Axis(1));
            let (output, weights) = self.forward(&step, context);
            outputs.row_mut(t).assign(&output);
            all_weights.row_mut(t).assign(&weights);
        }

        let mean_weights = all_weights
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.num_inputs));

        (outputs, mean_weights)
    }

    /// Number of parameters
    pub fn num_parameters(&self) -> usize {
        let var_params: usize = self.variable_grns.iter().map(|g| g.num_parameters()).sum();
        var_params + self.selection_grn.num_parameters() + self.output_grn.num_parameters()
    }
}

/// Named variable importance weights
#[derive(Debug, Clone)]
pub struct VariableImportance {
    pub names: Vec<String>,
    pub weights: Vec<f64>,
}

impl VariableImportance {
    pub fn new(names: &[&str], weights: &Array1<f64>) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            weights: weights.to_vec(),
        }
    }

    /// Sorted by importance, descending
    pub fn sorted(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<_> = self
            .names
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect();

        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }

    /// Top-N variables
    pub fn top_n(&self, n: usize) -> Vec<(String, f64)> {
        self.sorted().into_iter().take(n).collect()
    }
}
