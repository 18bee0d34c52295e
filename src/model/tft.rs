//! Temporal Fusion Transformer Model
//!
//! The backbone (static covariate encoders, variable selection, LSTM
//! encoder/decoder, static enrichment, interpretable attention and the
//! gated skip layers) is initialized once from `TFTConfig::seed` and kept
//! fixed. It maps a window to one embedding per horizon step; the
//! [`QuantileHead`] on top of those embeddings is what training fits.

use super::{
    Attention, GateAddNorm, GatedResidualNetwork, InterpretableMultiHeadAttention, LstmState,
    QuantileHead, QuantileLoss, QuantilePrediction, StackedLstm, TFTConfig, VariableImportance,
    VariableSelectionNetwork,
};
use crate::data::{TFTSample, DECODER_FEATURES, ENCODER_FEATURES};
use ndarray::{concatenate, s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Interpretation of one forward pass
#[derive(Debug, Clone)]
pub struct Interpretation {
    /// Encoder variable selection weights, averaged over time
    pub encoder_importance: VariableImportance,
    /// Decoder variable selection weights, averaged over time
    pub decoder_importance: VariableImportance,
    /// Head-averaged attention, shape (prediction_length, encoder_length + prediction_length)
    pub attention: Array2<f64>,
}

impl Interpretation {
    /// Mean attention per encoder lag, most recent step last
    pub fn encoder_attention(&self, encoder_length: usize) -> Array1<f64> {
        let profile = InterpretableMultiHeadAttention::attention_profile(&self.attention);
        profile.slice(s![..encoder_length.min(profile.len())]).to_owned()
    }
}

/// Static context vectors derived from the static covariates
struct StaticContext {
    selection: Array1<f64>,
    enrichment: Array1<f64>,
    state_h: Array1<f64>,
    state_c: Array1<f64>,
}

/// Temporal Fusion Transformer Model
#[derive(Debug, Clone)]
pub struct TFTModel {
    pub config: TFTConfig,

    static_encoder: GatedResidualNetwork,
    context_selection: GatedResidualNetwork,
    context_enrichment: GatedResidualNetwork,
    context_state_h: GatedResidualNetwork,
    context_state_c: GatedResidualNetwork,

    encoder_vsn: VariableSelectionNetwork,
    decoder_vsn: VariableSelectionNetwork,

    lstm_encoder: StackedLstm,
    lstm_decoder: StackedLstm,
    post_lstm_gate: GateAddNorm,

    static_enrichment: GatedResidualNetwork,
    attention: InterpretableMultiHeadAttention,
    post_attention_gate: GateAddNorm,

    output_grn: GatedResidualNetwork,
    pre_output_gate: GateAddNorm,

    head: QuantileHead,
    loss_fn: QuantileLoss,
}

impl TFTModel {
    /// Builds the model; the backbone weights depend only on `config`
    pub fn new(config: TFTConfig) -> Result<Self, String> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = config.hidden_size;
        let rng = &mut rng;

        let static_encoder =
            GatedResidualNetwork::new(config.num_static_features, hidden, hidden, None, rng);
        let context_selection = GatedResidualNetwork::new(hidden, hidden, hidden, None, rng);
        let context_enrichment = GatedResidualNetwork::new(hidden, hidden, hidden, None, rng);
        let context_state_h = GatedResidualNetwork::new(hidden, hidden, hidden, None, rng);
        let context_state_c = GatedResidualNetwork::new(hidden, hidden, hidden, None, rng);

        // Each feature is a scalar
        let encoder_vsn =
            VariableSelectionNetwork::new(config.num_encoder_features, 1, hidden, Some(hidden), rng);
        let decoder_vsn =
            VariableSelectionNetwork::new(config.num_decoder_features, 1, hidden, Some(hidden), rng);

        let lstm_encoder = StackedLstm::new(hidden, hidden, config.num_lstm_layers, rng);
        let lstm_decoder = StackedLstm::new(hidden, hidden, config.num_lstm_layers, rng);
        let post_lstm_gate = GateAddNorm::new(hidden, rng);

        let static_enrichment = GatedResidualNetwork::new(hidden, hidden, hidden, Some(hidden), rng);
        let attention = InterpretableMultiHeadAttention::new(hidden, config.num_attention_heads, rng);
        let post_attention_gate = GateAddNorm::new(hidden, rng);

        let output_grn = GatedResidualNetwork::new(hidden, hidden, hidden, None, rng);
        let pre_output_gate = GateAddNorm::new(hidden, rng);

        let head = QuantileHead::new(hidden, config.prediction_length, config.quantiles.len());
        let loss_fn = QuantileLoss::with_quantiles(config.quantiles.clone());

        Ok(Self {
            config,
            static_encoder,
            context_selection,
            context_enrichment,
            context_state_h,
            context_state_c,
            encoder_vsn,
            decoder_vsn,
            lstm_encoder,
            lstm_decoder,
            post_lstm_gate,
            static_enrichment,
            attention,
            post_attention_gate,
            output_grn,
            pre_output_gate,
            head,
            loss_fn,
        })
    }

    pub fn head(&self) -> &QuantileHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut QuantileHead {
        &mut self.head
    }

    pub fn set_head(&mut self, head: QuantileHead) {
        self.head = head;
    }

    pub fn loss_fn(&self) -> &QuantileLoss {
        &self.loss_fn
    }

    fn static_context(&self, static_features: &Array1<f64>) -> StaticContext {
        let encoded = self.static_encoder.forward(static_features, None);
        StaticContext {
            selection: self.context_selection.forward(&encoded, None),
            enrichment: self.context_enrichment.forward(&encoded, None),
            state_h: self.context_state_h.forward(&encoded, None),
            state_c: self.context_state_c.forward(&encoded, None),
        }
    }

    /// Decoder embeddings for one window, shape (prediction_length, hidden_size)
    pub fn embed(&self, sample: &TFTSample) -> Array2<f64> {
        self.embed_with_interpretation(sample).0
    }

    /// Decoder embeddings plus variable importance and attention weights
    pub fn embed_with_interpretation(&self, sample: &TFTSample) -> (Array2<f64>, Interpretation) {
        let encoder_len = sample.encoder_input.nrows();
        let context = self.static_context(&sample.static_features);

        // Variable selection
        let (encoder_selected, encoder_weights) = self
            .encoder_vsn
            .forward_sequence(&sample.encoder_input, Some(&context.selection));
        let (decoder_selected, decoder_weights) = self
            .decoder_vsn
            .forward_sequence(&sample.decoder_input, Some(&context.selection));

        // LSTM encoder seeded with the static state, decoder continues from it
        let initial: Vec<LstmState> = (0..self.lstm_encoder.num_layers())
            .map(|_| LstmState {
                h: context.state_h.clone(),
                c: context.state_c.clone(),
            })
            .collect();
        let (encoder_out, encoder_state) = self.lstm_encoder.forward(&encoder_selected, Some(&initial));
        let (decoder_out, _) = self.lstm_decoder.forward(&decoder_selected, Some(&encoder_state));

        let lstm_out = concatenate![Axis(0), encoder_out, decoder_out];
        let selected = concatenate![Axis(0), encoder_selected, decoder_selected];
        let temporal = self.post_lstm_gate.forward_batch(&lstm_out, &selected);

        // Static enrichment
        let enriched = self
            .static_enrichment
            .forward_batch(&temporal, Some(&context.enrichment));

        // Decoder steps attend over everything up to themselves
        let total_len = enriched.nrows();
        let queries = enriched.slice(s![encoder_len.., ..]).to_owned();
        let mask = Attention::causal_mask(queries.nrows(), total_len, encoder_len);
        let (attended, attention) = self.attention.forward(&queries, &enriched, Some(&mask));
        let attended = self.post_attention_gate.forward_batch(&attended, &queries);

        // Position-wise feed-forward and skip over the temporal block
        let decoder_temporal = temporal.slice(s![encoder_len.., ..]).to_owned();
        let output = self.output_grn.forward_batch(&attended, None);
        let embedding = self.pre_output_gate.forward_batch(&output, &decoder_temporal);

        let interpretation = Interpretation {
            encoder_importance: VariableImportance::new(&ENCODER_FEATURES, &encoder_weights),
            decoder_importance: VariableImportance::new(&DECODER_FEATURES, &decoder_weights),
            attention,
        };

        (embedding, interpretation)
    }

    /// Quantile forecast in normalized units, shape (prediction_length, num_quantiles)
    pub fn forward(&self, sample: &TFTSample) -> QuantilePrediction {
        let embedding = self.embed(sample);
        self.forward_embedded(&embedding, sample.anchor)
    }

    /// Quantile forecast from a precomputed embedding
    pub fn forward_embedded(&self, embedding: &Array2<f64>, anchor: f64) -> QuantilePrediction {
        QuantilePrediction::new(
            self.config.quantiles.clone(),
            self.head.forward(embedding, anchor),
        )
    }

    /// Quantile loss of one sample; `None` when it has no target
    pub fn compute_loss(&self, sample: &TFTSample) -> Option<f64> {
        if !sample.has_target() {
            return None;
        }
        let prediction = self.forward(sample);
        Some(self.loss_fn.loss_single(&sample.target, &prediction.values))
    }

    /// Number of trained parameters
    pub fn num_trainable_parameters(&self) -> usize {
        self.head.num_parameters()
    }

    /// Total number of parameters
    pub fn num_parameters(&self) -> usize {
        let grns = [
            &self.static_encoder,
            &self.context_selection,
            &self.context_enrichment,
            &self.context_state_h,
            &self.context_state_c,
            &self.static_enrichment,
            &self.output_grn,
        ];
        let gates = [
            &self.post_lstm_gate,
            &self.post_attention_gate,
            &self.pre_output_gate,
        ];

        grns.iter().map(|g| g.num_parameters()).sum::<usize>()
            + gates.iter().map(|g| g.num_parameters()).sum::<usize>()
            + self.encoder_vsn.num_parameters()
            + self.decoder_vsn.num_parameters()
            + self.lstm_encoder.num_parameters()
            + self.lstm_decoder.num_parameters()
            + self.attention.num_parameters()
            + self.head.num_parameters()
    }
}
