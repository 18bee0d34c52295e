//! Loss Functions
//!
//! Quantile (pinball) loss and forecast metrics.

use ndarray::{Array1, Array2};
use std::fmt;

/// Quantile forecast
#[derive(Debug, Clone)]
pub struct QuantilePrediction {
    /// Quantile levels, increasing
    pub quantiles: Vec<f64>,

    /// Predicted values per quantile
    /// Shape: (prediction_length, num_quantiles)
    pub values: Array2<f64>,
}

impl QuantilePrediction {
    pub fn new(quantiles: Vec<f64>, values: Array2<f64>) -> Self {
        Self { quantiles, values }
    }

    /// Median forecast (q50)
    pub fn median(&self) -> Array1<f64> {
        if let Some(idx) = self.quantiles.iter().position(|&q| (q - 0.5).abs() < 1e-6) {
            self.values.column(idx).to_owned()
        } else {
            // No exact 0.5: take the middle quantile
            let mid_idx = self.quantiles.len() / 2;
            self.values.column(mid_idx).to_owned()
        }
    }

    /// Lowest quantile (e.g. q10)
    pub fn lower(&self) -> Array1<f64> {
        self.values.column(0).to_owned()
    }

    /// Highest quantile (e.g. q90)
    pub fn upper(&self) -> Array1<f64> {
        self.values.column(self.quantiles.len() - 1).to_owned()
    }

    pub fn interval_width(&self) -> Array1<f64> {
        &self.upper() - &self.lower()
    }

    /// Sorts each step's quantiles so they never cross
    pub fn sort_quantiles(&mut self) {
        for mut row in self.values.rows_mut() {
            let mut sorted = row.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            for (dst, src) in row.iter_mut().zip(sorted) {
                *dst = src;
            }
        }
    }

    /// Applies `f` to every value (e.g. denormalization)
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            quantiles: self.quantiles.clone(),
            values: self.values.mapv(f),
        }
    }

    /// Share of actual values inside [lower, upper]
    pub fn coverage(&self, actual: &Array1<f64>) -> f64 {
        if actual.is_empty() {
            return 0.0;
        }
        let lower = self.lower();
        let upper = self.upper();

        let covered = actual
            .iter()
            .enumerate()
            .filter(|&(i, &a)| a >= lower[i] && a <= upper[i])
            .count();

        covered as f64 / actual.len() as f64
    }
}

/// Quantile Loss Function
///
/// L_q(y, ŷ) = max(q(y - ŷ), (q-1)(y - ŷ))
#[derive(Debug, Clone)]
pub struct QuantileLoss {
    pub quantiles: Vec<f64>,
}

impl Default for QuantileLoss {
    fn default() -> Self {
        Self {
            quantiles: vec![0.1, 0.5, 0.9],
        }
    }
}

impl QuantileLoss {
    /// Default quantiles [0.1, 0.5, 0.9]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantiles(quantiles: Vec<f64>) -> Self {
        Self { quantiles }
    }

    fn pinball_loss(y_true: f64, y_pred: f64, quantile: f64) -> f64 {
        let error = y_true - y_pred;
        if error >= 0.0 {
            quantile * error
        } else {
            (quantile - 1.0) * error
        }
    }

    /// d(pinball)/d(y_pred)
    fn pinball_gradient(y_true: f64, y_pred: f64, quantile: f64) -> f64 {
        if y_true > y_pred {
            -quantile
        } else {
            1.0 - quantile
        }
    }

    /// Mean loss over the horizon and quantiles of one sample
    pub fn loss_single(&self, y_true: &Array1<f64>, predictions: &Array2<f64>) -> f64 {
        let n = y_true.len();
        if n == 0 || self.quantiles.is_empty() {
            return 0.0;
        }

        let mut total_loss = 0.0;
        for (q_idx, &quantile) in self.quantiles.iter().enumerate() {
            for i in 0..n {
                total_loss += Self::pinball_loss(y_true[i], predictions[[i, q_idx]], quantile);
            }
        }

        total_loss / (n * self.quantiles.len()) as f64
    }

    /// Gradient of [`loss_single`](Self::loss_single) w.r.t. the predictions
    ///
    /// Shape matches `predictions`.
    pub fn gradient_single(&self, y_true: &Array1<f64>, predictions: &Array2<f64>) -> Array2<f64> {
        let n = y_true.len();
        let norm = (n * self.quantiles.len()).max(1) as f64;

        Array2::from_shape_fn(predictions.dim(), |(i, q_idx)| {
            Self::pinball_gradient(y_true[i], predictions[[i, q_idx]], self.quantiles[q_idx]) / norm
        })
    }

    /// Mean loss over a batch
    pub fn loss_batch(&self, y_true: &[Array1<f64>], predictions: &[Array2<f64>]) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }

        let total: f64 = y_true
            .iter()
            .zip(predictions.iter())
            .map(|(y, p)| self.loss_single(y, p))
            .sum();

        total / y_true.len() as f64
    }

    /// Loss per quantile
    pub fn loss_per_quantile(&self, y_true: &Array1<f64>, predictions: &Array2<f64>) -> Vec<f64> {
        let n = y_true.len().max(1);

        self.quantiles
            .iter()
            .enumerate()
            .map(|(q_idx, &quantile)| {
                let loss: f64 = y_true
                    .iter()
                    .enumerate()
                    .map(|(i, &y)| Self::pinball_loss(y, predictions[[i, q_idx]], quantile))
                    .sum();
                loss / n as f64
            })
            .collect()
    }

    pub fn num_quantiles(&self) -> usize {
        self.quantiles.len()
    }
}

/// Forecast quality metrics
#[derive(Debug, Clone)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error
    pub mape: f64,
    /// Quantile Loss
    pub quantile_loss: f64,
    /// Share of actuals inside the interval
    pub coverage: f64,
    /// Mean interval width
    pub interval_width: f64,
}

impl ForecastMetrics {
    /// Computes all metrics against the median forecast
    pub fn compute(y_true: &Array1<f64>, prediction: &QuantilePrediction) -> Self {
        let median = prediction.median();
        let n = y_true.len().max(1) as f64;

        let mae = y_true
            .iter()
            .zip(median.iter())
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n;

        let mse = y_true
            .iter()
            .zip(median.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n;
        let rmse = mse.sqrt();

        let mape = y_true
            .iter()
            .zip(median.iter())
            .filter_map(|(t, p)| {
                if t.abs() > 1e-10 {
                    Some(((t - p) / t).abs())
                } else {
                    None
                }
            })
            .sum::<f64>()
            / n
            * 100.0;

        let loss_fn = QuantileLoss::with_quantiles(prediction.quantiles.clone());
        let quantile_loss = loss_fn.loss_single(y_true, &prediction.values);

        let coverage = prediction.coverage(y_true);
        let interval_width = prediction.interval_width().mean().unwrap_or(0.0);

        Self {
            mae,
            rmse,
            mape,
            quantile_loss,
            coverage,
            interval_width,
        }
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE: {:.4}, RMSE: {:.4}, MAPE: {:.2}%, QL: {:.4}, Coverage: {:.2}%, Width: {:.4}",
            self.mae,
            self.rmse,
            self.mape,
            self.quantile_loss,
            self.coverage * 100.0,
            self.interval_width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_prediction() -> QuantilePrediction {
        let values = Array2::from_shape_vec(
            (3, 3),
            vec![0.5, 1.0, 1.5, 1.5, 2.0, 2.5, 2.5, 3.0, 3.5],
        )
        .unwrap();
        QuantilePrediction::new(vec![0.1, 0.5, 0.9], values)
    }

    #[test]
    fn test_pinball_loss() {
        // Under-prediction costs q * error
        assert_relative_eq!(QuantileLoss::pinball_loss(10.0, 8.0, 0.9), 1.8);

        // Over-prediction costs (1 - q) * error
        assert_relative_eq!(QuantileLoss::pinball_loss(8.0, 10.0, 0.9), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_pinball_gradient_sign() {
        assert_relative_eq!(QuantileLoss::pinball_gradient(10.0, 8.0, 0.9), -0.9);
        assert_relative_eq!(QuantileLoss::pinball_gradient(8.0, 10.0, 0.9), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let loss_fn = QuantileLoss::new();
        let y_true = Array1::from_vec(vec![1.2, 1.9, 3.3]);
        let predictions = sample_prediction().values;
        let grad = loss_fn.gradient_single(&y_true, &predictions);

        let eps = 1e-6;
        for i in 0..3 {
            for q in 0..3 {
                let mut shifted = predictions.clone();
                shifted[[i, q]] += eps;
                let numeric = (loss_fn.loss_single(&y_true, &shifted)
                    - loss_fn.loss_single(&y_true, &predictions))
                    / eps;
                assert_relative_eq!(grad[[i, q]], numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_quantile_loss_zero_on_perfect_forecast() {
        let loss_fn = QuantileLoss::new();
        let y_true = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let predictions = Array2::from_shape_fn((3, 3), |(i, _)| y_true[i]);

        assert_relative_eq!(loss_fn.loss_single(&y_true, &predictions), 0.0);
        assert_eq!(loss_fn.loss_per_quantile(&y_true, &predictions), vec![0.0; 3]);
    }

    #[test]
    fn test_quantile_prediction() {
        let prediction = sample_prediction();

        assert_relative_eq!(prediction.median()[0], 1.0);
        assert_relative_eq!(prediction.lower()[0], 0.5);
        assert_relative_eq!(prediction.upper()[0], 1.5);
        assert_relative_eq!(prediction.interval_width()[2], 1.0);
    }

    #[test]
    fn test_sort_quantiles() {
        let values = Array2::from_shape_vec((2, 3), vec![3.0, 1.0, 2.0, 0.0, 5.0, 4.0]).unwrap();
        let mut prediction = QuantilePrediction::new(vec![0.1, 0.5, 0.9], values);
        prediction.sort_quantiles();

        assert_eq!(prediction.values.row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(prediction.values.row(1).to_vec(), vec![0.0, 4.0, 5.0]);
    }

    #[test]
    fn test_coverage() {
        let prediction = sample_prediction();

        let inside = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(prediction.coverage(&inside), 1.0);

        let outside = Array1::from_vec(vec![5.0, 5.0, 5.0]);
        assert_relative_eq!(prediction.coverage(&outside), 0.0);
    }

    #[test]
    fn test_forecast_metrics() {
        let prediction = sample_prediction();
        let y_true = Array1::from_vec(vec![1.0, 2.0, 3.0]);

        let metrics = ForecastMetrics::compute(&y_true, &prediction);

        assert_relative_eq!(metrics.mae, 0.0);
        assert_relative_eq!(metrics.coverage, 1.0);
        assert_relative_eq!(metrics.interval_width, 1.0);
        assert!(metrics.to_string().starts_with("MAE: 0.0000"));
    }
}
