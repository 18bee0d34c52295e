//! Normalizers for the target and the covariates
//!
//! Both are fitted on the rows before the training cutoff and are
//! invertible, so forecasts can be mapped back to prices.

use super::TimeSeriesRow;
use serde::{Deserialize, Serialize};

/// Z-score scaler for one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    pub std: f64,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self { mean: 0.0, std: 1.0 }
    }
}

impl StandardScaler {
    /// Fits mean and (population) std. A constant column keeps std = 1.
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        Self {
            mean,
            std: if std > 1e-10 { std } else { 1.0 },
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }
}

/// Target normalizer for the single group
///
/// Only one asset is modeled, so the group statistics are the statistics
/// of the whole training part of the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNormalizer {
    pub group_id: String,
    pub scaler: StandardScaler,
}

impl GroupNormalizer {
    /// Fits on the close prices of `rows`
    pub fn fit(rows: &[TimeSeriesRow]) -> Self {
        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        let group_id = rows
            .first()
            .map(|r| r.group_id.to_string())
            .unwrap_or_default();

        Self {
            group_id,
            scaler: StandardScaler::fit(&closes),
        }
    }

    pub fn transform(&self, close: f64) -> f64 {
        self.scaler.transform(close)
    }

    pub fn inverse(&self, value: f64) -> f64 {
        self.scaler.inverse(value)
    }

    /// Scale of the target in price units
    pub fn scale(&self) -> f64 {
        self.scaler.std
    }
}

/// Scaler for the time-varying unknown covariates (open, high, low, volume)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub open: StandardScaler,
    pub high: StandardScaler,
    pub low: StandardScaler,
    pub volume: StandardScaler,
    /// Apply `ln(1 + v)` to volume before scaling
    pub log_volume: bool,
}

impl FeatureScaler {
    pub fn fit(rows: &[TimeSeriesRow], log_volume: bool) -> Self {
        let volumes: Vec<f64> = rows
            .iter()
            .map(|r| volume_transform(r.volume, log_volume))
            .collect();

        Self {
            open: StandardScaler::fit(&column(rows, |r| r.open)),
            high: StandardScaler::fit(&column(rows, |r| r.high)),
            low: StandardScaler::fit(&column(rows, |r| r.low)),
            volume: StandardScaler::fit(&volumes),
            log_volume,
        }
    }

    /// Returns scaled `[open, high, low, volume]`
    pub fn transform(&self, row: &TimeSeriesRow) -> [f64; 4] {
        [
            self.open.transform(row.open),
            self.high.transform(row.high),
            self.low.transform(row.low),
            self.volume
                .transform(volume_transform(row.volume, self.log_volume)),
        ]
    }
}

fn column(rows: &[TimeSeriesRow], f: impl Fn(&TimeSeriesRow) -> f64) -> Vec<f64> {
    rows.iter().map(f).collect()
}

fn volume_transform(volume: f64, log_volume: bool) -> f64 {
    if log_volume {
        volume.max(0.0).ln_1p()
    } else {
        volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn row(i: usize, close: f64) -> TimeSeriesRow {
        TimeSeriesRow {
            time_index: i,
            group_id: Arc::from("eth_usd"),
            timestamp: i as i64 * 86_400,
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1000.0 * (i + 1) as f64,
        }
    }

    #[test]
    fn test_standard_scaler_round_trip() {
        let scaler = StandardScaler::fit(&[1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(scaler.mean, 2.5);
        assert_relative_eq!(scaler.std, 1.25f64.sqrt());
        assert_relative_eq!(scaler.inverse(scaler.transform(3.7)), 3.7, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_column() {
        let scaler = StandardScaler::fit(&[5.0, 5.0, 5.0]);
        assert_eq!(scaler.std, 1.0);
        assert_eq!(scaler.transform(5.0), 0.0);
    }

    #[test]
    fn test_group_normalizer() {
        let rows: Vec<_> = (0..10).map(|i| row(i, 100.0 + i as f64)).collect();
        let normalizer = GroupNormalizer::fit(&rows);

        assert_eq!(normalizer.group_id, "eth_usd");
        assert_relative_eq!(normalizer.transform(104.5), 0.0, epsilon = 1e-12);
        assert_relative_eq!(normalizer.inverse(normalizer.transform(120.0)), 120.0, epsilon = 1e-9);
    }

    #[test]
    fn test_feature_scaler_log_volume() {
        let rows: Vec<_> = (0..10).map(|i| row(i, 100.0 + i as f64)).collect();
        let scaler = FeatureScaler::fit(&rows, true);

        let scaled: Vec<[f64; 4]> = rows.iter().map(|r| scaler.transform(r)).collect();
        let mean_volume = scaled.iter().map(|s| s[3]).sum::<f64>() / scaled.len() as f64;
        assert_relative_eq!(mean_volume, 0.0, epsilon = 1e-9);
        assert!(scaled[9][3] > scaled[0][3]);
    }
}
