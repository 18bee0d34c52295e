//! End-to-end run: fetch, reshape, train, predict, plot
//!
//! Stages run once, in order; the first failing stage aborts the run.

use crate::api::{CryptoCompareClient, FetchError, PriceRecord};
use crate::config::{ConfigError, PipelineConfig};
use crate::data::{
    load_records, save_records, Reshaper, SchemaError, StorageError, TimeSeriesTable,
};
use crate::model::TFTModel;
use crate::plot::{
    forecast_table, render_ascii, save_svg, write_forecast_csv, ChartOptions, PlotError,
};
use crate::training::{ForecastResult, TrainedModel, Trainer, TrainingError};
use log::info;
use thiserror::Error;

/// Failure of one pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Price data file: {0}")]
    Storage(#[from] StorageError),

    #[error("Reshape failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Plot failed: {0}")]
    Plot(#[from] PlotError),
}

/// Everything a run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub table: TimeSeriesTable,
    pub trained: TrainedModel,
    pub forecast: ForecastResult,
    /// Terminal chart, when enabled
    pub chart: Option<String>,
    /// Last known price and per-day predictions
    pub report: String,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1: price history from the CSV input or the API
    pub async fn fetch(&self) -> Result<Vec<PriceRecord>, PipelineError> {
        let data = &self.config.data;

        let records = match &data.input {
            Some(path) => load_records(path)?,
            None => {
                let mut client = CryptoCompareClient::with_url(&data.base_url)?;
                if let Some(key) = &data.api_key {
                    client = client.with_api_key(key.clone());
                }
                client
                    .fetch_daily(&data.symbol, &data.currency, data.days)
                    .await?
            }
        };

        if let Some(path) = &data.save_data {
            save_records(&records, path)?;
        }

        info!("Stage 1/4: {} daily records", records.len());
        Ok(records)
    }

    /// Stage 2: records to table
    pub fn reshape(&self, records: &[PriceRecord]) -> Result<TimeSeriesTable, PipelineError> {
        let model = &self.config.model;
        let table = Reshaper::new(model.encoder_length, model.prediction_length)
            .with_group_id(Reshaper::group_id_for(
                &self.config.data.symbol,
                &self.config.data.currency,
            ))
            .reshape(records)?;

        info!(
            "Stage 2/4: table '{}' with {} rows ({} .. {})",
            table.group_id(),
            table.len(),
            table.rows().first().map(|r| r.date().to_string()).unwrap_or_default(),
            table.last().map(|r| r.date().to_string()).unwrap_or_default()
        );
        Ok(table)
    }

    /// Stage 3: fit the model and forecast the next days
    pub fn train(
        &self,
        table: &TimeSeriesTable,
    ) -> Result<(TrainedModel, ForecastResult), PipelineError> {
        let model = TFTModel::new(self.config.model.clone()).map_err(TrainingError::InvalidConfig)?;
        info!(
            "Stage 3/4: TFT with {} parameters ({} trained)",
            model.num_parameters(),
            model.num_trainable_parameters()
        );

        let trained = Trainer::new(self.config.training.clone()).train(model, table)?;
        let forecast = trained.predict(table)?;
        Ok((trained, forecast))
    }

    /// Stage 4: chart and table outputs
    pub fn render(
        &self,
        table: &TimeSeriesTable,
        forecast: &ForecastResult,
    ) -> Result<(Option<String>, String), PipelineError> {
        let output = &self.config.output;
        let title = format!(
            "{}/{}: history and {}-day forecast",
            self.config.data.symbol,
            self.config.data.currency,
            forecast.len()
        );

        let chart = if output.ascii {
            let options = ChartOptions {
                history_days: Some(output.ascii_history_days),
                ..ChartOptions::terminal().with_title(title.clone())
            };
            Some(render_ascii(table, forecast, &options)?)
        } else {
            None
        };

        if let Some(path) = &output.svg {
            save_svg(path, table, forecast, &ChartOptions::svg().with_title(title))?;
        }
        if let Some(path) = &output.forecast_csv {
            write_forecast_csv(path, forecast)?;
        }

        info!("Stage 4/4: outputs written");
        Ok((chart, forecast_table(forecast)))
    }

    /// Runs all stages
    pub async fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let records = self.fetch().await?;
        let table = self.reshape(&records)?;
        drop(records);

        let (trained, forecast) = self.train(&table)?;
        let (chart, report) = self.render(&table, &forecast)?;

        Ok(PipelineOutput {
            table,
            trained,
            forecast,
            chart,
            report,
        })
    }
}
