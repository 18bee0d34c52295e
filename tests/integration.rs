//! Integration tests for the ETH/USD forecast pipeline

use std::path::PathBuf;
use tft_forecast::api::PriceRecord;
use tft_forecast::{
    CryptoCompareClient, FetchError, Pipeline, PipelineConfig, PipelineError, Reshaper,
    SchemaError, TFTConfig, TFTModel, Trainer, TrainingConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const DAY: i64 = 86_400;
const START: i64 = 1_500_000_000 - 1_500_000_000 % DAY;

fn linear_records(n: usize) -> Vec<PriceRecord> {
    (0..n)
        .map(|i| {
            let close = 1000.0 + i as f64;
            PriceRecord {
                timestamp: START + i as i64 * DAY,
                open: close - 0.5,
                high: close + 2.0,
                low: close - 2.0,
                close,
                volume: 5_000.0 + (i % 7) as f64 * 100.0,
            }
        })
        .collect()
}

fn small_model(encoder_length: usize) -> TFTConfig {
    TFTConfig {
        hidden_size: 8,
        num_attention_heads: 2,
        num_lstm_layers: 1,
        ..TFTConfig::daily().with_lengths(encoder_length, 7)
    }
}

fn small_training() -> TrainingConfig {
    TrainingConfig {
        max_epochs: 5,
        stride: 3,
        ..TrainingConfig::default()
    }
}

fn histoday_body(records: &[PriceRecord]) -> String {
    let bars: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                r#"{{"time":{},"high":{},"low":{},"open":{},"volumefrom":1.0,"volumeto":{},"close":{}}}"#,
                r.timestamp, r.high, r.low, r.open, r.volume, r.close
            )
        })
        .collect();
    format!(
        r#"{{"Response":"Success","Message":"","Data":{{"TimeFrom":{},"TimeTo":{},"Data":[{}]}}}}"#,
        records.first().map(|r| r.timestamp).unwrap_or(0),
        records.last().map(|r| r.timestamp).unwrap_or(0),
        bars.join(",")
    )
}

/// Serves one canned HTTP response and returns the base URL
async fn serve_once(status_line: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    format!("http://{}", addr)
}

fn api_config(base_url: String, days: u32, svg: Option<PathBuf>) -> PipelineConfig {
    let mut config = PipelineConfig::default().with_encoder_length(20);
    config.model.hidden_size = 8;
    config.model.num_attention_heads = 2;
    config.model.num_lstm_layers = 1;
    config.training.max_epochs = 3;
    config.data.days = days;
    config.data.base_url = base_url;
    config.output.svg = svg;
    config.output.ascii = false;
    config
}

#[tokio::test]
async fn test_http_error_aborts_before_reshape() {
    let base_url = serve_once("500 Internal Server Error", String::new()).await;

    let client = CryptoCompareClient::with_url(&base_url).unwrap();
    let result = client.fetch_daily("ETH", "USD", 2000).await;
    assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
}

#[tokio::test]
async fn test_pipeline_fetch_error_is_reported() {
    let base_url = serve_once("500 Internal Server Error", String::new()).await;
    let pipeline = Pipeline::new(api_config(base_url, 100, None)).unwrap();

    let result = pipeline.run().await;
    assert!(matches!(
        result,
        Err(PipelineError::Fetch(FetchError::Status { status: 500, .. }))
    ));
}

#[tokio::test]
async fn test_pipeline_from_api() {
    let records = linear_records(90);
    let base_url = serve_once("200 OK", histoday_body(&records)).await;

    let dir = tempfile::tempdir().unwrap();
    let svg = dir.path().join("eth_forecast.svg");
    let pipeline = Pipeline::new(api_config(base_url, 90, Some(svg.clone()))).unwrap();

    let output = pipeline.run().await.unwrap();

    assert_eq!(output.table.len(), 90);
    assert_eq!(output.table.group_id(), "eth_usd");
    assert_eq!(output.forecast.len(), 7);
    assert_eq!(output.forecast.last_close, 1089.0);
    assert!(output.chart.is_none());

    let chart = std::fs::read_to_string(&svg).unwrap();
    assert!(chart.starts_with("<svg"));
}

#[test]
fn test_reshape_properties() {
    let records = linear_records(400);
    let table = Reshaper::new(365, 7)
        .with_group_id(Reshaper::group_id_for("ETH", "USD"))
        .reshape(&records)
        .unwrap();

    assert_eq!(table.len(), 400);
    for (i, row) in table.rows().iter().enumerate() {
        assert_eq!(row.time_index, i);
        assert_eq!(&*row.group_id, "eth_usd");
        assert_eq!(row.close, records[i].close);
    }
}

#[test]
fn test_reshape_requires_one_full_window() {
    let reshaper = Reshaper::new(365, 7);

    assert!(reshaper.reshape(&linear_records(372)).is_ok());
    assert!(matches!(
        reshaper.reshape(&linear_records(371)),
        Err(SchemaError::InsufficientRows {
            rows: 371,
            required: 372
        })
    ));
}

#[test]
fn test_linear_trend_forecast() {
    let records = linear_records(2000);
    let table = Reshaper::new(20, 7).reshape(&records).unwrap();

    let model = TFTModel::new(small_model(20)).unwrap();
    let config = TrainingConfig {
        learning_rate: 3e-4,
        batch_size: 16,
        max_epochs: 20,
        t_max: 20,
        ..small_training()
    };
    let trained = Trainer::new(config).train(model, &table).unwrap();
    let forecast = trained.predict(&table).unwrap();

    assert_eq!(forecast.len(), 7);
    assert_eq!(forecast.last_close, 2999.0);

    // Repeating the last close would miss day 7 by 7.0
    for (t, point) in forecast.points.iter().enumerate() {
        let expected = 3000.0 + t as f64;
        assert!(
            (point.median - expected).abs() < 2.0,
            "day {}: median {:.2} vs {:.2}",
            t + 1,
            point.median,
            expected
        );
        assert!(point.lower <= point.median && point.median <= point.upper);
    }

    let medians = forecast.medians();
    assert!(
        medians.windows(2).all(|w| w[1] > w[0]),
        "medians do not increase: {:?}",
        medians
    );
    assert!(medians[6] - medians[0] > 4.0);
}

#[test]
fn test_forecast_is_aligned_after_last_row() {
    let records = linear_records(120);
    let table = Reshaper::new(20, 7).reshape(&records).unwrap();

    let model = TFTModel::new(small_model(20)).unwrap();
    let trained = Trainer::new(small_training()).train(model, &table).unwrap();
    let forecast = trained.predict(&table).unwrap();

    let last = table.last().unwrap();
    for (t, point) in forecast.points.iter().enumerate() {
        assert_eq!(point.time_index, table.len() + t);
        assert_eq!(point.timestamp, last.timestamp + (t as i64 + 1) * DAY);
    }
    assert_eq!(forecast.last_date, last.date());
    assert!(forecast.points[0].date > forecast.last_date);
}

#[test]
fn test_same_seed_same_forecast() {
    let records = linear_records(150);
    let table = Reshaper::new(20, 7).reshape(&records).unwrap();

    let run = || {
        let model = TFTModel::new(small_model(20).with_seed(7)).unwrap();
        let trained = Trainer::new(TrainingConfig {
            seed: 7,
            ..small_training()
        })
        .train(model, &table)
        .unwrap();
        trained.predict(&table).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.medians(), second.medians());
    assert_eq!(first.points, second.points);
}
