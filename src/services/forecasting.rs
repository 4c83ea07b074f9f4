//! Demand forecasting behind the [`Forecaster`] trait.
//!
//! The report service hands a forecaster the monthly demand history of every
//! item and relays whatever `{item_code, predicted_qty}` list comes back.

use crate::{config::AppConfig, errors::ServiceError};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

/// Number of trailing months the trend model looks at.
const RECENT_MONTHS: usize = 6;

/// Units taken of one item in one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyDemand {
    pub month: String,
    pub quantity: i64,
}

/// Demand history of a single item, contiguous and ending at the input's `as_of` month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemDemand {
    pub item_code: String,
    pub name: String,
    pub monthly: Vec<MonthlyDemand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastInput {
    /// Last month covered by the history (`YYYY-MM`); predictions are for the month after.
    pub as_of: String,
    pub items: Vec<ItemDemand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Prediction {
    pub item_code: String,
    pub predicted_qty: i64,
}

#[async_trait]
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &'static str;

    async fn forecast(&self, input: &ForecastInput) -> Result<Vec<Prediction>, ServiceError>;
}

pub fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parses a `YYYY-MM` label into the first day of that month.
pub fn parse_month(label: &str) -> Option<NaiveDate> {
    let (year, month) = label.split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Least-squares fit of `values` against indices `0..n`; returns (slope, intercept).
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };
    (slope, mean_y - slope * mean_x)
}

/// Built-in model: recent mean, plus the linear trend projected one step
/// ahead, plus the seasonal offset of the target calendar month.
#[derive(Debug, Clone, Default)]
pub struct TrendForecaster;

impl TrendForecaster {
    /// `None` when there is less than two months of history to fit.
    pub fn predict(item: &ItemDemand, target_month: u32) -> Option<i64> {
        if item.monthly.len() < 2 {
            return None;
        }
        let series: Vec<f64> = item.monthly.iter().map(|m| m.quantity as f64).collect();
        let recent = &series[series.len().saturating_sub(RECENT_MONTHS)..];

        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
        let (slope, intercept) = linear_fit(recent);
        let trend = slope * recent.len() as f64 + intercept;

        let overall_mean = series.iter().sum::<f64>() / series.len() as f64;
        let same_month: Vec<f64> = item
            .monthly
            .iter()
            .filter(|m| parse_month(&m.month).map(|d| d.month()) == Some(target_month))
            .map(|m| m.quantity as f64)
            .collect();
        let seasonal = if same_month.is_empty() {
            0.0
        } else {
            same_month.iter().sum::<f64>() / same_month.len() as f64 - overall_mean
        };

        let predicted = (recent_avg + trend + seasonal).round().max(0.0);
        Some(predicted as i64)
    }
}

#[async_trait]
impl Forecaster for TrendForecaster {
    fn name(&self) -> &'static str {
        "trend"
    }

    async fn forecast(&self, input: &ForecastInput) -> Result<Vec<Prediction>, ServiceError> {
        let as_of = parse_month(&input.as_of).ok_or_else(|| {
            ServiceError::InternalError(format!("invalid forecast month {}", input.as_of))
        })?;
        let target_month = next_month(as_of).month();

        Ok(input
            .items
            .iter()
            .filter_map(|item| {
                Self::predict(item, target_month).map(|qty| Prediction {
                    item_code: item.item_code.clone(),
                    predicted_qty: qty,
                })
            })
            .collect())
    }
}

/// Runs an external command: the history goes to its stdin as JSON and the
/// predictions are read from its stdout.
#[derive(Debug, Clone)]
pub struct ProcessForecaster {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessForecaster {
    /// Splits a command line on whitespace; `None` when it is blank.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn run(&self, payload: Vec<u8>) -> Result<std::process::Output, ServiceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ServiceError::UpstreamFailure(format!("cannot start {}: {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(|e| {
                ServiceError::UpstreamFailure(format!("cannot write forecast input: {}", e))
            })?;
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ServiceError::UpstreamFailure(format!(
                "forecast process failed: {}",
                e
            ))),
            Err(_) => Err(ServiceError::UpstreamFailure(format!(
                "forecast process timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[derive(Deserialize)]
struct RawPrediction {
    item_code: Value,
    predicted_qty: f64,
}

/// Interprets the forecast process output: a prediction array, or an object carrying `error`.
pub fn parse_process_output(stdout: &[u8]) -> Result<Vec<Prediction>, ServiceError> {
    let value: Value = serde_json::from_slice(stdout).map_err(|e| {
        ServiceError::UpstreamFailure(format!("forecast output is not JSON: {}", e))
    })?;

    if let Some(error) = value.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ServiceError::UpstreamFailure(message));
    }

    let raw: Vec<RawPrediction> = serde_json::from_value(value).map_err(|e| {
        ServiceError::UpstreamFailure(format!("unexpected forecast output: {}", e))
    })?;
    Ok(raw
        .into_iter()
        .map(|r| Prediction {
            item_code: match r.item_code {
                Value::String(s) => s,
                other => other.to_string(),
            },
            predicted_qty: r.predicted_qty.round().max(0.0) as i64,
        })
        .collect())
}

#[async_trait]
impl Forecaster for ProcessForecaster {
    fn name(&self) -> &'static str {
        "process"
    }

    #[instrument(skip(self, input), fields(program = %self.program, items = input.items.len()))]
    async fn forecast(&self, input: &ForecastInput) -> Result<Vec<Prediction>, ServiceError> {
        let payload = serde_json::to_vec(input)
            .map_err(|e| ServiceError::InternalError(format!("encode forecast input: {}", e)))?;
        let output = self.run(payload).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(300).collect();
            warn!(status = ?output.status, stderr = %excerpt, "forecast process exited with failure");
            return Err(ServiceError::UpstreamFailure(format!(
                "forecast process exited with {}: {}",
                output.status, excerpt
            )));
        }

        debug!(bytes = output.stdout.len(), "forecast process finished");
        parse_process_output(&output.stdout)
    }
}

/// The configured external command, or the built-in trend model when none is set.
pub fn forecaster_from_config(config: &AppConfig) -> Arc<dyn Forecaster> {
    match config
        .forecast_command
        .as_deref()
        .and_then(|cmd| ProcessForecaster::from_command_line(cmd, config.forecast_timeout()))
    {
        Some(process) => Arc::new(process),
        None => Arc::new(TrendForecaster),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn demand(months: &[(&str, i64)]) -> ItemDemand {
        ItemDemand {
            item_code: "rice".into(),
            name: "Rice".into(),
            monthly: months
                .iter()
                .map(|(m, q)| MonthlyDemand {
                    month: m.to_string(),
                    quantity: *q,
                })
                .collect(),
        }
    }

    #[test]
    fn month_helpers_roll_over_year() {
        let dec = parse_month("2023-12").unwrap();
        assert_eq!(month_label(next_month(dec)), "2024-01");
        assert_eq!(parse_month("2023-13"), None);
        assert_eq!(parse_month("garbage"), None);
    }

    #[test]
    fn linear_fit_recovers_line() {
        let (slope, intercept) = linear_fit(&[1.0, 3.0, 5.0, 7.0]);
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_history_predicts_double_mean() {
        // recent mean 10 plus a flat trend projecting 10, no seasonal offset
        let item = demand(&[("2024-01", 10), ("2024-02", 10), ("2024-03", 10)]);
        assert_eq!(TrendForecaster::predict(&item, 4), Some(20));
    }

    #[test]
    fn declining_history_is_clamped_at_zero() {
        let item = demand(&[
            ("2024-01", 30),
            ("2024-02", 20),
            ("2024-03", 10),
            ("2024-04", 0),
        ]);
        assert_eq!(TrendForecaster::predict(&item, 5), Some(0));
        assert_eq!(TrendForecaster::predict(&demand(&[]), 5), None);
    }

    #[test]
    fn single_month_of_history_is_not_forecast() {
        assert_eq!(TrendForecaster::predict(&demand(&[("2024-03", 12)]), 4), None);
        assert!(TrendForecaster::predict(&demand(&[("2024-02", 0), ("2024-03", 12)]), 4).is_some());
    }

    #[test]
    fn seasonal_offset_uses_same_calendar_month() {
        // target January: the January value sits 9 above the overall mean of 4
        let mut item = demand(&[("2023-01", 13)]);
        for m in 2..=12 {
            item.monthly.push(MonthlyDemand {
                month: format!("2023-{:02}", m),
                quantity: 3,
            });
        }
        let without = TrendForecaster::predict(&item, 6).unwrap();
        let with = TrendForecaster::predict(&item, 1).unwrap();
        assert!(with > without);
    }

    #[tokio::test]
    async fn trend_forecaster_predicts_next_month() {
        let input = ForecastInput {
            as_of: "2024-03".into(),
            items: vec![demand(&[("2024-02", 4), ("2024-03", 4)])],
        };
        let predictions = TrendForecaster.forecast(&input).await.unwrap();
        assert_eq!(
            predictions,
            vec![Prediction {
                item_code: "rice".into(),
                predicted_qty: 8
            }]
        );
    }

    #[test]
    fn parses_prediction_array() {
        let out = br#"[{"item_code": "A1", "predicted_qty": 12.6}, {"item_code": 7, "predicted_qty": -2}]"#;
        let parsed = parse_process_output(out).unwrap();
        assert_eq!(parsed[0].item_code, "A1");
        assert_eq!(parsed[0].predicted_qty, 13);
        assert_eq!(parsed[1].item_code, "7");
        assert_eq!(parsed[1].predicted_qty, 0);
    }

    #[test]
    fn error_object_and_garbage_are_upstream_failures() {
        assert_matches!(
            parse_process_output(br#"{"error": "no data"}"#),
            Err(ServiceError::UpstreamFailure(msg)) if msg == "no data"
        );
        assert_matches!(
            parse_process_output(b"Traceback (most recent call last)"),
            Err(ServiceError::UpstreamFailure(_))
        );
        assert_matches!(
            parse_process_output(br#"[{"code": 1}]"#),
            Err(ServiceError::UpstreamFailure(_))
        );
    }

    #[test]
    fn blank_command_line_is_rejected() {
        assert!(ProcessForecaster::from_command_line("   ", Duration::from_secs(1)).is_none());
        let p = ProcessForecaster::from_command_line("python3 forecast.py --json", Duration::from_secs(1))
            .unwrap();
        assert_eq!(p.program, "python3");
        assert_eq!(p.args, vec!["forecast.py", "--json"]);
    }
}
