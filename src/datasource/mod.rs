//! Data source adapter: authoritative metric / price readings over a window.
//!
//! The resolver only depends on the [`DataSource`] trait. [`HttpDataSource`]
//! is the production adapter over the metrics/price REST API:
//!
//!   GET {base}/v1/{metrics|prices|feeds}/{id}/snapshot?at=T
//!   GET {base}/v1/{metrics|prices|feeds}/{id}/twap?start=S&end=E
//!   GET {base}/v1/{metrics|prices|feeds}/{id}/extremum?start=S&end=E&direction=max
//!
//! Every endpoint answers `{"value": "<decimal>"}`.

use crate::market::{Subject, SubjectKind};
use crate::predicate::ExtremumDirection;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("data source rejected request {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed data source response: {0}")]
    Malformed(String),
}

impl DataSourceError {
    /// Network failures, 5xx and throttling are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DataSourceError::Unavailable(_))
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Point value at `at`.
    async fn snapshot_value(&self, subject: &Subject, at: u64) -> Result<Decimal, DataSourceError>;

    /// Time-weighted average over `[start, end]`.
    async fn time_average_value(
        &self,
        subject: &Subject,
        start: u64,
        end: u64,
    ) -> Result<Decimal, DataSourceError>;

    /// Max or min over `[start, end]`.
    async fn extremum_value(
        &self,
        subject: &Subject,
        start: u64,
        end: u64,
        direction: ExtremumDirection,
    ) -> Result<Decimal, DataSourceError>;
}

#[derive(Debug, Deserialize)]
struct ValueResponse {
    value: serde_json::Value,
}

/// REST adapter for the metrics/price service.
pub struct HttpDataSource {
    http: Client,
    base_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, DataSourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, subject: &Subject, op: &str) -> String {
        format!(
            "{}/v1/{}/{}/{}",
            self.base_url,
            collection(subject.kind),
            subject.id,
            op
        )
    }

    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Decimal, DataSourceError> {
        debug!(url = %url, query = ?query, "data source request");

        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DataSourceError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DataSourceError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DataSourceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ValueResponse = resp
            .json()
            .await
            .map_err(|e| DataSourceError::Malformed(e.to_string()))?;
        parse_value(&parsed.value)
    }
}

fn collection(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Metric => "metrics",
        SubjectKind::TokenPrice => "prices",
        SubjectKind::Generic => "feeds",
    }
}

fn parse_value(value: &serde_json::Value) -> Result<Decimal, DataSourceError> {
    let raw = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(DataSourceError::Malformed(format!("value: {}", other))),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| DataSourceError::Malformed(format!("value {}: {}", raw, e)))
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn snapshot_value(&self, subject: &Subject, at: u64) -> Result<Decimal, DataSourceError> {
        let url = self.url(subject, "snapshot");
        self.fetch(&url, &[("at", at.to_string())]).await
    }

    async fn time_average_value(
        &self,
        subject: &Subject,
        start: u64,
        end: u64,
    ) -> Result<Decimal, DataSourceError> {
        let url = self.url(subject, "twap");
        self.fetch(&url, &[("start", start.to_string()), ("end", end.to_string())])
            .await
    }

    async fn extremum_value(
        &self,
        subject: &Subject,
        start: u64,
        end: u64,
        direction: ExtremumDirection,
    ) -> Result<Decimal, DataSourceError> {
        let url = self.url(subject, "extremum");
        self.fetch(
            &url,
            &[
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("direction", direction.as_str().to_string()),
            ],
        )
        .await
    }
}
