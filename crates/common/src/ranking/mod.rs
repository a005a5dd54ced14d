//! Remote ranking service abstraction
//!
//! The merge/rank adapter needs three capabilities from a ranking service:
//! - submit training rows and get back a job id
//! - poll a job until it is ready or failed
//! - rank a feature table with a trained model
//!
//! Providers:
//! - HTTP (JSON bodies carrying CSV feature tables, basic auth)
//! - Mock (deterministic, in-process)

use crate::config::RankerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Remote training job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerStatus {
    #[serde(alias = "Training", alias = "training")]
    Pending,
    #[serde(alias = "Available", alias = "available")]
    Ready,
    #[serde(alias = "Failed")]
    Failed,
}

impl RankerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RankerStatus::Pending)
    }
}

/// Confidence the service assigned to one answer label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAnswer {
    #[serde(rename = "answer_id")]
    pub label: String,
    pub confidence: f64,
}

/// Feature rows sent to the ranker, one row per answer label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<f64>)>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, values: Vec<f64>) {
        self.rows.push((label.into(), values));
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize as `answer_id,f1,...,fn` CSV
    pub fn to_csv(&self) -> String {
        let mut out = String::from("answer_id");
        for column in &self.columns {
            out.push(',');
            out.push_str(&csv_field(column));
        }
        out.push('\n');

        for (label, values) in &self.rows {
            out.push_str(&csv_field(label));
            for value in values {
                let _ = write!(out, ",{}", value);
            }
            out.push('\n');
        }
        out
    }
}

/// Quote a CSV field when it contains separators or quotes
pub fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Trait for remote ranking services
#[async_trait]
pub trait RankingService: Send + Sync {
    /// Submit CSV training data, returning the remote job id
    async fn submit_training(&self, name: &str, training_csv: &str) -> Result<String>;

    /// Current status of a training job
    async fn status(&self, job_id: &str) -> Result<RankerStatus>;

    /// Rank one batch of answers with a trained model
    async fn rank(&self, model_id: &str, table: &FeatureTable) -> Result<Vec<RankedAnswer>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// HTTP ranking service client
pub struct HttpRankingService {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct TrainRequest<'a> {
    name: &'a str,
    training_data: &'a str,
}

#[derive(Deserialize)]
struct TrainResponse {
    ranker_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: RankerStatus,
}

#[derive(Serialize)]
struct RankRequest {
    answer_data: String,
}

#[derive(Deserialize)]
struct RankResponse {
    answers: Option<Vec<RankedAnswer>>,
}

impl HttpRankingService {
    /// Create a new HTTP client for the ranking service
    pub fn new(
        base_url: String,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        job_id: Option<&str>,
    ) -> Result<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AppError::RankingService {
                message: format!("Request failed: {}", e),
                job_id: job_id.map(str::to_string),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RankingService {
                message: format!("API error {}: {}", status, body),
                job_id: job_id.map(str::to_string),
            });
        }

        response.json().await.map_err(|e| AppError::RankingService {
            message: format!("Failed to parse response: {}", e),
            job_id: job_id.map(str::to_string),
        })
    }
}

#[async_trait]
impl RankingService for HttpRankingService {
    async fn submit_training(&self, name: &str, training_csv: &str) -> Result<String> {
        let url = format!("{}/v1/rankers", self.base_url);
        let request = self.client.post(&url).json(&TrainRequest {
            name,
            training_data: training_csv,
        });

        let result = self.send::<TrainResponse>(request, None).await;
        crate::metrics::record_ranker_request("train", result.is_ok());
        Ok(result?.ranker_id)
    }

    async fn status(&self, job_id: &str) -> Result<RankerStatus> {
        let url = format!("{}/v1/rankers/{}", self.base_url, job_id);
        let result = self
            .send::<StatusResponse>(self.client.get(&url), Some(job_id))
            .await;
        crate::metrics::record_ranker_request("status", result.is_ok());
        Ok(result?.status)
    }

    async fn rank(&self, model_id: &str, table: &FeatureTable) -> Result<Vec<RankedAnswer>> {
        let url = format!("{}/v1/rankers/{}/rank", self.base_url, model_id);
        let request = self.client.post(&url).json(&RankRequest {
            answer_data: table.to_csv(),
        });

        let result = self.send::<RankResponse>(request, Some(model_id)).await;
        crate::metrics::record_ranker_request("rank", result.is_ok());

        result?.answers.ok_or_else(|| AppError::RankingService {
            message: "Response carried no answers".to_string(),
            job_id: Some(model_id.to_string()),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Mock ranking service for testing and offline runs
///
/// Training jobs are ready immediately; the confidence of an answer is the
/// mean of its feature values.
#[derive(Default)]
pub struct MockRankingService;

impl MockRankingService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RankingService for MockRankingService {
    async fn submit_training(&self, _name: &str, _training_csv: &str) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn status(&self, _job_id: &str) -> Result<RankerStatus> {
        Ok(RankerStatus::Ready)
    }

    async fn rank(&self, _model_id: &str, table: &FeatureTable) -> Result<Vec<RankedAnswer>> {
        Ok(table
            .rows
            .iter()
            .map(|(label, values)| RankedAnswer {
                label: label.clone(),
                confidence: if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                },
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a ranking service based on configuration
pub fn create_ranking_service(config: &RankerConfig) -> Result<Arc<dyn RankingService>> {
    match config.provider.as_str() {
        "http" => {
            let endpoint = config.endpoint.clone().ok_or_else(|| AppError::MissingOption {
                option: "ranker.endpoint".to_string(),
            })?;
            Ok(Arc::new(HttpRankingService::new(
                endpoint,
                config.username.clone(),
                config.password.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockRankingService::new())),
        other => Err(AppError::config(format!("Unknown ranking provider: {}", other))),
    }
}
