use std::time::{Duration, Instant};

use garde::Validate;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use strum::Display;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::models::{AnalyzeRequest, Comp, HealthStatus, ImageUpload, UserJob};
use crate::services::image_prep::{self, EncodingOptions, ImageError, PreparedImage};

const ANALYZE_ENDPOINT: &str = "/analyze";
const HEALTH_ENDPOINT: &str = "/healthz";
const COMPS_ENDPOINT: &str = "/comps";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Error bodies are kept for diagnostics, up to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 2048;

/// Enough bytes for `MAX_ERROR_BODY_CHARS` characters of UTF-8.
const MAX_ERROR_BODY_BYTES: usize = MAX_ERROR_BODY_CHARS * 4;

/// Fixed configuration of an [`AnalysisClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Larger success bodies are rejected without being read in full.
    pub max_response_bytes: usize,
    pub encoding: EncodingOptions,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            encoding: EncodingOptions::default(),
        }
    }
}

/// Client for the listing-analysis backend.
///
/// Holds only its HTTP connection pool and fixed settings. Requests are
/// independent of each other and are never retried.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: Client,
    base_url: String,
    max_response_bytes: usize,
    encoding: EncodingOptions,
}

impl AnalysisClient {
    pub fn new(settings: ClientSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_response_bytes: settings.max_response_bytes,
            encoding: settings.encoding,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload an image with optional notes and decode the resulting job.
    pub async fn analyze(
        &self,
        image: &ImageUpload,
        notes: Option<&str>,
        user_id: &str,
    ) -> Result<UserJob, AnalysisError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("analyze", %request_id, user_id);

        async move {
            let started = Instant::now();
            metrics::counter!("analysis_requests_total").increment(1);

            let result = self.analyze_inner(image, notes, user_id).await;

            let elapsed = started.elapsed();
            metrics::histogram!("analysis_request_seconds").record(elapsed.as_secs_f64());

            match &result {
                Ok(job) => info!(
                    job_id = %job.id,
                    comps = job.comps.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Analysis completed"
                ),
                Err(e) => {
                    metrics::counter!("analysis_requests_failed", "kind" => e.kind().to_string())
                        .increment(1);
                    warn!(
                        kind = %e.kind(),
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Analysis failed"
                    );
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn analyze_inner(
        &self,
        image: &ImageUpload,
        notes: Option<&str>,
        user_id: &str,
    ) -> Result<UserJob, AnalysisError> {
        let prepared = self.prepare(image).await?;

        let request = AnalyzeRequest::new(prepared, notes, user_id);
        request
            .validate()
            .map_err(|report| AnalysisError::InvalidInput(report.to_string()))?;

        debug!(parts = ?request.parts(), "Sending analyze request");

        let form = request
            .into_form()
            .map_err(|e| AnalysisError::InvalidInput(e.to_string()))?;

        let response = self
            .http
            .post(self.endpoint(ANALYZE_ENDPOINT))
            .multipart(form)
            .send()
            .await
            .map_err(AnalysisError::Network)?;

        let body = success_body(response, self.max_response_bytes).await?;
        UserJob::from_json_slice(&body).map_err(|source| AnalysisError::decode(source, &body))
    }

    /// Re-encode the image off the async runtime.
    async fn prepare(&self, image: &ImageUpload) -> Result<PreparedImage, AnalysisError> {
        if image.bytes.is_empty() {
            return Err(ImageError::Empty.into());
        }

        let bytes = image.bytes.clone();
        let options = self.encoding;
        let prepared = tokio::task::spawn_blocking(move || image_prep::prepare_image(&bytes, options))
            .await
            .map_err(|e| AnalysisError::InvalidInput(format!("image preparation failed: {}", e)))??;

        if prepared.content_type != image.content_type {
            debug!(
                declared = %image.content_type,
                sent = %prepared.content_type,
                bytes_in = image.bytes.len(),
                bytes_out = prepared.bytes.len(),
                "Image re-encoded"
            );
        }

        Ok(prepared)
    }

    /// `GET /healthz`.
    pub async fn health(&self) -> Result<HealthStatus, AnalysisError> {
        self.get_json(HEALTH_ENDPOINT, &[]).await
    }

    /// `GET /comps`, optionally filtered by a free-text title query.
    pub async fn comps(&self, query: Option<&str>) -> Result<Vec<Comp>, AnalysisError> {
        let params: Vec<(&str, &str)> = match query.filter(|q| !q.is_empty()) {
            Some(q) => vec![("q", q)],
            None => Vec::new(),
        };
        self.get_json(COMPS_ENDPOINT, &params).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AnalysisError> {
        let url = self.endpoint(path);
        debug!(%url, "Calling backend");

        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(AnalysisError::Network)?;

        let body = success_body(response, self.max_response_bytes).await?;
        serde_json::from_slice(&body).map_err(|source| AnalysisError::decode(source, &body))
    }
}

/// Read the body of a successful response, or turn the status into an error.
async fn success_body(response: Response, limit: usize) -> Result<Vec<u8>, AnalysisError> {
    let status = response.status();
    if !status.is_success() {
        let body = read_capped(response, MAX_ERROR_BODY_BYTES)
            .await
            .map(|(body, _)| body)
            .unwrap_or_default();
        return Err(AnalysisError::Server {
            status,
            body: truncate(&String::from_utf8_lossy(&body)),
        });
    }

    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(AnalysisError::ResponseTooLarge { limit });
    }

    let (body, complete) = read_capped(response, limit)
        .await
        .map_err(AnalysisError::Network)?;
    if !complete {
        return Err(AnalysisError::ResponseTooLarge { limit });
    }
    Ok(body)
}

/// Read at most `limit` bytes. The flag is false if the body was cut short.
async fn read_capped(
    mut response: Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, false));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, true))
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// The four ways a request can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    NetworkFailure,
    ServerFailure,
    DecodeFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Server { status: StatusCode, body: String },

    #[error("Response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("Response does not match the expected schema: {source}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
}

impl AnalysisError {
    fn decode(source: serde_json::Error, body: &[u8]) -> Self {
        Self::Decode {
            source,
            body: truncate(&String::from_utf8_lossy(body)),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidImage(_) | Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::Network(_) => FailureKind::NetworkFailure,
            Self::Server { .. } => FailureKind::ServerFailure,
            Self::Decode { .. } | Self::ResponseTooLarge { .. } => FailureKind::DecodeFailure,
        }
    }

    /// True only for transport failures. Callers own any retry policy.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::NetworkFailure
    }
}
