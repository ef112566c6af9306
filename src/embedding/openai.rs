//! Batch embedding client for OpenAI-compatible APIs
//!
//! Submission uploads a JSONL request file (`purpose = batch`) and creates a
//! batch over `/v1/embeddings`. Results come back as another JSONL file with
//! one response per `custom_id`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::service::{
    BatchCounts, BatchEmbeddingService, BatchItem, BatchStatusReport, EmbeddingError, EmbeddingResult,
    RemoteBatchStatus,
};
use crate::config::EmbeddingConfig;
use crate::types::Embedding;
use crate::util::truncate_str;

const EMBEDDINGS_ENDPOINT: &str = "/v1/embeddings";

/// Configuration for the batch client
#[derive(Debug, Clone)]
pub struct OpenAiBatchConfig {
    /// API base (e.g., "https://api.openai.com/v1")
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub completion_window: String,
    pub timeout: std::time::Duration,
}

impl OpenAiBatchConfig {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            completion_window: config.completion_window.clone(),
            timeout: config.timeout(),
        }
    }
}

/// One line of the request file
#[derive(Debug, Serialize)]
struct BatchRequestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: EmbeddingRequest<'a>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateBatchRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'a str,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: RemoteBatchStatus,
    #[serde(default)]
    request_counts: Option<BatchCounts>,
    #[serde(default)]
    output_file_id: Option<String>,
}

/// One line of the output file
#[derive(Debug, Deserialize)]
struct BatchOutputLine {
    custom_id: String,
    #[serde(default)]
    response: Option<BatchOutputResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchOutputResponse {
    status_code: u16,
    body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI error response format
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Parsed output file
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub embeddings: HashMap<String, Embedding>,
    /// Lines that carried an error or could not be read
    pub errors: usize,
}

/// Build the JSONL request file for `items`
pub fn build_request_file(model: &str, items: &[BatchItem]) -> EmbeddingResult<String> {
    let mut out = String::new();
    for item in items {
        let line = BatchRequestLine {
            custom_id: &item.id,
            method: "POST",
            url: EMBEDDINGS_ENDPOINT,
            body: EmbeddingRequest {
                model,
                input: &item.text,
            },
        };
        let json = serde_json::to_string(&line)
            .map_err(|e| EmbeddingError::InvalidResponse(format!("Failed to serialize request: {}", e)))?;
        out.push_str(&json);
        out.push('\n');
    }
    Ok(out)
}

/// Parse the JSONL output file, skipping error lines
pub fn parse_output_file(content: &str) -> BatchOutput {
    let mut output = BatchOutput::default();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed: BatchOutputLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping unreadable batch output line: {}", e);
                output.errors += 1;
                continue;
            }
        };
        let embedding = parsed
            .response
            .filter(|r| r.status_code == 200)
            .and_then(|r| serde_json::from_value::<EmbeddingResponse>(r.body).ok())
            .and_then(|r| r.data.into_iter().next())
            .map(|d| d.embedding);
        match embedding {
            Some(embedding) => {
                output.embeddings.insert(parsed.custom_id, embedding);
            }
            None => {
                debug!("No embedding for {}", parsed.custom_id);
                output.errors += 1;
            }
        }
    }
    output
}

/// Async client for the files and batches endpoints
#[derive(Debug, Clone)]
pub struct OpenAiBatchClient {
    client: Client,
    config: OpenAiBatchConfig,
}

impl OpenAiBatchClient {
    pub fn new(config: OpenAiBatchConfig) -> EmbeddingResult<Self> {
        info!(
            "Initializing batch embedding client: api_base={}, model={}",
            config.api_base, config.model
        );

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let auth_value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| EmbeddingError::Config(format!("Invalid API key format: {}", e)))?,
            );
        } else if config.api_base.contains("openai.com") {
            warn!("No API key provided for {}", config.api_base);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    async fn upload_request_file(&self, jsonl: String) -> EmbeddingResult<String> {
        let part = Part::bytes(jsonl.into_bytes())
            .file_name("batch.jsonl")
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self.client.post(self.url("/files")).multipart(form).send().await?;
        let file: FileObject = read_json(check_status(response).await?).await?;
        info!("Uploaded batch file: {}", file.id);
        Ok(file.id)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> EmbeddingResult<BatchObject> {
        let response = self
            .client
            .get(self.url(&format!("/batches/{}", batch_id)))
            .send()
            .await?;
        read_json(check_status(response).await?).await
    }

    async fn download_file(&self, file_id: &str) -> EmbeddingResult<String> {
        let response = self
            .client
            .get(self.url(&format!("/files/{}/content", file_id)))
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }
}

/// Turn an error status into an [`EmbeddingError`]
async fn check_status(response: Response) -> EmbeddingResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000); // Convert to milliseconds
        return Err(EmbeddingError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
        Ok(error_response) => error_response.error.message,
        Err(_) => truncate_str(&error_text, 500),
    };
    Err(EmbeddingError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> EmbeddingResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| EmbeddingError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl BatchEmbeddingService for OpenAiBatchClient {
    async fn submit_batch(&self, items: &[BatchItem]) -> EmbeddingResult<String> {
        if items.is_empty() {
            return Err(EmbeddingError::EmptyBatch);
        }

        let jsonl = build_request_file(&self.config.model, items)?;
        let file_id = self.upload_request_file(jsonl).await?;

        let request = CreateBatchRequest {
            input_file_id: &file_id,
            endpoint: EMBEDDINGS_ENDPOINT,
            completion_window: &self.config.completion_window,
        };
        let response = self.client.post(self.url("/batches")).json(&request).send().await?;
        let batch: BatchObject = read_json(check_status(response).await?).await?;

        info!("Created batch job: {} with {} texts", batch.id, items.len());
        Ok(batch.id)
    }

    async fn get_status(&self, batch_id: &str) -> EmbeddingResult<BatchStatusReport> {
        let batch = self.retrieve_batch(batch_id).await?;
        Ok(BatchStatusReport {
            status: batch.status,
            counts: batch.request_counts.unwrap_or_default(),
        })
    }

    async fn get_results(&self, batch_id: &str) -> EmbeddingResult<HashMap<String, Embedding>> {
        let batch = self.retrieve_batch(batch_id).await?;
        if batch.status != RemoteBatchStatus::Completed {
            return Err(EmbeddingError::NotReady {
                batch_id: batch_id.to_string(),
                status: batch.status,
            });
        }
        let file_id = batch.output_file_id.ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!("Batch {} completed but no output file available", batch_id))
        })?;

        let output = parse_output_file(&self.download_file(&file_id).await?);
        if output.errors > 0 {
            warn!("Batch {} has {} failed requests", batch_id, output.errors);
        }
        info!("Retrieved {} embeddings from batch {}", output.embeddings.len(), batch_id);
        Ok(output.embeddings)
    }
}
