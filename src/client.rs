//! HTTP sampler for measured API calls.
//!
//! This module wraps one reqwest client and performs a single measured
//! call per invocation, streaming or blocking. Every fault — connect
//! error, timeout, bad status, undecodable body — is folded into a failed
//! [`SampleResult`]; nothing here returns an error to the driver once a
//! sample has started.

use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::request::{
    CallConfig, GenerateResponse, Mode, ModelInfo, ModelList, SampleResult, estimate_tokens,
    truncate_chars,
};
use crate::stream::SseReader;
use reqwest::{Client, Proxy, header};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Maximum characters of an error body kept in a failure record.
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP client wrapper that produces one [`SampleResult`] per call.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<Config>,
}

impl ApiClient {
    /// Create a new API client from the resolved configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let mut builder = Client::builder()
            .timeout(config.api.timeout)
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .tcp_nodelay(true)
            .default_headers(headers)
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = &config.api.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        let client = builder.build()?;

        Ok(Self { client, config })
    }

    /// Run one measured call. Never fails: faults become failure records.
    pub async fn sample(&self, call: &CallConfig, mode: Mode) -> SampleResult {
        match mode {
            Mode::Streaming => self.sample_streaming(call).await,
            Mode::Blocking => self.sample_blocking(call).await,
        }
    }

    /// Streaming call: TTFT is the arrival of the first text fragment.
    async fn sample_streaming(&self, call: &CallConfig) -> SampleResult {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.config.api.base_url, call.model
        );

        trace!(model = %call.model, "sending streaming request");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .query(&[
                ("key", self.config.api.api_key.as_str()),
                ("alt", "sse"),
            ])
            .json(&call.to_wire())
            .send()
            .await;

        let mut response = match response {
            Ok(response) => response,
            Err(e) => return SampleResult::failure(call, Mode::Streaming, transport_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SampleResult::failure(
                call,
                Mode::Streaming,
                http_error(status.as_u16(), &body),
            );
        }

        let mut reader = SseReader::new(start);
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => reader.push_chunk(&bytes),
                Ok(None) => break,
                Err(e) => {
                    return SampleResult::failure(call, Mode::Streaming, transport_error(&e));
                }
            }
        }

        let outcome = reader.finish();
        let total_time = start.elapsed();

        debug!(
            model = %call.model,
            events = outcome.event_count,
            chars = outcome.text.len(),
            "stream closed"
        );

        SampleResult::success(
            call,
            Mode::Streaming,
            outcome.first_text,
            total_time,
            outcome.token_estimate,
            outcome.text,
        )
    }

    /// Blocking call: one request, one decode. TTFT is defined to equal
    /// total time — there is no partial-arrival signal in this mode.
    async fn sample_blocking(&self, call: &CallConfig) -> SampleResult {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api.base_url, call.model
        );

        trace!(model = %call.model, "sending blocking request");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api.api_key.as_str())])
            .json(&call.to_wire())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return SampleResult::failure(call, Mode::Blocking, transport_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SampleResult::failure(
                call,
                Mode::Blocking,
                http_error(status.as_u16(), &body),
            );
        }

        let payload: GenerateResponse = match response.json().await {
            Ok(payload) => payload,
            Err(e) => return SampleResult::failure(call, Mode::Blocking, transport_error(&e)),
        };

        let total_time = start.elapsed();
        let text = payload.visible_text();
        let output_tokens = payload
            .usage_metadata
            .as_ref()
            .and_then(|usage| usage.candidates_token_count)
            .unwrap_or_else(|| estimate_tokens(&text));

        SampleResult::success(
            call,
            Mode::Blocking,
            Some(total_time),
            total_time,
            output_tokens,
            text,
        )
    }

    /// List models available to this API key.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/v1beta/models", self.config.api.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.config.api.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProbeError::ListModels(transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::ListModels(http_error(status.as_u16(), &body)));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ProbeError::ListModels(e.to_string()))?;

        Ok(list.models)
    }
}

/// Map a transport fault to its report string. Timeouts are kept
/// taxonomically distinct from other faults.
fn transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timeout".to_string()
    } else {
        err.to_string()
    }
}

/// Map a non-success HTTP status and body to its report string.
fn http_error(status: u16, body: &str) -> String {
    format!("HTTP {status}: {}", truncate_chars(body, ERROR_BODY_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, CallSettings, RunConfig};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str, timeout: Duration) -> Arc<Config> {
        Arc::new(Config {
            api: ApiConfig {
                api_key: "test-key".to_string(),
                base_url: base_url.trim_end_matches('/').to_string(),
                proxy: None,
                timeout,
            },
            call: CallSettings {
                temperature: 0.7,
                max_output_tokens: 128,
                thinking_budget: None,
                system_instruction: None,
            },
            run: RunConfig {
                rounds: 1,
                delay: Duration::ZERO,
            },
        })
    }

    fn test_call() -> CallConfig {
        CallConfig {
            model: "test-model".to_string(),
            prompt_label: "short".to_string(),
            prompt: "What is 2+2?".to_string(),
            system_instruction: None,
            history: Vec::new(),
            thinking_budget: None,
            max_output_tokens: 128,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_blocking_success_with_usage_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Hello"}]}}],
                "usageMetadata": {"candidatesTokenCount": 1}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(&server.uri(), Duration::from_secs(5))).unwrap();
        let result = client.sample(&test_call(), Mode::Blocking).await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.text.as_deref(), Some("Hello"));
        assert_eq!(result.output_tokens, Some(1));
        assert!(result.total_time.is_some());
        assert_eq!(result.ttft, result.total_time);
    }

    #[tokio::test]
    async fn test_blocking_token_fallback_without_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "one two three"}]}}]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(&server.uri(), Duration::from_secs(5))).unwrap();
        let result = client.sample(&test_call(), Mode::Blocking).await;

        assert!(result.success);
        assert_eq!(result.output_tokens, Some(3));
    }

    #[tokio::test]
    async fn test_streaming_success_accumulates_sse_events() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo!\"}]}}]}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(&server.uri(), Duration::from_secs(5))).unwrap();
        let result = client.sample(&test_call(), Mode::Streaming).await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.text.as_deref(), Some("Hello!"));
        let ttft = result.ttft.expect("ttft recorded");
        let total = result.total_time.expect("total recorded");
        assert!(ttft <= total);
    }

    #[tokio::test]
    async fn test_streaming_timeout_maps_to_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            ApiClient::new(test_config(&server.uri(), Duration::from_millis(50))).unwrap();
        let result = client.sample(&test_call(), Mode::Streaming).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Request timeout"));
        assert!(result.ttft.is_none());
        assert!(result.total_time.is_none());
    }

    #[tokio::test]
    async fn test_http_error_is_truncated_and_nonfatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string("x".repeat(1000)),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(&server.uri(), Duration::from_secs(5))).unwrap();
        let result = client.sample(&test_call(), Mode::Blocking).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("HTTP 429: "));
        assert!(error.len() < 250);
    }

    #[tokio::test]
    async fn test_connect_error_becomes_failure_record() {
        // Nothing listens on port 1.
        let client =
            ApiClient::new(test_config("http://127.0.0.1:1", Duration::from_secs(2))).unwrap();
        let result = client.sample(&test_call(), Mode::Streaming).await;

        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.ttft.is_none());
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {
                        "name": "models/gemini-2.5-flash",
                        "supportedGenerationMethods": ["generateContent", "streamGenerateContent"]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_config(&server.uri(), Duration::from_secs(5))).unwrap();
        let models = client.list_models().await.unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "models/gemini-2.5-flash");
        assert_eq!(models[0].supported_generation_methods.len(), 2);
    }
}
