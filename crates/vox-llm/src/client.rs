use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{LlmError, Result};
use crate::types::{GenerateRequest, GenerateResponse, StreamEvent};

/// Common interface for text-generation backends. The orchestrator only ever
/// sees this trait, never a concrete HTTP client, so a deterministic stand-in
/// can stand in for tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse>;

    /// Stream response events through a channel. Default falls back to
    /// `generate` and emits a single delta followed by `Done`.
    async fn stream(&self, req: &GenerateRequest, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let resp = self.generate(req).await?;
        let _ = tx.send(StreamEvent::TextDelta(resp.content)).await;
        let _ = tx
            .send(StreamEvent::Done {
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

/// Talks to an OpenAI-compatible chat-completions endpoint over HTTP. This is
/// the lowest common denominator most self-hosted and hosted model servers
/// speak, so it is the one wire format this client hard-codes.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint_url: String,
    provider_name: String,
}

impl HttpLlmClient {
    pub fn new(endpoint_url: String, timeout: std::time::Duration) -> Self {
        Self::named("default", endpoint_url, timeout)
    }

    pub fn named(name: impl Into<String>, endpoint_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self { client, endpoint_url, provider_name: name.into() }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
        let mut messages = vec![serde_json::json!({"role": "system", "content": req.system})];
        for m in &req.messages {
            messages.push(serde_json::json!({"role": m.role, "content": m.content}));
        }

        let body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "stream": false,
        });

        tracing::debug!(model = %req.model, endpoint = %self.endpoint_url, "sending generate request");

        let resp = self
            .client
            .post(&self.endpoint_url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(LlmError::RateLimited { retry_after_ms });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message: text });
        }

        let parsed: ApiResponse = resp.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parse_response(req.model.clone(), parsed))
    }
}

fn parse_response(requested_model: String, resp: ApiResponse) -> GenerateResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();
    let stop_reason = choice.and_then(|c| c.finish_reason).unwrap_or_else(|| "stop".to_string());

    GenerateResponse {
        content,
        model: resp.model.unwrap_or(requested_model),
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
    }
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(serde::Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Deterministic stand-in used by tests and local development without a
/// reachable model server: echoes the last user message with a fixed prefix.
pub struct EchoLlmClient {
    name: String,
}

impl EchoLlmClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoLlmClient {
    fn default() -> Self {
        Self::new("echo")
    }
}

#[async_trait]
impl LlmClient for EchoLlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
        let last = req.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(GenerateResponse {
            content: format!("echo: {last}"),
            model: req.model.clone(),
            tokens_in: last.split_whitespace().count() as u32,
            tokens_out: last.split_whitespace().count() as u32 + 2,
            stop_reason: "stop".to_string(),
        })
    }
}

/// Always fails. Used to exercise router failover in tests.
pub struct FailingLlmClient {
    name: String,
}

impl FailingLlmClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse> {
        Err(LlmError::Unavailable(format!("{} is intentionally down", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn req() -> GenerateRequest {
        GenerateRequest {
            model: "test-model".to_string(),
            system: "be helpful".to_string(),
            messages: vec![crate::types::Message { role: Role::User, content: "hi there".to_string() }],
            max_tokens: 64,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn echo_client_echoes_last_message() {
        let client = EchoLlmClient::default();
        let resp = client.generate(&req()).await.unwrap();
        assert_eq!(resp.content, "echo: hi there");
    }

    #[tokio::test]
    async fn failing_client_always_errors() {
        let client = FailingLlmClient::new("down");
        assert!(client.generate(&req()).await.is_err());
    }

    #[tokio::test]
    async fn stream_default_falls_back_to_generate() {
        let client = EchoLlmClient::default();
        let (tx, mut rx) = mpsc::channel(4);
        client.stream(&req(), tx).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::TextDelta(ref s) if s == "echo: hi there"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, StreamEvent::Done { .. }));
    }
}
