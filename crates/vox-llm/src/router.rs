use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::LlmClient;
use crate::error::{LlmError, Result};
use crate::health::HealthTracker;
use crate::types::{GenerateRequest, GenerateResponse, StreamEvent};

/// A provider entry inside a [`ProviderRouter`]: the client plus how many
/// extra attempts it gets before the router moves to the next one.
pub struct ProviderSlot {
    pub client: Box<dyn LlmClient>,
    pub max_retries: u32,
}

impl ProviderSlot {
    pub fn new(client: Box<dyn LlmClient>, max_retries: u32) -> Self {
        Self { client, max_retries }
    }
}

/// Tries providers in priority order, retrying each with exponential backoff
/// before failing over to the next slot. Every outcome is recorded in the
/// shared [`HealthTracker`] so operators can see which provider is serving
/// traffic.
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
    health: Arc<HealthTracker>,
}

impl ProviderRouter {
    pub fn new(slots: Vec<ProviderSlot>, health: Arc<HealthTracker>) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots, health }
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        self.health.clone()
    }
}

#[async_trait]
impl LlmClient for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
        let mut last_err: Option<LlmError> = None;

        for slot in &self.slots {
            let provider_name = slot.client.name();

            for attempt in 0..=slot.max_retries {
                let started = Instant::now();
                match slot.client.generate(req).await {
                    Ok(resp) => {
                        self.health.record_success(provider_name, started.elapsed().as_millis() as u64);
                        if attempt > 0 {
                            tracing::info!(provider = provider_name, attempt, "generate succeeded after retry");
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        self.health.record_error(provider_name, &e);
                        tracing::warn!(provider = provider_name, attempt, err = %e, "provider generate failed");

                        if !e.is_retriable() {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);
                        if attempt < slot.max_retries {
                            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
                        }
                    }
                }
            }

            tracing::info!(provider = provider_name, "provider exhausted, trying next provider");
        }

        Err(last_err.unwrap_or_else(|| LlmError::Unavailable("all providers failed".to_string())))
    }

    async fn stream(&self, req: &GenerateRequest, tx: mpsc::Sender<StreamEvent>) -> Result<()> {
        let mut last_err: Option<LlmError> = None;

        for slot in &self.slots {
            let provider_name = slot.client.name();

            for attempt in 0..=slot.max_retries {
                let started = Instant::now();
                match slot.client.stream(req, tx.clone()).await {
                    Ok(()) => {
                        self.health.record_success(provider_name, started.elapsed().as_millis() as u64);
                        return Ok(());
                    }
                    Err(e) => {
                        self.health.record_error(provider_name, &e);
                        tracing::warn!(provider = provider_name, attempt, err = %e, "provider stream failed");

                        if !e.is_retriable() {
                            last_err = Some(e);
                            break;
                        }

                        last_err = Some(e);
                        if attempt < slot.max_retries {
                            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
                        }
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::Unavailable("all providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EchoLlmClient, FailingLlmClient};
    use crate::types::{Message, Role};

    fn req() -> GenerateRequest {
        GenerateRequest {
            model: "test-model".to_string(),
            system: "sys".to_string(),
            messages: vec![Message { role: Role::User, content: "hello".to_string() }],
            max_tokens: 32,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn router_falls_back_to_second_provider() {
        let router = ProviderRouter::new(
            vec![
                ProviderSlot::new(Box::new(FailingLlmClient::new("primary")), 0),
                ProviderSlot::new(Box::new(EchoLlmClient::new("backup")), 0),
            ],
            HealthTracker::new(),
        );

        let resp = router.generate(&req()).await.unwrap();
        assert_eq!(resp.content, "echo: hello");
    }

    #[tokio::test]
    async fn router_errors_when_all_fail() {
        let router = ProviderRouter::new(
            vec![
                ProviderSlot::new(Box::new(FailingLlmClient::new("a")), 0),
                ProviderSlot::new(Box::new(FailingLlmClient::new("b")), 0),
            ],
            HealthTracker::new(),
        );

        assert!(router.generate(&req()).await.is_err());
    }

    #[tokio::test]
    async fn successful_calls_are_recorded_in_health() {
        let router = ProviderRouter::new(
            vec![ProviderSlot::new(Box::new(EchoLlmClient::new("only")), 0)],
            HealthTracker::new(),
        );
        router.generate(&req()).await.unwrap();
        let entries = router.health().all_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].requests_ok, 1);
    }
}
