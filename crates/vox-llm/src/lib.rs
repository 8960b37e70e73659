pub mod client;
pub mod error;
pub mod health;
pub mod router;
pub mod types;

pub use client::{EchoLlmClient, FailingLlmClient, HttpLlmClient, LlmClient};
pub use error::{LlmError, Result};
pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use router::{ProviderRouter, ProviderSlot};
pub use types::{GenerateRequest, GenerateResponse, Message, Role, StreamEvent};
