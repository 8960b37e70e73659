use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxError};

/// Hard caps that are part of the wire contract rather than operator-tunable knobs.
pub const MAX_MESSAGE_CHARS: usize = 5000;
pub const MAX_CONTEXT_BYTES: usize = 10 * 1024;
pub const TURN_TOTAL_TIMEOUT_MS: u64 = 30_000;
pub const GUARD_RECONCILE_WAIT_MS: u64 = 500;
pub const WS_IDLE_TIMEOUT_MS: u64 = 60_000;
pub const TOKEN_LEDGER_FLUSH_INTERVAL_S: u64 = 60;
pub const DEFAULT_PORT: u16 = 8790;
pub const DEFAULT_BIND: &str = "127.0.0.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub port: u16,
    pub api_key_required: bool,
    pub admin_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            api_key_required: false,
            admin_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint_url: String,
    pub model_name: String,
    pub request_timeout_s: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:11434/v1/chat/completions".to_string(),
            model_name: "default".to_string(),
            request_timeout_s: 15,
            max_tokens: 200,
            temperature: 0.7,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000, ttl_s: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub window_messages: usize,
    pub max_conversations: usize,
    pub ttl_hours: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { window_messages: 10, max_conversations: 1000, ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    AsyncFailOpen,
    Strict,
}

impl Default for GuardMode {
    fn default() -> Self {
        GuardMode::AsyncFailOpen
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub enabled: bool,
    pub mode: GuardMode,
    pub pii_score_threshold: f32,
    pub toxicity_threshold: f32,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: GuardMode::AsyncFailOpen,
            pii_score_threshold: 0.5,
            toxicity_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub score_threshold: f32,
    pub soft_deadline_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 3, score_threshold: 0.0, soft_deadline_ms: 250 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_minute: 60, per_day: 100_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub max_sessions: usize,
    pub session_timeout_s: u64,
    pub audio_sample_rate_hz: u32,
    pub audio_channels: u16,
    pub vad_threshold: f32,
    pub silence_timeout_ms: u64,
    pub max_audio_duration_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_timeout_s: 300,
            audio_sample_rate_hz: 16_000,
            audio_channels: 1,
            vad_threshold: 0.3,
            silence_timeout_ms: 1500,
            max_audio_duration_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub guardrails: GuardrailsConfig,
    pub rag: RagConfig,
    pub rate_limit: RateLimitConfig,
    pub voice: VoiceConfig,
    pub database_path: String,
    pub log_filter: String,
}

impl Default for VoxConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            guardrails: GuardrailsConfig::default(),
            rag: RagConfig::default(),
            rate_limit: RateLimitConfig::default(),
            voice: VoiceConfig::default(),
            database_path: default_database_path(),
            log_filter: "info".to_string(),
        }
    }
}

fn default_database_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.voxbridge/voxbridge.db")
}

impl VoxConfig {
    /// Load config from an optional TOML file path, merged with `VOX_`-prefixed
    /// environment variable overrides. A missing file is not an error — the
    /// process falls back to defaults, matching a dev-friendly startup posture.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(VoxConfig::default()));

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("VOX_").split("_"));

        figment.extract().map_err(|e| VoxError::Config(e.to_string()))
    }

    pub fn default_config_path() -> String {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.voxbridge/voxbridge.toml")
    }
}
