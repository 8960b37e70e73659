use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server control messages on `/rtc/stream`. Raw binary frames carry
/// PCM audio out of band and are not represented here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartSession {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        config: Option<SessionConfig>,
    },
    EndSession,
    Config {
        #[serde(flatten)]
        overrides: SessionConfig,
    },
    /// Base64-encoded PCM, used when the transport can't carry binary frames.
    AudioBase64 {
        data: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vad_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_audio_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Server → Client messages. Binary frames carry synthesized audio out of band.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted { session_id: String, config: SessionConfig },
    StateChange { state: &'static str },
    Transcript { text: String },
    Response { text: String, timing: Value },
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_session_parses_without_config() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"start_session"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartSession { user_id: None, config: None }));
    }

    #[test]
    fn start_session_parses_with_partial_config() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start_session","config":{"vad_threshold":0.4}}"#).unwrap();
        match msg {
            ClientMessage::StartSession { config: Some(cfg), .. } => {
                assert_eq!(cfg.vad_threshold, Some(0.4));
                assert!(cfg.silence_timeout_ms.is_none());
            }
            _ => panic!("expected StartSession"),
        }
    }

    #[test]
    fn end_session_has_no_fields() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"end_session"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::EndSession));
    }

    #[test]
    fn state_change_serializes_with_type_tag() {
        let msg = ServerMessage::StateChange { state: "listening" };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "state_change");
        assert_eq!(json["state"], "listening");
    }

    #[test]
    fn audio_base64_round_trips() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"audio_base64","data":"abcd"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::AudioBase64 { data } if data == "abcd"));
    }
}
