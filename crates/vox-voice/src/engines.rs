use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Speech-to-text backend. STT vendors are external collaborators; this
/// trait is the seam a real one plugs into.
#[async_trait]
pub trait SttEngine: Send + Sync {
    async fn transcribe(&self, pcm: &[i16]) -> Result<String>;
}

/// Text-to-speech backend, producing 16-bit PCM.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<i16>>;
}

/// Deterministic stand-in used until a real STT vendor is wired in: returns
/// a fixed transcript sized to the audio it was handed, so the state
/// machine has something non-empty to react to.
pub struct EchoSttEngine;

#[async_trait]
impl SttEngine for EchoSttEngine {
    async fn transcribe(&self, pcm: &[i16]) -> Result<String> {
        if pcm.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("[{} samples of audio]", pcm.len()))
    }
}

/// Deterministic stand-in TTS: emits one fixed-size PCM tone per character
/// of input so downstream frame-streaming logic has real bytes to push.
pub struct ToneTtsEngine {
    samples_per_char: usize,
}

impl ToneTtsEngine {
    pub fn new(samples_per_char: usize) -> Self {
        Self { samples_per_char }
    }
}

impl Default for ToneTtsEngine {
    fn default() -> Self {
        Self::new(160)
    }
}

#[async_trait]
impl TtsEngine for ToneTtsEngine {
    async fn synthesize(&self, text: &str) -> Result<Vec<i16>> {
        let count = text.chars().count() * self.samples_per_char;
        Ok((0..count).map(|i| ((i % 200) as i16) - 100).collect())
    }
}

/// Splits a reply into sentence-sized pieces so TTS can start streaming
/// audio before the whole response has been synthesized.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim().to_string();
            if trimmed.len() > 1 {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_stt_reports_sample_count() {
        let stt = EchoSttEngine;
        let text = stt.transcribe(&[1, 2, 3, 4]).await.unwrap();
        assert_eq!(text, "[4 samples of audio]");
    }

    #[tokio::test]
    async fn empty_audio_transcribes_to_empty_string() {
        let stt = EchoSttEngine;
        assert_eq!(stt.transcribe(&[]).await.unwrap(), "");
    }

    #[tokio::test]
    async fn tone_tts_scales_with_text_length() {
        let tts = ToneTtsEngine::default();
        let short = tts.synthesize("hi").await.unwrap();
        let long = tts.synthesize("hello there").await.unwrap();
        assert!(long.len() > short.len());
    }

    #[test]
    fn split_sentences_handles_multiple_terminators() {
        let parts = split_sentences("Hi there. How are you? Great!");
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn split_sentences_keeps_trailing_fragment() {
        let parts = split_sentences("no terminator here");
        assert_eq!(parts, vec!["no terminator here".to_string()]);
    }
}
