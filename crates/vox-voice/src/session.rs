use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{info, warn};
use vox_orchestrator::{TurnOptions, TurnOrchestrator};

use crate::engines::{split_sentences, SttEngine, TtsEngine};
use crate::vad::VoiceActivityDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

/// Outcome of feeding one window of audio into a session's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioIngestOutcome {
    /// Buffered, still listening for more.
    Buffering,
    /// Silence-timeout or max-duration reached; the session moved to
    /// `Processing` and the buffered audio is ready for STT.
    EndOfSpeech,
    /// The frame arrived while the session wasn't `Listening` — a protocol
    /// violation the caller should surface to the client, not silently drop.
    WrongState,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// One streaming voice conversation. Owns its audio buffer and VAD state;
/// transitions happen only from the task that drives this session, so no
/// internal lock ever needs to protect against interleaved state changes —
/// the `Mutex` here exists only so a session handle can be shared with a
/// sender task for outbound frames.
pub struct Session {
    pub id: String,
    pub conversation_id: String,
    state: Mutex<SessionState>,
    audio_buffer: Mutex<Vec<i16>>,
    consecutive_silent_windows: Mutex<u32>,
    vad: VoiceActivityDetector,
    silence_timeout_ms: u64,
    max_audio_duration_ms: u64,
    sample_rate_hz: u32,
    last_activity_ms: AtomicU64,
}

impl Session {
    pub fn new(
        id: String,
        conversation_id: String,
        vad_threshold: f32,
        silence_timeout_ms: u64,
        max_audio_duration_ms: u64,
        sample_rate_hz: u32,
    ) -> Self {
        Self {
            id,
            conversation_id,
            state: Mutex::new(SessionState::Idle),
            audio_buffer: Mutex::new(Vec::new()),
            consecutive_silent_windows: Mutex::new(0),
            vad: VoiceActivityDetector::new(vad_threshold),
            silence_timeout_ms,
            max_audio_duration_ms,
            sample_rate_hz,
            last_activity_ms: AtomicU64::new(now_ms()),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn idle_ms(&self) -> u64 {
        now_ms().saturating_sub(self.last_activity_ms.load(Ordering::Relaxed))
    }

    pub async fn start_session(&self) {
        *self.state.lock().await = SessionState::Listening;
        self.touch();
    }

    /// Feed one window of PCM samples while listening.
    pub async fn ingest_audio_window(&self, samples: &[i16], window_ms: u64) -> AudioIngestOutcome {
        self.touch();
        let mut state = self.state.lock().await;
        if *state != SessionState::Listening {
            return AudioIngestOutcome::WrongState;
        }

        let mut buffer = self.audio_buffer.lock().await;
        buffer.extend_from_slice(samples);

        let is_speech = self.vad.is_speech(samples);
        let mut silent = self.consecutive_silent_windows.lock().await;
        if is_speech {
            *silent = 0;
        } else {
            *silent += 1;
        }

        let buffered_ms = (buffer.len() as u64 * 1000) / self.sample_rate_hz.max(1) as u64;
        let silence_elapsed_ms = *silent as u64 * window_ms;

        let end_of_speech = (silence_elapsed_ms >= self.silence_timeout_ms && buffered_ms > 0)
            || buffered_ms >= self.max_audio_duration_ms;

        if end_of_speech {
            *state = SessionState::Processing;
            AudioIngestOutcome::EndOfSpeech
        } else {
            AudioIngestOutcome::Buffering
        }
    }

    pub async fn take_audio(&self) -> Vec<i16> {
        std::mem::take(&mut *self.audio_buffer.lock().await)
    }

    pub async fn begin_speaking(&self) {
        *self.state.lock().await = SessionState::Speaking;
    }

    /// Called once the last TTS frame has been flushed.
    pub async fn finish_speaking(&self) {
        *self.consecutive_silent_windows.lock().await = 0;
        *self.state.lock().await = SessionState::Listening;
        self.touch();
    }

    pub async fn end_session(&self) {
        *self.state.lock().await = SessionState::Idle;
        self.audio_buffer.lock().await.clear();
    }
}

pub struct TurnOutcome {
    pub transcript: String,
    pub response_text: String,
    pub speech_chunks: Vec<(String, Vec<i16>)>,
}

/// Registry of live sessions plus the shared dependencies every session
/// needs to run its processing step. Each session's state is touched only
/// by the task that owns it; the registry's map is guarded by a short-held
/// lock for create/destroy only.
pub struct SessionManager {
    sessions: dashmap::DashMap<String, Arc<Session>>,
    max_sessions: usize,
    orchestrator: Arc<TurnOrchestrator>,
    stt: Arc<dyn SttEngine>,
    tts: Arc<dyn TtsEngine>,
    session_timeout_ms: u64,
    vad_threshold: f32,
    silence_timeout_ms: u64,
    max_audio_duration_ms: u64,
    sample_rate_hz: u32,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_sessions: usize,
        orchestrator: Arc<TurnOrchestrator>,
        stt: Arc<dyn SttEngine>,
        tts: Arc<dyn TtsEngine>,
        session_timeout_ms: u64,
        vad_threshold: f32,
        silence_timeout_ms: u64,
        max_audio_duration_ms: u64,
        sample_rate_hz: u32,
    ) -> Self {
        Self {
            sessions: dashmap::DashMap::new(),
            max_sessions,
            orchestrator,
            stt,
            tts,
            session_timeout_ms,
            vad_threshold,
            silence_timeout_ms,
            max_audio_duration_ms,
            sample_rate_hz,
        }
    }

    pub fn create_session(&self, conversation_id: &str) -> Option<Arc<Session>> {
        if self.sessions.len() >= self.max_sessions {
            warn!(max_sessions = self.max_sessions, "session capacity exceeded, refusing connection");
            return None;
        }
        let id = vox_core::types::new_id();
        let session = Arc::new(Session::new(
            id.clone(),
            conversation_id.to_string(),
            self.vad_threshold,
            self.silence_timeout_ms,
            self.max_audio_duration_ms,
            self.sample_rate_hz,
        ));
        self.sessions.insert(id, session.clone());
        Some(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub async fn end_session(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.end_session().await;
            info!(session_id = id, "session ended");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sweep sessions that have been idle beyond the inactivity timeout.
    pub async fn evict_inactive(&self) -> Vec<String> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_ms() > self.session_timeout_ms)
            .map(|e| e.key().clone())
            .collect();
        for id in &stale {
            self.end_session(id).await;
        }
        stale
    }

    /// Run the processing step for a session whose buffered audio has just
    /// reached end-of-speech: STT -> TurnOrchestrator -> TTS.
    pub async fn process_turn(&self, session: &Session) -> vox_core::error::Result<TurnOutcome> {
        let pcm = session.take_audio().await;
        let transcript = match self.stt.transcribe(&pcm).await {
            Ok(t) => t,
            Err(e) => {
                // Transcription failed before the session ever left Processing;
                // return it to Listening so the caller isn't stuck ignoring
                // every subsequent audio frame as a state violation.
                session.finish_speaking().await;
                return Err(vox_core::error::VoxError::Internal(e.to_string()));
            }
        };

        if transcript.is_empty() {
            session.finish_speaking().await;
            return Ok(TurnOutcome { transcript, response_text: String::new(), speech_chunks: Vec::new() });
        }

        session.begin_speaking().await;
        let turn = match self
            .orchestrator
            .handle_turn(&session.conversation_id, &transcript, TurnOptions::default())
            .await
        {
            Ok(t) => t,
            Err(e) => {
                session.finish_speaking().await;
                return Err(e);
            }
        };

        let mut speech_chunks = Vec::new();
        for sentence in split_sentences(&turn.response) {
            let pcm = match self.tts.synthesize(&sentence).await {
                Ok(pcm) => pcm,
                Err(e) => {
                    session.finish_speaking().await;
                    return Err(vox_core::error::VoxError::Internal(e.to_string()));
                }
            };
            speech_chunks.push((sentence, pcm));
        }

        session.finish_speaking().await;
        Ok(TurnOutcome { transcript, response_text: turn.response, speech_chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_session() -> Session {
        Session::new("s1".to_string(), "c1".to_string(), 200.0, 100, 5000, 16000)
    }

    #[tokio::test]
    async fn connect_then_start_transitions_idle_to_listening() {
        let session = short_session();
        assert_eq!(session.state().await, SessionState::Idle);
        session.start_session().await;
        assert_eq!(session.state().await, SessionState::Listening);
    }

    #[tokio::test]
    async fn sustained_silence_triggers_end_of_speech() {
        let session = short_session();
        session.start_session().await;
        // Speak once so there's buffered audio, then go silent for two windows.
        assert_eq!(session.ingest_audio_window(&[1000, -1000, 1000, -1000], 50).await, AudioIngestOutcome::Buffering);
        assert_eq!(session.ingest_audio_window(&[0, 0, 0, 0], 50).await, AudioIngestOutcome::Buffering);
        assert_eq!(session.ingest_audio_window(&[0, 0, 0, 0], 50).await, AudioIngestOutcome::EndOfSpeech);
        assert_eq!(session.state().await, SessionState::Processing);
    }

    #[tokio::test]
    async fn max_duration_forces_end_of_speech_even_without_silence() {
        let session = Session::new("s2".to_string(), "c1".to_string(), 50.0, 100_000, 1, 16000);
        session.start_session().await;
        let loud = vec![1000_i16; 32];
        assert_eq!(session.ingest_audio_window(&loud, 50).await, AudioIngestOutcome::EndOfSpeech);
    }

    #[tokio::test]
    async fn audio_before_start_session_is_a_state_violation() {
        let session = short_session();
        assert_eq!(session.ingest_audio_window(&[1000, -1000], 50).await, AudioIngestOutcome::WrongState);
    }

    #[tokio::test]
    async fn finish_speaking_returns_to_listening() {
        let session = short_session();
        session.start_session().await;
        session.begin_speaking().await;
        assert_eq!(session.state().await, SessionState::Speaking);
        session.finish_speaking().await;
        assert_eq!(session.state().await, SessionState::Listening);
    }

    #[tokio::test]
    async fn end_session_clears_buffer_and_returns_to_idle() {
        let session = short_session();
        session.start_session().await;
        session.ingest_audio_window(&[1000, -1000], 50).await;
        session.end_session().await;
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(session.take_audio().await.is_empty());
    }
}
