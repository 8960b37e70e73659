pub mod engines;
pub mod session;
pub mod vad;

pub use engines::{split_sentences, EchoSttEngine, EngineError, SttEngine, ToneTtsEngine, TtsEngine};
pub use session::{AudioIngestOutcome, Session, SessionManager, SessionState, TurnOutcome};
pub use vad::{rms_energy, VoiceActivityDetector};
