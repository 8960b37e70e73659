pub mod fingerprint;
pub mod ledger;
pub mod orchestrator;
pub mod prompt;
pub mod types;

pub use ledger::TokenLedger;
pub use orchestrator::{OrchestratorConfig, TurnOrchestrator};
pub use prompt::Persona;
pub use types::{CachedTurn, TokensUsed, TurnMetadata, TurnOptions, TurnResult, Timing};
