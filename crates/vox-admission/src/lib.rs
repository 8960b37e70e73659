pub mod error;
pub mod keyauth;
pub mod ratelimit;
pub mod validate;

pub use error::{AdmissionError, Result};
pub use keyauth::{authenticate, constant_time_eq, hash_secret};
pub use ratelimit::RateLimiter;
pub use validate::{validate_context_bytes, validate_conversation_id, validate_message};
