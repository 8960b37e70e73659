pub mod guard;
pub mod types;

pub use guard::GuardPipeline;
pub use types::{CheckResult, Violation};
