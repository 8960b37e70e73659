use serde::{Deserialize, Serialize};
use vox_core::types::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub entity_type: String,
    pub span: (usize, usize),
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub sanitized: Option<String>,
}

impl CheckResult {
    pub fn clean() -> Self {
        Self { passed: true, violations: Vec::new(), sanitized: None }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}
