use sha2::{Digest, Sha256};
use vox_store::Store;

use crate::error::{AdmissionError, Result};

pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two strings in constant time with respect to their content (not
/// their length), so a byte-by-byte mismatch can't be timed out of an
/// admin-key or secret comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Looks up the presented secret's hash and confirms it is usable (not
/// revoked, not expired). Returns the key record so the caller can read its
/// rate-limit configuration.
pub fn authenticate(store: &Store, presented_secret: &str) -> Result<vox_store::types::ApiKeyRecord> {
    let hashed = hash_secret(presented_secret);
    let record = store
        .find_api_key(&hashed)
        .map_err(|_| AdmissionError::Unauthorized)?
        .ok_or(AdmissionError::Unauthorized)?;

    let now = vox_core::types::now_iso8601();
    if !record.is_usable(&now) {
        return Err(AdmissionError::Unauthorized);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_string_equality() {
        assert!(constant_time_eq("admin-secret", "admin-secret"));
        assert!(!constant_time_eq("admin-secret", "admin-secreT"));
        assert!(!constant_time_eq("admin-secret", "admin-secre"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_secret("abc"), hash_secret("abc"));
        assert_ne!(hash_secret("abc"), hash_secret("abd"));
    }

    #[test]
    fn unknown_key_is_unauthorized() {
        let store = Store::open_in_memory().unwrap();
        let result = authenticate(&store, "does-not-exist");
        assert!(matches!(result, Err(AdmissionError::Unauthorized)));
    }

    fn test_key(id: &str, hashed_secret: &str) -> vox_store::types::ApiKeyRecord {
        vox_store::types::ApiKeyRecord {
            id: id.to_string(),
            hashed_secret: hashed_secret.to_string(),
            owner: "owner".to_string(),
            created_at: vox_core::types::now_iso8601(),
            expires_at: None,
            revoked: false,
            limit_per_minute: 60,
            limit_per_day: 1000,
            counters_json: "{}".to_string(),
        }
    }

    #[test]
    fn active_key_authenticates() {
        let store = Store::open_in_memory().unwrap();
        let hashed = hash_secret("my-secret");
        store.create_api_key(&test_key("k1", &hashed)).unwrap();
        let record = authenticate(&store, "my-secret").unwrap();
        assert_eq!(record.id, "k1");
    }

    #[test]
    fn revoked_key_is_unauthorized() {
        let store = Store::open_in_memory().unwrap();
        let hashed = hash_secret("secret2");
        store.create_api_key(&test_key("k2", &hashed)).unwrap();
        store.revoke_api_key("k2").unwrap();
        assert!(authenticate(&store, "secret2").is_err());
    }
}
