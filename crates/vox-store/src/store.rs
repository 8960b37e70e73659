use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use tracing::instrument;
use vox_core::types::now_iso8601;

use crate::db;
use crate::error::{Result, StoreError};
use crate::types::{ApiKeyRecord, AuditEntry, ConversationMessage};

/// Durable persistence behind a small set of methods. Backed by an embedded,
/// write-ahead-logged relational engine: one writer connection guarded by a
/// mutex, durable commits, crash-safe on restart. Every method here is the
/// only path by which a caller reaches disk — nothing outside this module
/// touches the connection directly.
pub struct Store {
    conn: Mutex<rusqlite::Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = rusqlite::Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        db::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        db::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Append one message, assigning the next dense message_index for this
    /// conversation. Returns the assigned index.
    #[instrument(skip(self, content), fields(conversation_id))]
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: vox_core::types::Role,
        content: &str,
        tokens_input: u32,
        tokens_output: u32,
        user_id: Option<&str>,
    ) -> Result<ConversationMessage> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let next_index: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(message_index), 0) + 1 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .unwrap_or(1);
        let created_at = now_iso8601();
        conn.execute(
            "INSERT INTO conversations
                (conversation_id, message_index, role, content, created_at, tokens_input, tokens_output, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                conversation_id,
                next_index,
                role.to_string(),
                content,
                created_at,
                tokens_input,
                tokens_output,
                user_id,
            ],
        )?;
        Ok(ConversationMessage {
            conversation_id: conversation_id.to_string(),
            message_index: next_index,
            role,
            content: content.to_string(),
            created_at,
            tokens_input,
            tokens_output,
            user_id: user_id.map(str::to_string),
        })
    }

    /// Load up to `limit` most recent messages for a conversation, oldest first.
    #[instrument(skip(self))]
    pub fn load_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT conversation_id, message_index, role, content, created_at, tokens_input, tokens_output, user_id
             FROM conversations
             WHERE conversation_id = ?1
             ORDER BY message_index DESC
             LIMIT ?2",
        )?;
        let mut rows: Vec<ConversationMessage> = stmt
            .query_map(params![conversation_id, limit as i64], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    #[instrument(skip(self, record))]
    pub fn create_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO api_keys
                (id, hashed_secret, owner, created_at, expires_at, revoked, limit_per_minute, limit_per_day, counters_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.hashed_secret,
                record.owner,
                record.created_at,
                record.expires_at,
                record.revoked as i64,
                record.limit_per_minute,
                record.limit_per_day,
                record.counters_json,
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self, hashed_secret))]
    pub fn find_api_key(&self, hashed_secret: &str) -> Result<Option<ApiKeyRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT id, hashed_secret, owner, created_at, expires_at, revoked, limit_per_minute, limit_per_day, counters_json
             FROM api_keys WHERE hashed_secret = ?1",
            params![hashed_secret],
            row_to_key,
        )
        .optional()
        .map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    pub fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, hashed_secret, owner, created_at, expires_at, revoked, limit_per_minute, limit_per_day, counters_json
             FROM api_keys ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_key)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn revoke_api_key(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let affected = conn.execute("UPDATE api_keys SET revoked = 1 WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::KeyNotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, entry))]
    pub fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO audit_logs (id, timestamp, actor, event_kind, severity, payload_digest, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.timestamp,
                entry.actor,
                entry.event_kind,
                entry.severity.to_string(),
                entry.payload_digest,
                entry.latency_ms,
            ],
        )?;
        Ok(())
    }

    /// Add `input_tokens`/`output_tokens` onto a conversation's running
    /// totals. Called by the periodic ledger flush, so this is additive,
    /// not a replace — each flush reports only what accrued since the last
    /// one.
    #[instrument(skip(self))]
    pub fn add_token_usage(&self, conversation_id: &str, input_tokens: u64, output_tokens: u64) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO token_usage (conversation_id, input_tokens, output_tokens, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(conversation_id) DO UPDATE SET
                input_tokens = input_tokens + excluded.input_tokens,
                output_tokens = output_tokens + excluded.output_tokens,
                updated_at = excluded.updated_at",
            params![conversation_id, input_tokens as i64, output_tokens as i64, now_iso8601()],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_token_usage(&self, conversation_id: &str) -> Result<Option<(u64, u64)>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT input_tokens, output_tokens FROM token_usage WHERE conversation_id = ?1",
            params![conversation_id],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )
        .optional()
        .map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    pub fn list_audit_entries(&self, actor: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, actor, event_kind, severity, payload_digest, latency_ms
             FROM audit_logs WHERE actor = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![actor], row_to_audit_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Cheap liveness probe for readiness checks: a trivial read on the
    /// connection that's guaranteed to fail if the file handle is wedged.
    pub fn is_open(&self) -> bool {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessage> {
    use std::str::FromStr;
    let role_str: String = row.get(2)?;
    Ok(ConversationMessage {
        conversation_id: row.get(0)?,
        message_index: row.get(1)?,
        role: vox_core::types::Role::from_str(&role_str).unwrap_or(vox_core::types::Role::User),
        content: row.get(3)?,
        created_at: row.get(4)?,
        tokens_input: row.get(5)?,
        tokens_output: row.get(6)?,
        user_id: row.get(7)?,
    })
}

fn row_to_audit_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    use std::str::FromStr;
    let severity_str: String = row.get(4)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        actor: row.get(2)?,
        event_kind: row.get(3)?,
        severity: vox_core::types::Severity::from_str(&severity_str).unwrap_or(vox_core::types::Severity::Warning),
        payload_digest: row.get(5)?,
        latency_ms: row.get(6)?,
    })
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: row.get(0)?,
        hashed_secret: row.get(1)?,
        owner: row.get(2)?,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        revoked: row.get::<_, i64>(5)? != 0,
        limit_per_minute: row.get(6)?,
        limit_per_day: row.get(7)?,
        counters_json: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_core::types::Role;

    #[tokio::test]
    async fn message_indices_are_dense_and_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let m1 = store.append_message("c1", Role::User, "hi", 1, 0, None).await.unwrap();
        let m2 = store.append_message("c1", Role::Assistant, "hello", 0, 1, None).await.unwrap();
        assert_eq!(m1.message_index, 1);
        assert_eq!(m2.message_index, 2);
    }

    #[tokio::test]
    async fn load_conversation_returns_oldest_first() {
        let store = Store::open_in_memory().unwrap();
        store.append_message("c1", Role::User, "one", 0, 0, None).await.unwrap();
        store.append_message("c1", Role::Assistant, "two", 0, 0, None).await.unwrap();
        let loaded = store.load_conversation("c1", 10).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "one");
        assert_eq!(loaded[1].content, "two");
    }

    #[test]
    fn api_key_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let key = ApiKeyRecord {
            id: "k1".to_string(),
            hashed_secret: "abc".to_string(),
            owner: "alice".to_string(),
            created_at: now_iso8601(),
            expires_at: None,
            revoked: false,
            limit_per_minute: 60,
            limit_per_day: 1000,
            counters_json: "{}".to_string(),
        };
        store.create_api_key(&key).unwrap();
        let found = store.find_api_key("abc").unwrap().unwrap();
        assert_eq!(found.id, "k1");

        store.revoke_api_key("k1").unwrap();
        let found = store.find_api_key("abc").unwrap().unwrap();
        assert!(found.revoked);
    }

    #[test]
    fn revoke_missing_key_errors() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.revoke_api_key("missing"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn token_usage_accumulates_across_flushes() {
        let store = Store::open_in_memory().unwrap();
        store.add_token_usage("c1", 10, 5).unwrap();
        store.add_token_usage("c1", 3, 2).unwrap();
        store.add_token_usage("c2", 1, 1).unwrap();

        assert_eq!(store.get_token_usage("c1").unwrap(), Some((13, 7)));
        assert_eq!(store.get_token_usage("c2").unwrap(), Some((1, 1)));
        assert_eq!(store.get_token_usage("nope").unwrap(), None);
    }

    #[test]
    fn audit_entries_are_listed_oldest_first() {
        use vox_core::types::Severity;

        let store = Store::open_in_memory().unwrap();
        store
            .append_audit(&AuditEntry {
                id: "a1".to_string(),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
                actor: "c1".to_string(),
                event_kind: "retriever_unavailable".to_string(),
                severity: Severity::Warning,
                payload_digest: "digest".to_string(),
                latency_ms: None,
            })
            .unwrap();

        let entries = store.list_audit_entries("c1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_kind, "retriever_unavailable");
    }
}
