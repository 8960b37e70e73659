use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table this crate owns. Idempotent — safe to call on
/// every process startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_conversations_table(conn)?;
    create_api_keys_table(conn)?;
    create_audit_logs_table(conn)?;
    create_token_usage_table(conn)?;
    Ok(())
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT NOT NULL,
            message_index   INTEGER NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            tokens_input    INTEGER NOT NULL DEFAULT 0,
            tokens_output   INTEGER NOT NULL DEFAULT 0,
            user_id         TEXT,
            PRIMARY KEY (conversation_id, message_index)
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_lookup
            ON conversations (conversation_id, message_index);",
    )?;
    Ok(())
}

fn create_api_keys_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS api_keys (
            id               TEXT PRIMARY KEY NOT NULL,
            hashed_secret    TEXT NOT NULL,
            owner            TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            expires_at       TEXT,
            revoked          INTEGER NOT NULL DEFAULT 0,
            limit_per_minute INTEGER NOT NULL DEFAULT 60,
            limit_per_day    INTEGER NOT NULL DEFAULT 100000,
            counters_json    TEXT NOT NULL DEFAULT '{}'
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_api_keys_hashed_secret
            ON api_keys (hashed_secret);",
    )?;
    Ok(())
}

fn create_audit_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id             TEXT PRIMARY KEY NOT NULL,
            timestamp      TEXT NOT NULL,
            actor          TEXT NOT NULL,
            event_kind     TEXT NOT NULL,
            severity       TEXT NOT NULL,
            payload_digest TEXT NOT NULL,
            latency_ms     INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp
            ON audit_logs (timestamp);",
    )?;
    Ok(())
}

/// Durable landing spot for `TokenLedger`'s periodic flush — per-conversation
/// totals only, not a timeseries, since the ledger already does the
/// in-memory accounting and this table exists so a restart doesn't lose it.
fn create_token_usage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS token_usage (
            conversation_id TEXT PRIMARY KEY NOT NULL,
            input_tokens    INTEGER NOT NULL DEFAULT 0,
            output_tokens   INTEGER NOT NULL DEFAULT 0,
            updated_at      TEXT NOT NULL
        );",
    )?;
    Ok(())
}
