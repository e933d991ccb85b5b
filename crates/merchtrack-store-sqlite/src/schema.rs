//! SQL schema for the merchtrack SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per identity, keyed by the provider uid.
CREATE TABLE IF NOT EXISTS profiles (
    id              TEXT PRIMARY KEY,
    first_name      TEXT NOT NULL DEFAULT '',
    last_name       TEXT NOT NULL DEFAULT '',
    email           TEXT NOT NULL DEFAULT '',
    role            TEXT NOT NULL DEFAULT 'merchandiser',
    phone_number    TEXT NOT NULL DEFAULT '',
    employee_number TEXT NOT NULL DEFAULT '',
    id_number       TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at      TEXT NOT NULL    -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS profiles_role_idx ON profiles(role);

PRAGMA user_version = 1;
";
