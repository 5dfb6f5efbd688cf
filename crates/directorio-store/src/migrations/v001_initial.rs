//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `identities`, `clients`, and
//! `client_history`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Identities
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS identities (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username     TEXT NOT NULL UNIQUE,
    role         TEXT NOT NULL,               -- viewer | admin | superadmin
    is_superuser INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    access_token TEXT NOT NULL UNIQUE,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Clients
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clients (
    id                  TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    external_code       TEXT NOT NULL UNIQUE,       -- system-generated, immutable
    name                TEXT NOT NULL,
    company             TEXT,
    business_identifier TEXT,                       -- intended unique, not enforced
    email               TEXT,
    country_code        TEXT,
    address             TEXT,
    logo_reference      TEXT,                       -- stored logo file name
    active              INTEGER NOT NULL DEFAULT 1, -- boolean 0/1
    deleted_at          TEXT,                       -- set iff active = 0
    created_by          TEXT,                       -- nullable FK -> identities(id)
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,

    FOREIGN KEY (created_by) REFERENCES identities(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_clients_active_created
    ON clients(active, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_clients_business_identifier
    ON clients(business_identifier);

-- ----------------------------------------------------------------
-- Client history (one row per changed field per save)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS client_history (
    id             TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    client_id      TEXT NOT NULL,              -- FK -> clients(id)
    field_name     TEXT NOT NULL,
    previous_value TEXT,
    new_value      TEXT,
    edited_by      TEXT,                       -- nullable FK -> identities(id)
    edited_at      TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE,
    FOREIGN KEY (edited_by) REFERENCES identities(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_history_client_edited
    ON client_history(client_id, edited_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
