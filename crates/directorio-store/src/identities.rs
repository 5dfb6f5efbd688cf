//! CRUD operations for [`Identity`] records.
//!
//! The directory stores identities locally so that `created_by` / `edited_by`
//! weak references can degrade to `NULL` when an identity is removed.  How a
//! caller authenticates (sessions, passwords) is out of scope; the only
//! credential kept here is the opaque access token consumed by the HTTP layer.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::{now_utc, Database};
use crate::error::{Result, StoreError};
use crate::models::{Identity, Role};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new identity with a freshly generated access token.
    pub fn create_identity(
        &self,
        username: &str,
        role: Role,
        is_superuser: bool,
    ) -> Result<Identity> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::Validation("username is required".to_string()));
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role,
            is_superuser,
            access_token: Uuid::new_v4().simple().to_string(),
            created_at: now_utc(),
        };

        self.conn().execute(
            "INSERT INTO identities (id, username, role, is_superuser, access_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                identity.id.to_string(),
                identity.username,
                identity.role.as_str(),
                identity.is_superuser,
                identity.access_token,
                identity.created_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(username = %identity.username, role = %identity.role, "created identity");

        Ok(identity)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch an identity by its login name.
    pub fn identity_by_username(&self, username: &str) -> Result<Identity> {
        self.conn()
            .query_row(
                "SELECT id, username, role, is_superuser, access_token, created_at
                 FROM identities
                 WHERE username = ?1",
                params![username],
                row_to_identity,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch an identity by its access token.
    pub fn identity_by_token(&self, token: &str) -> Result<Identity> {
        self.conn()
            .query_row(
                "SELECT id, username, role, is_superuser, access_token, created_at
                 FROM identities
                 WHERE access_token = ?1",
                params![token],
                row_to_identity,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all identities, ordered by login name.
    pub fn list_identities(&self) -> Result<Vec<Identity>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, role, is_superuser, access_token, created_at
             FROM identities
             ORDER BY username ASC",
        )?;

        let rows = stmt.query_map([], row_to_identity)?;

        let mut identities = Vec::new();
        for row in rows {
            identities.push(row?);
        }
        Ok(identities)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an identity.  Returns `true` if a row was deleted.
    ///
    /// Weak references from clients and history entries degrade to `NULL`.
    pub fn delete_identity(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM identities WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`Identity`].
fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let id_str: String = row.get(0)?;
    let username: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let is_superuser: bool = row.get(3)?;
    let access_token: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let role: Role = role_str.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role: {role_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Identity {
        id,
        username,
        role,
        is_superuser,
        access_token,
        created_at,
    })
}
