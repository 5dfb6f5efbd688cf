//! Field-level change history.
//!
//! [`diff_clients`] compares two snapshots of the same client over a
//! statically declared field table and yields one [`FieldChange`] per field
//! whose textual representation differs.  The table deliberately omits
//! `created_at`, `updated_at` and `active`; everything else that is declared
//! on [`Client`] is tracked.  Comparison is plain string inequality --
//! whitespace or case differences register as changes, and non-text fields
//! (logo, timestamps, identity references) are rendered to their stable
//! name/identifier first.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Client, HistoryEntry};

/// Renders one tracked field to its comparable text form.
type FieldText = fn(&Client) -> Option<String>;

/// The tracked field table: every declared client field except
/// `created_at`, `updated_at` and `active` (and the surrogate `id`).
pub(crate) const TRACKED_FIELDS: &[(&str, FieldText)] = &[
    ("external_code", |c: &Client| Some(c.external_code.clone())),
    ("name", |c: &Client| Some(c.name.clone())),
    ("company", |c: &Client| c.company.clone()),
    ("business_identifier", |c: &Client| {
        c.business_identifier.clone()
    }),
    ("email", |c: &Client| c.email.clone()),
    ("country_code", |c: &Client| c.country_code.clone()),
    ("address", |c: &Client| c.address.clone()),
    ("logo_reference", |c: &Client| c.logo_reference.clone()),
    ("deleted_at", |c: &Client| {
        c.deleted_at.map(|t| t.to_rfc3339())
    }),
    ("created_by", |c: &Client| {
        c.created_by.map(|u| u.to_string())
    }),
];

/// One pending change produced by [`diff_clients`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field_name: &'static str,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
}

/// Compare two snapshots of the same client, in field-table order.
pub fn diff_clients(old: &Client, new: &Client) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for &(field_name, render) in TRACKED_FIELDS {
        let previous_value = render(old);
        let new_value = render(new);
        if previous_value != new_value {
            changes.push(FieldChange {
                field_name,
                previous_value,
                new_value,
            });
        }
    }
    changes
}

impl Database {
    /// Append history entries for a batch of changes to one client.
    ///
    /// `editor` falls back to the client's `created_by` when absent, so an
    /// entry always points at the most plausible identity available.
    pub(crate) fn append_client_history(
        &self,
        client: &Client,
        changes: &[FieldChange],
        editor: Option<Uuid>,
        edited_at: DateTime<Utc>,
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let edited_by = editor.or(client.created_by);

        let mut stmt = self.conn().prepare(
            "INSERT INTO client_history
                 (id, client_id, field_name, previous_value, new_value, edited_by, edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for change in changes {
            stmt.execute(params![
                Uuid::new_v4().to_string(),
                client.id.to_string(),
                change.field_name,
                change.previous_value,
                change.new_value,
                edited_by.map(|u| u.to_string()),
                edited_at.to_rfc3339(),
            ])?;
        }

        tracing::debug!(
            client_id = %client.id,
            entries = changes.len(),
            "recorded history entries"
        );

        Ok(())
    }

    /// List the change history for a client, newest first.
    pub fn client_history(&self, client_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_id, field_name, previous_value, new_value, edited_by, edited_at
             FROM client_history
             WHERE client_id = ?1
             ORDER BY edited_at DESC",
        )?;

        let rows = stmt.query_map(params![client_id.to_string()], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`HistoryEntry`].
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id_str: String = row.get(0)?;
    let client_id_str: String = row.get(1)?;
    let field_name: String = row.get(2)?;
    let previous_value: Option<String> = row.get(3)?;
    let new_value: Option<String> = row.get(4)?;
    let edited_by_str: Option<String> = row.get(5)?;
    let edited_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let client_id = Uuid::parse_str(&client_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let edited_by = edited_by_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let edited_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&edited_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(HistoryEntry {
        id,
        client_id,
        field_name,
        previous_value,
        new_value,
        edited_by,
        edited_at,
    })
}
