//! CRUD and lifecycle operations for [`Client`] records.
//!
//! Mutating operations take the acting [`Identity`] explicitly and are gated
//! by [`access::require_editor`].  The save path records per-field history
//! before the row is rewritten; see [`crate::history`].

use rusqlite::params;
use uuid::Uuid;

use crate::access;
use crate::database::{now_utc, Database};
use crate::error::{Result, StoreError};
use crate::history;
use crate::models::{Client, ClientFields, Identity};

/// Column list shared by every `SELECT` in this module.
pub(crate) const CLIENT_COLUMNS: &str = "id, external_code, name, company, business_identifier, \
     email, country_code, address, logo_reference, active, deleted_at, created_by, \
     created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new client.
    ///
    /// Validates that `name` is non-empty, stamps timestamps, generates the
    /// immutable `external_code` and marks the record active.
    pub fn create_client(&self, fields: &ClientFields, actor: &Identity) -> Result<Client> {
        access::require_editor(actor)?;
        let name = validated_name(fields)?;

        let now = now_utc();
        let mut client = Client {
            id: Uuid::new_v4(),
            external_code: generate_external_code(),
            name: String::new(),
            company: None,
            business_identifier: None,
            email: None,
            country_code: None,
            address: None,
            logo_reference: None,
            active: true,
            deleted_at: None,
            created_by: Some(actor.id),
            created_at: now,
            updated_at: now,
        };
        apply_fields(&mut client, name, fields);

        self.conn().execute(
            "INSERT INTO clients (id, external_code, name, company, business_identifier,
                                  email, country_code, address, logo_reference, active,
                                  deleted_at, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                client.id.to_string(),
                client.external_code,
                client.name,
                client.company,
                client.business_identifier,
                client.email,
                client.country_code,
                client.address,
                client.logo_reference,
                client.active,
                client.deleted_at.map(|t| t.to_rfc3339()),
                client.created_by.map(|u| u.to_string()),
                client.created_at.to_rfc3339(),
                client.updated_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            id = %client.id,
            code = %client.external_code,
            by = %actor.username,
            "created client"
        );

        Ok(client)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single client by UUID.
    pub fn get_client(&self, id: Uuid) -> Result<Client> {
        self.conn()
            .query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"),
                params![id.to_string()],
                row_to_client,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the newest client carrying the given business identifier, if any.
    ///
    /// Identifiers are intended to be unique but the schema does not enforce
    /// it; when several rows share one the newest wins, mirroring the
    /// duplicate resolver's survivor rule.
    pub fn client_by_business_identifier(&self, identifier: &str) -> Result<Option<Client>> {
        let result = self.conn().query_row(
            &format!(
                "SELECT {CLIENT_COLUMNS} FROM clients
                 WHERE business_identifier = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1"
            ),
            params![identifier],
            row_to_client,
        );

        match result {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    /// List active clients, newest first.
    ///
    /// With a free-text query the match is a case-insensitive substring OR
    /// across name, company, business identifier, email and country code.
    /// Results are tiered: name-prefix matches first, then name-substring
    /// matches, then the rest; creation date (descending) orders each tier.
    pub fn list_active_clients(&self, query: Option<&str>) -> Result<Vec<Client>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let Some(query) = query else {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {CLIENT_COLUMNS} FROM clients
                 WHERE active = 1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_client)?;

            let mut clients = Vec::new();
            for row in rows {
                clients.push(row?);
            }
            return Ok(clients);
        };

        let needle = escape_like(&query.to_lowercase());
        let contains = format!("%{needle}%");
        let prefix = format!("{needle}%");

        let mut stmt = self.conn().prepare(&format!(
            r#"SELECT {CLIENT_COLUMNS} FROM clients
               WHERE active = 1
                 AND (LOWER(name)                           LIKE ?1 ESCAPE '\'
                   OR LOWER(COALESCE(company, ''))          LIKE ?1 ESCAPE '\'
                   OR LOWER(COALESCE(business_identifier, '')) LIKE ?1 ESCAPE '\'
                   OR LOWER(COALESCE(email, ''))            LIKE ?1 ESCAPE '\'
                   OR LOWER(COALESCE(country_code, ''))     LIKE ?1 ESCAPE '\')
               ORDER BY CASE
                   WHEN LOWER(name) LIKE ?2 ESCAPE '\' THEN 0
                   WHEN LOWER(name) LIKE ?1 ESCAPE '\' THEN 1
                   ELSE 2
                 END,
                 created_at DESC"#
        ))?;
        let rows = stmt.query_map(params![contains, prefix], row_to_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    /// List soft-deleted clients, most recently deleted first.
    pub fn list_deleted_clients(&self) -> Result<Vec<Client>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE active = 0
             ORDER BY deleted_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist new editable field values for an existing client.
    ///
    /// Loads the last-persisted snapshot, computes the field-level diff and
    /// appends history entries before the row itself is rewritten.  The
    /// read/diff/write sequence is not atomic against concurrent writers.
    pub fn save_client(&self, id: Uuid, fields: &ClientFields, actor: &Identity) -> Result<Client> {
        access::require_editor(actor)?;
        let old = self.get_client(id)?;
        let name = validated_name(fields)?;

        let mut updated = old.clone();
        apply_fields(&mut updated, name, fields);
        updated.updated_at = now_utc();

        let changes = history::diff_clients(&old, &updated);
        self.append_client_history(&updated, &changes, Some(actor.id), updated.updated_at)?;

        self.conn().execute(
            "UPDATE clients
             SET name = ?2, company = ?3, business_identifier = ?4, email = ?5,
                 country_code = ?6, address = ?7, logo_reference = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                updated.id.to_string(),
                updated.name,
                updated.company,
                updated.business_identifier,
                updated.email,
                updated.country_code,
                updated.address,
                updated.logo_reference,
                updated.updated_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            id = %updated.id,
            changed_fields = changes.len(),
            by = %actor.username,
            "saved client"
        );

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Mark a client as deleted.  Idempotent when already inactive.
    ///
    /// The record stays restorable until the retention sweeper purges it;
    /// no history entry is written for the transition.
    pub fn soft_delete_client(&self, id: Uuid, actor: &Identity) -> Result<Client> {
        access::require_editor(actor)?;
        let mut client = self.get_client(id)?;

        if !client.active {
            return Ok(client);
        }

        let now = now_utc();
        client.active = false;
        client.deleted_at = Some(now);
        client.updated_at = now;

        self.conn().execute(
            "UPDATE clients SET active = 0, deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![client.id.to_string(), now.to_rfc3339()],
        )?;

        tracing::info!(id = %client.id, by = %actor.username, "soft-deleted client");

        Ok(client)
    }

    /// Bring a soft-deleted client back into the active listing.
    ///
    /// No history entry is written for the transition.
    pub fn restore_client(&self, id: Uuid, actor: &Identity) -> Result<Client> {
        access::require_editor(actor)?;
        let mut client = self.get_client(id)?;

        let now = now_utc();
        client.active = true;
        client.deleted_at = None;
        client.updated_at = now;

        self.conn().execute(
            "UPDATE clients SET active = 1, deleted_at = NULL, updated_at = ?2 WHERE id = ?1",
            params![client.id.to_string(), now.to_rfc3339()],
        )?;

        tracing::info!(id = %client.id, by = %actor.username, "restored client");

        Ok(client)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract and validate the required name field.
fn validated_name(fields: &ClientFields) -> Result<String> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("name is required".to_string()));
    }
    Ok(name.to_string())
}

/// Copy the editable field set onto a client.
fn apply_fields(client: &mut Client, name: String, fields: &ClientFields) {
    client.name = name;
    client.company = fields.company.clone();
    client.business_identifier = fields.business_identifier.clone();
    client.email = fields.email.clone();
    client.country_code = fields.country_code.clone();
    client.address = fields.address.clone();
    client.logo_reference = fields.logo_reference.clone();
}

/// Generate the immutable external code for a new client.
fn generate_external_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("CL-{}", hex[..12].to_uppercase())
}

/// Escape LIKE wildcards so user input matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Map a `rusqlite::Row` (in [`CLIENT_COLUMNS`] order) to a [`Client`].
pub(crate) fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<Client> {
    use chrono::{DateTime, Utc};

    let id_str: String = row.get(0)?;
    let external_code: String = row.get(1)?;
    let name: String = row.get(2)?;
    let company: Option<String> = row.get(3)?;
    let business_identifier: Option<String> = row.get(4)?;
    let email: Option<String> = row.get(5)?;
    let country_code: Option<String> = row.get(6)?;
    let address: Option<String> = row.get(7)?;
    let logo_reference: Option<String> = row.get(8)?;
    let active: bool = row.get(9)?;
    let deleted_str: Option<String> = row.get(10)?;
    let created_by_str: Option<String> = row.get(11)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_by = created_by_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let parse_ts = |idx: usize, value: &str| -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    let deleted_at = match &deleted_str {
        Some(s) => Some(parse_ts(10, s)?),
        None => None,
    };
    let created_at = parse_ts(12, &created_str)?;
    let updated_at = parse_ts(13, &updated_str)?;

    Ok(Client {
        id,
        external_code,
        name,
        company,
        business_identifier,
        email,
        country_code,
        address,
        logo_reference,
        active,
        deleted_at,
        created_by,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn admin(db: &Database) -> Identity {
        db.create_identity("admin", Role::Admin, false).unwrap()
    }

    fn viewer(db: &Database) -> Identity {
        db.create_identity("viewer", Role::Viewer, false).unwrap()
    }

    fn named(name: &str) -> ClientFields {
        ClientFields {
            name: name.to_string(),
            ..ClientFields::default()
        }
    }

    /// Backdate `created_at` so ordering tests do not race the clock.
    fn set_created_at(db: &Database, id: Uuid, rfc3339: &str) {
        db.conn()
            .execute(
                "UPDATE clients SET created_at = ?2 WHERE id = ?1",
                params![id.to_string(), rfc3339],
            )
            .unwrap();
    }

    #[test]
    fn create_requires_name() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        let err = db.create_client(&named("   "), &actor).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn create_sets_lifecycle_defaults() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        let client = db.create_client(&named("Acme Corp"), &actor).unwrap();
        assert!(client.active);
        assert!(client.deleted_at.is_none());
        assert!(client.external_code.starts_with("CL-"));
        assert_eq!(client.created_by, Some(actor.id));
        assert_eq!(client.created_at, client.updated_at);

        let fetched = db.get_client(client.id).unwrap();
        assert_eq!(fetched, client);
    }

    #[test]
    fn viewer_cannot_create() {
        let (db, _dir) = test_db();
        let actor = viewer(&db);

        let err = db.create_client(&named("Acme Corp"), &actor).unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
        assert!(db.list_active_clients(None).unwrap().is_empty());
    }

    #[test]
    fn viewer_soft_delete_rejected_and_client_stays_active() {
        let (db, _dir) = test_db();
        let editor = admin(&db);
        let reader = viewer(&db);

        let client = db.create_client(&named("Acme Corp"), &editor).unwrap();
        let err = db.soft_delete_client(client.id, &reader).unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        let fetched = db.get_client(client.id).unwrap();
        assert!(fetched.active);
        assert!(fetched.deleted_at.is_none());
    }

    #[test]
    fn soft_delete_sets_flags_and_is_idempotent() {
        let (db, _dir) = test_db();
        let actor = admin(&db);
        let client = db.create_client(&named("Acme Corp"), &actor).unwrap();

        let deleted = db.soft_delete_client(client.id, &actor).unwrap();
        assert!(!deleted.active);
        assert!(deleted.deleted_at.is_some());

        // Second call must not refresh the deletion timestamp.
        let again = db.soft_delete_client(client.id, &actor).unwrap();
        assert_eq!(again.deleted_at, deleted.deleted_at);
    }

    #[test]
    fn restore_moves_client_between_listings() {
        let (db, _dir) = test_db();
        let actor = admin(&db);
        let client = db.create_client(&named("Acme Corp"), &actor).unwrap();

        db.soft_delete_client(client.id, &actor).unwrap();
        assert!(db.list_active_clients(None).unwrap().is_empty());
        assert_eq!(db.list_deleted_clients().unwrap().len(), 1);

        let restored = db.restore_client(client.id, &actor).unwrap();
        assert!(restored.active);
        assert!(restored.deleted_at.is_none());

        let active = db.list_active_clients(None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, client.id);
        assert!(db.list_deleted_clients().unwrap().is_empty());
    }

    #[test]
    fn lifecycle_ops_on_missing_client_are_not_found() {
        let (db, _dir) = test_db();
        let actor = admin(&db);
        let missing = Uuid::new_v4();

        assert!(matches!(db.get_client(missing), Err(StoreError::NotFound)));
        assert!(matches!(
            db.soft_delete_client(missing, &actor),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.restore_client(missing, &actor),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn search_ranks_name_prefix_before_substring() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        let services = db.create_client(&named("New Acme Services"), &actor).unwrap();
        let corp = db.create_client(&named("Acme Corp"), &actor).unwrap();
        // The substring match is newer; ranking must still put the prefix
        // match first.
        set_created_at(&db, services.id, "2024-06-02T00:00:00+00:00");
        set_created_at(&db, corp.id, "2024-06-01T00:00:00+00:00");

        let results = db.list_active_clients(Some("Acme")).unwrap();
        let names: Vec<&str> = results.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Corp", "New Acme Services"]);
    }

    #[test]
    fn search_matches_across_fields_case_insensitively() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        let fields = ClientFields {
            name: "Roofing Partner".to_string(),
            company: Some("ACME Holdings".to_string()),
            ..ClientFields::default()
        };
        db.create_client(&fields, &actor).unwrap();
        db.create_client(&named("Unrelated"), &actor).unwrap();

        let results = db.list_active_clients(Some("acme")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Roofing Partner");
    }

    #[test]
    fn search_excludes_soft_deleted() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        let client = db.create_client(&named("Acme Corp"), &actor).unwrap();
        db.soft_delete_client(client.id, &actor).unwrap();

        assert!(db.list_active_clients(Some("Acme")).unwrap().is_empty());
    }

    #[test]
    fn like_wildcards_match_literally() {
        let (db, _dir) = test_db();
        let actor = admin(&db);

        db.create_client(&named("100% Roofing"), &actor).unwrap();
        db.create_client(&named("100x Roofing"), &actor).unwrap();

        let results = db.list_active_clients(Some("100%")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "100% Roofing");
    }

    #[test]
    fn created_by_degrades_to_null_when_identity_removed() {
        let (db, _dir) = test_db();
        let actor = admin(&db);
        let client = db.create_client(&named("Acme Corp"), &actor).unwrap();

        db.delete_identity(actor.id).unwrap();

        let fetched = db.get_client(client.id).unwrap();
        assert_eq!(fetched.created_by, None);
    }
}
