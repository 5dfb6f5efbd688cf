//! Batch maintenance jobs: retention purge and duplicate collapse.
//!
//! Both jobs are meant to run exclusively (no concurrent invocation) from the
//! admin tooling.  A persistence error aborts the rest of the batch; there is
//! no partial-commit guarantee beyond per-row statements.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;

/// Days a soft-deleted client stays restorable before the sweeper removes it.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Outcome of one duplicate group collapsed by [`Database::dedupe_clients`].
#[derive(Debug, Clone)]
pub struct DedupeGroup {
    pub business_identifier: String,
    /// The surviving (newest) record.
    pub kept: Uuid,
    pub removed: usize,
}

/// Full report of a [`Database::dedupe_clients`] run.
#[derive(Debug, Clone, Default)]
pub struct DedupeReport {
    pub groups: Vec<DedupeGroup>,
    pub total_removed: usize,
}

impl Database {
    /// Hard-delete clients whose soft-deletion is older than the retention
    /// window.  Their history rows cascade away with them.
    ///
    /// Returns the number of clients removed.
    pub fn purge_expired_clients(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let cutoff = (now - Duration::days(retention_days)).trunc_subsecs(0);

        let removed = self.conn().execute(
            "DELETE FROM clients
             WHERE active = 0 AND deleted_at IS NOT NULL AND deleted_at <= ?1",
            params![cutoff.to_rfc3339()],
        )?;

        tracing::info!(
            removed,
            retention_days,
            cutoff = %cutoff.to_rfc3339(),
            "purged expired clients"
        );

        Ok(removed)
    }

    /// Collapse clients sharing a business identifier, keeping the newest.
    ///
    /// Groups are formed over non-empty identifiers only.  Within a group the
    /// survivor is the latest `created_at`; identical creation times are
    /// tie-broken on the surrogate id so repeated runs keep the same record.
    pub fn dedupe_clients(&self) -> Result<DedupeReport> {
        let mut stmt = self.conn().prepare(
            "SELECT business_identifier FROM clients
             WHERE business_identifier IS NOT NULL AND business_identifier != ''
             GROUP BY business_identifier
             HAVING COUNT(*) > 1
             ORDER BY business_identifier ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut identifiers = Vec::new();
        for row in rows {
            identifiers.push(row?);
        }

        let mut report = DedupeReport::default();

        for identifier in identifiers {
            let mut stmt = self.conn().prepare(
                "SELECT id FROM clients
                 WHERE business_identifier = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![identifier], |row| row.get::<_, String>(0))?;

            let mut ids = Vec::new();
            for row in rows {
                let id_str: String = row?;
                ids.push(Uuid::parse_str(&id_str)?);
            }

            let Some((kept, obsolete)) = ids.split_first() else {
                continue;
            };

            for id in obsolete {
                self.conn().execute(
                    "DELETE FROM clients WHERE id = ?1",
                    params![id.to_string()],
                )?;
            }

            tracing::info!(
                identifier = %identifier,
                kept = %kept,
                removed = obsolete.len(),
                "collapsed duplicate clients"
            );

            report.total_removed += obsolete.len();
            report.groups.push(DedupeGroup {
                business_identifier: identifier,
                kept: *kept,
                removed: obsolete.len(),
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientFields, Identity, Role};

    fn test_db() -> (Database, Identity, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let actor = db.create_identity("admin", Role::Admin, false).unwrap();
        (db, actor, dir)
    }

    fn client_with_identifier(db: &Database, actor: &Identity, name: &str, code: Option<&str>) -> Uuid {
        let fields = ClientFields {
            name: name.to_string(),
            business_identifier: code.map(str::to_string),
            ..ClientFields::default()
        };
        db.create_client(&fields, actor).unwrap().id
    }

    fn set_column(db: &Database, id: Uuid, column: &str, value: &str) {
        db.conn()
            .execute(
                &format!("UPDATE clients SET {column} = ?2 WHERE id = ?1"),
                params![id.to_string(), value],
            )
            .unwrap();
    }

    #[test]
    fn sweep_respects_retention_window() {
        let (db, actor, _dir) = test_db();
        let now: DateTime<Utc> = "2024-08-01T12:00:00+00:00".parse().unwrap();

        let expired = client_with_identifier(&db, &actor, "Old", None);
        let fresh = client_with_identifier(&db, &actor, "Recent", None);
        db.soft_delete_client(expired, &actor).unwrap();
        db.soft_delete_client(fresh, &actor).unwrap();

        set_column(
            &db,
            expired,
            "deleted_at",
            &(now - Duration::days(31)).to_rfc3339(),
        );
        set_column(
            &db,
            fresh,
            "deleted_at",
            &(now - Duration::days(29)).to_rfc3339(),
        );

        let removed = db
            .purge_expired_clients(DEFAULT_RETENTION_DAYS, now)
            .unwrap();
        assert_eq!(removed, 1);

        assert!(db.get_client(expired).is_err());
        assert!(db.get_client(fresh).is_ok());
    }

    #[test]
    fn sweep_never_touches_active_clients() {
        let (db, actor, _dir) = test_db();
        let now = Utc::now();

        let id = client_with_identifier(&db, &actor, "Active", None);
        // An active row with a stale created_at must survive any sweep.
        set_column(
            &db,
            id,
            "created_at",
            &(now - Duration::days(400)).to_rfc3339(),
        );

        let removed = db.purge_expired_clients(DEFAULT_RETENTION_DAYS, now).unwrap();
        assert_eq!(removed, 0);
        assert!(db.get_client(id).is_ok());
    }

    #[test]
    fn sweep_cascades_history() {
        let (db, actor, _dir) = test_db();
        let now = Utc::now();

        let id = client_with_identifier(&db, &actor, "Old", None);
        let client = db.get_client(id).unwrap();
        let mut fields = ClientFields::from(&client);
        fields.company = Some("Before deletion".to_string());
        db.save_client(id, &fields, &actor).unwrap();
        assert_eq!(db.client_history(id).unwrap().len(), 1);

        db.soft_delete_client(id, &actor).unwrap();
        set_column(
            &db,
            id,
            "deleted_at",
            &(now - Duration::days(31)).to_rfc3339(),
        );

        db.purge_expired_clients(DEFAULT_RETENTION_DAYS, now).unwrap();

        assert!(db.client_history(id).unwrap().is_empty());
    }

    #[test]
    fn dedupe_keeps_newest_of_each_group() {
        let (db, actor, _dir) = test_db();

        let day1 = client_with_identifier(&db, &actor, "First", Some("X-1"));
        let day2 = client_with_identifier(&db, &actor, "Second", Some("X-1"));
        let day3 = client_with_identifier(&db, &actor, "Third", Some("X-1"));
        set_column(&db, day1, "created_at", "2024-06-01T00:00:00+00:00");
        set_column(&db, day2, "created_at", "2024-06-02T00:00:00+00:00");
        set_column(&db, day3, "created_at", "2024-06-03T00:00:00+00:00");

        let report = db.dedupe_clients().unwrap();
        assert_eq!(report.total_removed, 2);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].kept, day3);
        assert_eq!(report.groups[0].removed, 2);

        assert!(db.get_client(day1).is_err());
        assert!(db.get_client(day2).is_err());
        assert!(db.get_client(day3).is_ok());
    }

    #[test]
    fn dedupe_cascades_history_of_removed_records() {
        let (db, actor, _dir) = test_db();

        let older = client_with_identifier(&db, &actor, "First", Some("X-1"));
        let newer = client_with_identifier(&db, &actor, "Second", Some("X-1"));
        set_column(&db, older, "created_at", "2024-06-01T00:00:00+00:00");
        set_column(&db, newer, "created_at", "2024-06-02T00:00:00+00:00");

        let client = db.get_client(older).unwrap();
        let mut fields = ClientFields::from(&client);
        fields.email = Some("old@example.com".to_string());
        db.save_client(older, &fields, &actor).unwrap();

        db.dedupe_clients().unwrap();

        assert!(db.client_history(older).unwrap().is_empty());
    }

    #[test]
    fn dedupe_tie_break_is_deterministic() {
        let (db, actor, _dir) = test_db();

        let a = client_with_identifier(&db, &actor, "A", Some("X-2"));
        let b = client_with_identifier(&db, &actor, "B", Some("X-2"));
        set_column(&db, a, "created_at", "2024-06-01T00:00:00+00:00");
        set_column(&db, b, "created_at", "2024-06-01T00:00:00+00:00");

        let report = db.dedupe_clients().unwrap();
        let expected = if a.to_string() > b.to_string() { a } else { b };
        assert_eq!(report.groups[0].kept, expected);
    }

    #[test]
    fn dedupe_ignores_missing_identifiers() {
        let (db, actor, _dir) = test_db();

        client_with_identifier(&db, &actor, "NoCode1", None);
        client_with_identifier(&db, &actor, "NoCode2", None);
        client_with_identifier(&db, &actor, "Blank1", Some(""));
        client_with_identifier(&db, &actor, "Blank2", Some(""));

        let report = db.dedupe_clients().unwrap();
        assert_eq!(report.total_removed, 0);
        assert_eq!(db.list_active_clients(None).unwrap().len(), 4);
    }
}
