//! Spreadsheet + logo bulk import.
//!
//! Consumes a CSV export of the client spreadsheet and, optionally, a
//! directory containing the logo images extracted from it.  Clients are
//! matched-or-inserted on their business identifier; logos are paired with
//! spreadsheet rows positionally (both sequences independently sorted, images
//! under natural order) and a client that already carries a logo is skipped.
//! Row-level failures are logged and the run continues.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};

use directorio_store::{ClientFields, Database, Identity, StoreError};

use crate::natural;

/// Counters accumulated over one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub row_errors: usize,
    pub logos_assigned: usize,
    pub logos_skipped: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows processed: {} created, {} updated, {} errors; logos: {} assigned, {} skipped",
            self.rows, self.created, self.updated, self.row_errors,
            self.logos_assigned, self.logos_skipped
        )
    }
}

/// One usable spreadsheet row (blank-id rows are dropped during parsing).
#[derive(Debug, Clone, PartialEq, Eq)]
struct SpreadsheetRow {
    name: String,
    company: Option<String>,
    business_identifier: String,
}

/// Run the full import: client pass, then (optionally) the logo pass.
pub fn run(
    db: &Database,
    actor: &Identity,
    spreadsheet: &Path,
    logos_dir: Option<&Path>,
    media_dir: &Path,
) -> anyhow::Result<ImportReport> {
    let rows = read_rows(spreadsheet)
        .with_context(|| format!("failed to read spreadsheet '{}'", spreadsheet.display()))?;

    tracing::info!(rows = rows.len(), "spreadsheet read");

    let mut report = ImportReport {
        rows: rows.len(),
        ..ImportReport::default()
    };

    for row in &rows {
        match upsert_client(db, actor, row) {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(e) => {
                tracing::error!(
                    identifier = %row.business_identifier,
                    error = %e,
                    "failed to import row"
                );
                report.row_errors += 1;
            }
        }
    }

    if let Some(dir) = logos_dir {
        assign_logos(db, actor, &rows, dir, media_dir, &mut report)?;
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Client pass
// ---------------------------------------------------------------------------

/// Parse the CSV, normalizing headers the way the spreadsheet exports them
/// (mixed case, Spanish diacritics) and dropping rows without an id.
fn read_rows(path: &Path) -> anyhow::Result<Vec<SpreadsheetRow>> {
    let mut reader = csv::Reader::from_path(path)?;

    let normalized: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let column = |wanted: &[&str]| {
        normalized
            .iter()
            .position(|header| wanted.contains(&header.as_str()))
    };

    let name_col = column(&["client", "cliente", "name"]);
    let company_col = column(&["company", "compania"]);
    let id_col = column(&["id"]);
    let (Some(name_col), Some(company_col), Some(id_col)) = (name_col, company_col, id_col)
    else {
        bail!("spreadsheet must contain 'client', 'company' and 'id' columns");
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "skipping malformed CSV record");
                continue;
            }
        };

        let id = record.get(id_col).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }

        let company = record.get(company_col).unwrap_or("").trim();
        rows.push(SpreadsheetRow {
            name: record.get(name_col).unwrap_or("").trim().to_string(),
            company: (!company.is_empty()).then(|| company.to_string()),
            business_identifier: id.to_string(),
        });
    }

    Ok(rows)
}

/// Lowercase, trim, and fold the diacritics seen in real exports.
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace('í', "i")
        .replace('ñ', "n")
}

/// Match-or-insert one row, keyed on the business identifier.
/// Returns `true` when a new client was created.
fn upsert_client(db: &Database, actor: &Identity, row: &SpreadsheetRow) -> Result<bool, StoreError> {
    match db.client_by_business_identifier(&row.business_identifier)? {
        Some(existing) => {
            let mut fields = ClientFields::from(&existing);
            fields.name = row.name.clone();
            fields.company = row.company.clone();
            db.save_client(existing.id, &fields, actor)?;
            tracing::info!(identifier = %row.business_identifier, "client updated");
            Ok(false)
        }
        None => {
            let fields = ClientFields {
                name: row.name.clone(),
                company: row.company.clone(),
                business_identifier: Some(row.business_identifier.clone()),
                ..ClientFields::default()
            };
            db.create_client(&fields, actor)?;
            tracing::info!(identifier = %row.business_identifier, "client created");
            Ok(true)
        }
    }
}

// ---------------------------------------------------------------------------
// Logo pass
// ---------------------------------------------------------------------------

/// Pair extracted images with spreadsheet rows by position and assign each to
/// the matching client through the regular save path.
fn assign_logos(
    db: &Database,
    actor: &Identity,
    rows: &[SpreadsheetRow],
    logos_dir: &Path,
    media_dir: &Path,
    report: &mut ImportReport,
) -> anyhow::Result<()> {
    let mut images = Vec::new();
    for entry in fs::read_dir(logos_dir)
        .with_context(|| format!("failed to list logo directory '{}'", logos_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                images.push(name.to_string());
            }
        }
    }
    images.sort_by(|a, b| natural::compare(a, b));

    if images.len() != rows.len() {
        tracing::warn!(
            images = images.len(),
            rows = rows.len(),
            "image/row count mismatch; pairing by position up to the shorter sequence"
        );
    }

    fs::create_dir_all(media_dir)?;

    for (row, image) in rows.iter().zip(images.iter()) {
        match assign_logo(db, actor, row, &logos_dir.join(image), media_dir) {
            Ok(true) => report.logos_assigned += 1,
            Ok(false) => report.logos_skipped += 1,
            Err(e) => {
                tracing::error!(
                    identifier = %row.business_identifier,
                    image = %image,
                    error = %e,
                    "failed to assign logo"
                );
                report.row_errors += 1;
            }
        }
    }

    Ok(())
}

/// Copy one image into the media directory and point the client at it.
/// Returns `false` when the client is missing or already has a logo.
fn assign_logo(
    db: &Database,
    actor: &Identity,
    row: &SpreadsheetRow,
    source: &Path,
    media_dir: &Path,
) -> anyhow::Result<bool> {
    let Some(client) = db.client_by_business_identifier(&row.business_identifier)? else {
        tracing::warn!(
            identifier = %row.business_identifier,
            "no client found for logo assignment"
        );
        return Ok(false);
    };

    if client.logo_reference.is_some() {
        tracing::info!(
            identifier = %row.business_identifier,
            "client already has a logo, skipping"
        );
        return Ok(false);
    }

    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "png".to_string());
    let file_name = format!("{}.{}", client.external_code, extension);

    fs::copy(source, media_dir.join(&file_name))?;

    let mut fields = ClientFields::from(&client);
    fields.logo_reference = Some(file_name.clone());
    db.save_client(client.id, &fields, actor)?;

    tracing::info!(
        identifier = %row.business_identifier,
        logo = %file_name,
        "logo assigned"
    );

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use directorio_store::Role;
    use std::io::Write;

    fn test_db(dir: &Path) -> (Database, Identity) {
        let db = Database::open_at(&dir.join("test.db")).unwrap();
        let actor = db.create_identity("importer", Role::Admin, false).unwrap();
        (db, actor)
    }

    fn write_file(path: &Path, contents: &[u8]) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(contents).unwrap();
    }

    #[test]
    fn header_normalization_folds_diacritics() {
        assert_eq!(normalize_header(" Compañía "), "compania");
        assert_eq!(normalize_header("ID"), "id");
        assert_eq!(normalize_header("Cliente"), "cliente");
    }

    #[test]
    fn rows_without_id_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("clients.csv");
        write_file(
            &csv_path,
            "Cliente,Compañía,ID\nAcme Corp,Acme,X-1\nNoId,Nowhere,\n".as_bytes(),
        );

        let rows = read_rows(&csv_path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].business_identifier, "X-1");
        assert_eq!(rows[0].company.as_deref(), Some("Acme"));
    }

    #[test]
    fn missing_required_columns_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("clients.csv");
        write_file(&csv_path, b"Nombre,Codigo\nAcme,X-1\n");

        assert!(read_rows(&csv_path).is_err());
    }

    #[test]
    fn import_creates_then_updates_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let (db, actor) = test_db(dir.path());
        let csv_path = dir.path().join("clients.csv");

        write_file(&csv_path, b"client,company,id\nAcme Corp,Acme,X-1\n");
        let report = run(&db, &actor, &csv_path, None, dir.path()).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);

        // Second run with a changed name updates the same record.
        write_file(&csv_path, b"client,company,id\nAcme Corporation,Acme,X-1\n");
        let report = run(&db, &actor, &csv_path, None, dir.path()).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 1);

        let client = db.client_by_business_identifier("X-1").unwrap().unwrap();
        assert_eq!(client.name, "Acme Corporation");
        // The rename went through the audited save path.
        let history = db.client_history(client.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field_name, "name");
    }

    #[test]
    fn blank_name_rows_are_counted_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (db, actor) = test_db(dir.path());
        let csv_path = dir.path().join("clients.csv");

        write_file(&csv_path, b"client,company,id\n,Acme,X-1\nReal,Acme,X-2\n");
        let report = run(&db, &actor, &csv_path, None, dir.path()).unwrap();

        assert_eq!(report.row_errors, 1);
        assert_eq!(report.created, 1);
        assert!(db.client_by_business_identifier("X-1").unwrap().is_none());
    }

    #[test]
    fn logos_pair_positionally_and_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let (db, actor) = test_db(dir.path());

        let csv_path = dir.path().join("clients.csv");
        write_file(
            &csv_path,
            b"client,company,id\nFirst,A,X-1\nSecond,B,X-2\nThird,C,X-3\n",
        );

        let logos = dir.path().join("logos");
        fs::create_dir(&logos).unwrap();
        // Natural order pairs image2 before image10.
        write_file(&logos.join("image10.png"), b"ten");
        write_file(&logos.join("image1.png"), b"one");
        write_file(&logos.join("image2.png"), b"two");

        let media = dir.path().join("media");
        let report = run(&db, &actor, &csv_path, Some(&logos), &media).unwrap();
        assert_eq!(report.logos_assigned, 3);

        let second = db.client_by_business_identifier("X-2").unwrap().unwrap();
        let logo = second.logo_reference.clone().unwrap();
        assert!(logo.starts_with(&second.external_code));
        assert_eq!(fs::read(media.join(&logo)).unwrap(), b"two");

        // A re-run leaves existing logos untouched.
        let report = run(&db, &actor, &csv_path, Some(&logos), &media).unwrap();
        assert_eq!(report.logos_assigned, 0);
        assert_eq!(report.logos_skipped, 3);
    }

    #[test]
    fn image_count_mismatch_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (db, actor) = test_db(dir.path());

        let csv_path = dir.path().join("clients.csv");
        write_file(&csv_path, b"client,company,id\nOnly,A,X-1\n");

        let logos = dir.path().join("logos");
        fs::create_dir(&logos).unwrap();
        write_file(&logos.join("a.png"), b"a");
        write_file(&logos.join("b.png"), b"b");

        let media = dir.path().join("media");
        let report = run(&db, &actor, &csv_path, Some(&logos), &media).unwrap();
        assert_eq!(report.logos_assigned, 1);
        assert_eq!(report.row_errors, 0);
    }
}
