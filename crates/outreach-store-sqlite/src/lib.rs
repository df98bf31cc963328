use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use outreach_core::{
    dedup, schedule, Contact, ContactId, ContactStatus, FollowupPlan, IdentityRow, ImportSummary,
    NewContact, NewTemplate, OutreachError, RowError, StoreStats, Template, TemplateId,
    DEFAULT_FOLLOWUP_INTERVAL_HOURS,
};
use rusqlite::{
    params, Connection, DatabaseName, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

type Result<T> = std::result::Result<T, OutreachError>;

const LATEST_SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT_MS: u32 = 5_000;
const REQUIRED_TABLES: [&str; 2] = ["contacts", "templates"];

/// Columns added after the first release. Older databases get them on `init_schema`.
const BACKFILLED_COLUMNS: &[(&str, &str, &str)] =
    &[("contacts", "status", "TEXT DEFAULT 'Not Applied'")];

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const CREATE_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS contacts (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  job_title TEXT,
  linkedin_url TEXT,
  company_name TEXT,
  company_website TEXT,
  company_linkedin TEXT,
  company_social TEXT,
  company_twitter TEXT,
  location TEXT,
  company_niche TEXT,
  applied_date DATE,
  followup_interval INTEGER DEFAULT 72,
  last_followup_date TIMESTAMP,
  next_followup_date TIMESTAMP,
  status TEXT DEFAULT 'Not Applied',
  notes TEXT,
  created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS templates (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  body TEXT NOT NULL,
  created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

const CREATE_INDEXES_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at);
CREATE INDEX IF NOT EXISTS idx_contacts_due ON contacts(status, next_followup_date);
CREATE INDEX IF NOT EXISTS idx_templates_created_at ON templates(created_at);
";

const CONTACT_COLUMNS: &str = "id, name, job_title, linkedin_url, company_name, company_website, \
     company_linkedin, company_social, company_twitter, location, company_niche, applied_date, \
     followup_interval, last_followup_date, next_followup_date, status, notes, created_at";

const INSERT_CONTACT_SQL: &str = r"
INSERT INTO contacts (
  name, job_title, linkedin_url, company_name, company_website, company_linkedin,
  company_social, company_twitter, location, company_niche, applied_date,
  followup_interval, status, notes, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
";

const SQLITE_DATETIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Contact and template storage over a single `SQLite` file.
///
/// Only the path is held. Every operation opens its own connection, runs, and
/// releases it, so a store value can be cloned into threads freely.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub tables: Vec<TableStatus>,
    pub missing_columns: Vec<String>,
}

impl SchemaStatus {
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current_version == self.target_version
            && self.tables.iter().all(|table| table.exists)
            && self.missing_columns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub schema_status: SchemaStatus,
}

trait StoreContext<T> {
    fn store_context(self, what: &str) -> Result<T>;
    fn with_store_context<F: FnOnce() -> String>(self, what: F) -> Result<T>;
}

impl<T> StoreContext<T> for rusqlite::Result<T> {
    fn store_context(self, what: &str) -> Result<T> {
        self.map_err(|err| classify(&err, what))
    }

    fn with_store_context<F: FnOnce() -> String>(self, what: F) -> Result<T> {
        self.map_err(|err| classify(&err, &what()))
    }
}

fn classify(err: &rusqlite::Error, what: &str) -> OutreachError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            OutreachError::StoreBusy(format!("{what}: {err}"))
        }
        _ => OutreachError::Storage(format!("{what}: {err}")),
    }
}

fn storage_error(what: &str, err: impl Display) -> OutreachError {
    OutreachError::Storage(format!("{what}: {err}"))
}

fn log_failure(operation: &str, err: &OutreachError) {
    match err {
        OutreachError::Storage(_)
        | OutreachError::StoreBusy(_)
        | OutreachError::SchemaMissing(_) => {
            tracing::error!(operation, error = %err, "sqlite operation failed");
        }
        _ => tracing::debug!(operation, error = %err, "sqlite operation rejected"),
    }
}

fn not_found(entity: &'static str, id: i64) -> OutreachError {
    OutreachError::NotFound { entity, id }
}

impl SqliteStore {
    /// Point a store at a database file and switch it to WAL journaling.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] for in-memory paths, which cannot outlive a
    /// single connection, and a storage error when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = path.to_string_lossy();
        if raw.trim().is_empty() || raw == ":memory:" || raw.starts_with("file::memory:") {
            return Err(OutreachError::Validation(
                "database path MUST name a file; in-memory databases are not supported".to_string(),
            ));
        }

        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .store_context("failed to enable WAL journaling")?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).with_store_context(|| {
            format!("failed to open sqlite database at {}", self.path.display())
        })?;
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))
        .store_context("failed to configure sqlite pragmas")?;
        Ok(conn)
    }

    fn with_connection<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let result = self.connect().and_then(|conn| op(&conn));
        if let Err(err) = &result {
            log_failure(operation, err);
        }
        result
    }

    /// Run `op` inside an immediate transaction. Commits on `Ok`, rolls back on `Err`.
    fn with_transaction<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let result = self.connect().and_then(|mut conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .with_store_context(|| format!("failed to begin transaction for {operation}"))?;
            match op(&tx) {
                Ok(value) => {
                    tx.commit()
                        .with_store_context(|| format!("failed to commit {operation}"))?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback) = tx.rollback() {
                        tracing::error!(operation, error = %rollback, "sqlite rollback failed");
                    }
                    Err(err)
                }
            }
        });
        if let Err(err) = &result {
            log_failure(operation, err);
        }
        result
    }

    /// Create missing tables and indexes and backfill columns added since the first
    /// release. Safe to call on every start.
    ///
    /// # Errors
    /// Returns a storage error when any DDL statement fails.
    pub fn init_schema(&self) -> Result<()> {
        self.init_schema_at(OffsetDateTime::now_utc())
    }

    /// # Errors
    /// Returns a storage error when any DDL statement fails.
    pub fn init_schema_at(&self, now: OffsetDateTime) -> Result<()> {
        let backfilled = self.with_transaction("init_schema", |tx| apply_schema(tx, now))?;
        if backfilled.is_empty() {
            tracing::debug!(path = %self.path.display(), "schema already current");
        } else {
            tracing::info!(
                path = %self.path.display(),
                columns = ?backfilled,
                "backfilled columns"
            );
        }
        Ok(())
    }

    /// Report schema version, table presence and any backfill still pending. Read only.
    ///
    /// # Errors
    /// Returns a storage error when schema metadata cannot be read.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.with_connection("schema_status", schema_status)
    }

    /// Insert one contact and return its generated id.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] for a blank name or out-of-range interval
    /// and a storage error when the insert fails.
    pub fn insert_contact(&self, contact: &NewContact) -> Result<ContactId> {
        self.insert_contact_at(contact, OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::insert_contact`].
    pub fn insert_contact_at(
        &self,
        contact: &NewContact,
        now: OffsetDateTime,
    ) -> Result<ContactId> {
        contact.validate()?;
        let created_at = rfc3339(now)?;
        self.with_transaction("insert_contact", |tx| {
            insert_contact_row(tx, contact, &created_at)
        })
    }

    /// Insert many contacts as one unit.
    ///
    /// All-blank rows are skipped and counted. Every other row is validated before
    /// anything is written; if any fail, the batch is rejected with the full list.
    ///
    /// # Errors
    /// Returns [`OutreachError::InvalidRows`] when any row is invalid and a storage error
    /// when the insert fails, in which case nothing is written.
    pub fn insert_contacts_bulk(&self, rows: &[NewContact]) -> Result<ImportSummary> {
        self.insert_contacts_bulk_at(rows, OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::insert_contacts_bulk`].
    pub fn insert_contacts_bulk_at(
        &self,
        rows: &[NewContact],
        now: OffsetDateTime,
    ) -> Result<ImportSummary> {
        let mut accepted = Vec::with_capacity(rows.len());
        let mut skipped_blank = 0;
        let mut failures = Vec::new();
        for (offset, row) in rows.iter().enumerate() {
            if row.is_blank() {
                skipped_blank += 1;
                continue;
            }
            match row.validate() {
                Ok(()) => accepted.push(row),
                Err(OutreachError::Validation(reason)) => {
                    failures.push(RowError {
                        row: offset + 1,
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        if !failures.is_empty() {
            tracing::debug!(rejected = failures.len(), "bulk insert rejected");
            return Err(OutreachError::InvalidRows(failures));
        }

        let created_at = rfc3339(now)?;
        let inserted = self.with_transaction("insert_contacts_bulk", |tx| {
            for row in &accepted {
                insert_contact_row(tx, row, &created_at)?;
            }
            Ok(accepted.len())
        })?;
        tracing::info!(inserted, skipped_blank, "bulk insert committed");
        Ok(ImportSummary {
            inserted,
            skipped_blank,
        })
    }

    /// All contacts, newest first.
    ///
    /// # Errors
    /// Returns a storage error when the query fails or a stored row cannot be decoded.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.with_connection("list_contacts", |conn| {
            query_contacts(
                conn,
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     ORDER BY datetime(created_at) DESC, id DESC"
                ),
            )
        })
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn get_contact(&self, id: ContactId) -> Result<Contact> {
        self.with_connection("get_contact", |conn| load_contact(conn, id))
    }

    /// Set status and notes and stamp `last_followup_date`. The next follow-up is left
    /// untouched.
    ///
    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn update_contact_status(
        &self,
        id: ContactId,
        status: ContactStatus,
        notes: &str,
    ) -> Result<()> {
        self.update_contact_status_at(id, status, notes, OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::update_contact_status`].
    pub fn update_contact_status_at(
        &self,
        id: ContactId,
        status: ContactStatus,
        notes: &str,
        now: OffsetDateTime,
    ) -> Result<()> {
        let stamped = rfc3339(now)?;
        self.with_transaction("update_contact_status", |tx| {
            let changed = tx
                .execute(
                    "UPDATE contacts SET status = ?1, notes = ?2, last_followup_date = ?3
                     WHERE id = ?4",
                    params![status.as_str(), notes, stamped, id.0],
                )
                .with_store_context(|| format!("failed to update status of contact {id}"))?;
            if changed == 0 {
                return Err(not_found("contact", id.0));
            }
            Ok(())
        })
    }

    /// Record that a follow-up went out now and schedule the next one.
    ///
    /// `interval_hours` overrides and persists the contact's interval; `None` reuses
    /// the stored one.
    ///
    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id` and
    /// [`OutreachError::Validation`] when the interval is out of range.
    pub fn mark_followup_sent(
        &self,
        id: ContactId,
        interval_hours: Option<u32>,
    ) -> Result<Contact> {
        self.mark_followup_sent_at(id, interval_hours, OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::mark_followup_sent`].
    pub fn mark_followup_sent_at(
        &self,
        id: ContactId,
        interval_hours: Option<u32>,
        now: OffsetDateTime,
    ) -> Result<Contact> {
        self.with_transaction("mark_followup_sent", |tx| {
            let stored: Option<Option<i64>> = tx
                .query_row(
                    "SELECT followup_interval FROM contacts WHERE id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()
                .with_store_context(|| format!("failed to read interval of contact {id}"))?;
            let Some(stored) = stored else {
                return Err(not_found("contact", id.0));
            };

            let hours = interval_hours.unwrap_or_else(|| stored_interval(stored));
            let plan = FollowupPlan::from_now(now, hours)?;
            tx.execute(
                "UPDATE contacts
                 SET last_followup_date = ?1, next_followup_date = ?2, status = ?3,
                     followup_interval = ?4
                 WHERE id = ?5",
                params![
                    rfc3339(plan.last)?,
                    rfc3339(plan.next)?,
                    ContactStatus::FollowUpSent.as_str(),
                    plan.interval_hours,
                    id.0
                ],
            )
            .with_store_context(|| format!("failed to mark follow-up sent for contact {id}"))?;

            load_contact(tx, id)
        })
    }

    /// Contacts whose follow-up is due today or earlier, earliest first.
    ///
    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn list_due_followups(&self) -> Result<Vec<Contact>> {
        self.list_due_followups_at(OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::list_due_followups`].
    pub fn list_due_followups_at(&self, now: OffsetDateTime) -> Result<Vec<Contact>> {
        let candidates = self.with_connection("list_due_followups", |conn| {
            query_contacts(
                conn,
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     WHERE next_followup_date IS NOT NULL AND status IN ('{}', '{}')",
                    ContactStatus::Applied.as_str(),
                    ContactStatus::FollowUpSent.as_str()
                ),
            )
        })?;
        Ok(schedule::due_followups(candidates, now))
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn delete_contact(&self, id: ContactId) -> Result<()> {
        self.with_transaction("delete_contact", |tx| {
            let changed = tx
                .execute("DELETE FROM contacts WHERE id = ?1", params![id.0])
                .with_store_context(|| format!("failed to delete contact {id}"))?;
            if changed == 0 {
                return Err(not_found("contact", id.0));
            }
            Ok(())
        })
    }

    /// # Errors
    /// Returns a storage error when the delete fails.
    pub fn delete_all_contacts(&self) -> Result<usize> {
        let deleted = self.with_transaction("delete_all_contacts", |tx| {
            tx.execute("DELETE FROM contacts", [])
                .store_context("failed to delete contacts")
        })?;
        tracing::info!(deleted, "deleted all contacts");
        Ok(deleted)
    }

    /// Drop every table and recreate the schema in one transaction.
    ///
    /// # Errors
    /// Returns a storage error when the drop or recreate fails (nothing changes) and
    /// [`OutreachError::SchemaMissing`] if the tables are absent afterwards.
    pub fn reset_database(&self) -> Result<()> {
        self.reset_database_at(OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::reset_database`].
    pub fn reset_database_at(&self, now: OffsetDateTime) -> Result<()> {
        let dropped = self.with_transaction("reset_database", |tx| {
            let tables = user_tables(tx)?;
            for table in &tables {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_identifier(table)))
                    .with_store_context(|| format!("failed to drop table {table}"))?;
            }
            apply_schema(tx, now)?;
            Ok(tables)
        })?;

        let missing = self.with_connection("reset_database", |conn| {
            let mut missing = Vec::new();
            for table in REQUIRED_TABLES {
                if !table_exists(conn, table)? {
                    missing.push(table);
                }
            }
            Ok(missing)
        })?;
        if !missing.is_empty() {
            let err = OutreachError::SchemaMissing(format!(
                "tables missing after reset: {}",
                missing.join(", ")
            ));
            log_failure("reset_database", &err);
            return Err(err);
        }

        tracing::warn!(path = %self.path.display(), dropped = ?dropped, "database reset");
        Ok(())
    }

    /// Delete every contact that shares a case-insensitive (name, company) with a
    /// lower id. Returns the number removed.
    ///
    /// # Errors
    /// Returns a storage error when the sweep fails; nothing is deleted in that case.
    pub fn remove_duplicate_contacts(&self) -> Result<usize> {
        let removed = self.with_transaction("remove_duplicate_contacts", |tx| {
            let clusters = dedup::duplicate_clusters(&load_identities(tx)?);
            let doomed = dedup::ids_to_remove(&clusters);
            let mut stmt = tx
                .prepare("DELETE FROM contacts WHERE id = ?1")
                .store_context("failed to prepare duplicate delete")?;
            for id in &doomed {
                stmt.execute(params![id.0])
                    .with_store_context(|| format!("failed to delete duplicate contact {id}"))?;
            }
            Ok(doomed.len())
        })?;
        tracing::info!(removed, "duplicate sweep finished");
        Ok(removed)
    }

    /// # Errors
    /// Returns a storage error when any count query fails.
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_connection("stats", |conn| {
            let identities = load_identities(conn)?;
            let total_templates: i64 = conn
                .query_row("SELECT COUNT(*) FROM templates", [], |row| row.get(0))
                .store_context("failed to count templates")?;
            let duplicates = dedup::duplicate_clusters(&identities)
                .iter()
                .map(dedup::DuplicateCluster::to_group)
                .collect::<Vec<_>>();
            Ok(StoreStats {
                total_contacts: identities.len(),
                total_templates: usize::try_from(total_templates).unwrap_or_default(),
                duplicate_groups: duplicates.len(),
                duplicates,
            })
        })
    }

    /// # Errors
    /// Returns [`OutreachError::Validation`] for a blank title or body.
    pub fn add_template(&self, template: &NewTemplate) -> Result<TemplateId> {
        self.add_template_at(template, OffsetDateTime::now_utc())
    }

    /// # Errors
    /// See [`SqliteStore::add_template`].
    pub fn add_template_at(
        &self,
        template: &NewTemplate,
        now: OffsetDateTime,
    ) -> Result<TemplateId> {
        template.validate()?;
        let created_at = rfc3339(now)?;
        self.with_transaction("add_template", |tx| {
            tx.execute(
                "INSERT INTO templates (title, body, created_at) VALUES (?1, ?2, ?3)",
                params![template.title, template.body, created_at],
            )
            .store_context("failed to insert template")?;
            Ok(TemplateId(tx.last_insert_rowid()))
        })
    }

    /// All templates, newest first.
    ///
    /// # Errors
    /// Returns a storage error when the query fails.
    pub fn list_templates(&self) -> Result<Vec<Template>> {
        self.with_connection("list_templates", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, body, created_at FROM templates
                     ORDER BY datetime(created_at) DESC, id DESC",
                )
                .store_context("failed to prepare template listing")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })
                .store_context("failed to list templates")?;

            let mut templates = Vec::new();
            for row in rows {
                let (id, title, body, created_at) = row.store_context("failed to read template")?;
                templates.push(Template {
                    id: TemplateId(id),
                    title,
                    body,
                    created_at: parse_required_timestamp(created_at.as_deref(), "templates", id)?,
                });
            }
            Ok(templates)
        })
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no template has `id`.
    pub fn delete_template(&self, id: TemplateId) -> Result<()> {
        self.with_transaction("delete_template", |tx| {
            let changed = tx
                .execute("DELETE FROM templates WHERE id = ?1", params![id.0])
                .with_store_context(|| format!("failed to delete template {id}"))?;
            if changed == 0 {
                return Err(not_found("template", id.0));
            }
            Ok(())
        })
    }

    /// Run `PRAGMA quick_check` and report schema status alongside it.
    ///
    /// # Errors
    /// Returns a storage error when an integrity query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        self.with_connection("integrity_check", |conn| {
            let quick_check_message: String = conn
                .query_row("PRAGMA quick_check", [], |row| row.get(0))
                .store_context("failed to run PRAGMA quick_check")?;
            Ok(IntegrityReport {
                quick_check_ok: quick_check_message == "ok",
                quick_check_message,
                schema_status: schema_status(conn)?,
            })
        })
    }

    /// Copy the live database to `out_file` with the online backup API.
    ///
    /// # Errors
    /// Returns a storage error when the parent directory cannot be created or the
    /// backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            let context = format!(
                "failed to create parent directory for backup file {}",
                out_file.display()
            );
            fs::create_dir_all(parent).map_err(|err| storage_error(&context, err))?;
        }

        self.with_connection("backup_database", |conn| {
            conn.backup(DatabaseName::Main, out_file, None)
                .with_store_context(|| {
                    format!("failed to create sqlite backup at {}", out_file.display())
                })
        })?;
        tracing::info!(out = %out_file.display(), "database backed up");
        Ok(())
    }
}

fn apply_schema(conn: &Connection, now: OffsetDateTime) -> Result<Vec<String>> {
    conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
        .store_context("failed to apply schema_migrations table")?;
    conn.execute_batch(CREATE_TABLES_SQL)
        .store_context("failed to create tables")?;

    let mut backfilled = Vec::new();
    for (table, column, definition) in BACKFILLED_COLUMNS {
        if !table_has_column(conn, table, column)? {
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition};"))
                .with_store_context(|| format!("failed to add column {table}.{column}"))?;
            backfilled.push(format!("{table}.{column}"));
        }
    }

    conn.execute_batch(CREATE_INDEXES_SQL)
        .store_context("failed to create indexes")?;
    record_schema_version(conn, LATEST_SCHEMA_VERSION, now)?;
    Ok(backfilled)
}

fn schema_status(conn: &Connection) -> Result<SchemaStatus> {
    let current_version = if table_exists(conn, "schema_migrations")? {
        current_schema_version(conn)?
    } else {
        0
    };

    let mut tables = Vec::with_capacity(REQUIRED_TABLES.len());
    for name in REQUIRED_TABLES {
        tables.push(TableStatus {
            name: name.to_string(),
            exists: table_exists(conn, name)?,
        });
    }

    let mut missing_columns = Vec::new();
    for (table, column, _) in BACKFILLED_COLUMNS {
        if !table_has_column(conn, table, column)? {
            missing_columns.push(format!("{table}.{column}"));
        }
    }

    Ok(SchemaStatus {
        current_version,
        target_version: LATEST_SCHEMA_VERSION,
        tables,
        missing_columns,
    })
}

fn insert_contact_row(
    conn: &Connection,
    contact: &NewContact,
    created_at: &str,
) -> Result<ContactId> {
    let applied_date = contact.applied_date.map(iso_date).transpose()?;
    conn.execute(
        INSERT_CONTACT_SQL,
        params![
            contact.name,
            contact.job_title,
            contact.linkedin_url,
            contact.company_name,
            contact.company_website,
            contact.company_linkedin,
            contact.company_social,
            contact.company_twitter,
            contact.location,
            contact.company_niche,
            applied_date,
            contact.followup_interval,
            contact.status.as_str(),
            contact.notes,
            created_at,
        ],
    )
    .with_store_context(|| format!("failed to insert contact `{}`", contact.name))?;
    Ok(ContactId(conn.last_insert_rowid()))
}

fn load_contact(conn: &Connection, id: ContactId) -> Result<Contact> {
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
        params![id.0],
        ContactRow::from_row,
    )
    .optional()
    .with_store_context(|| format!("failed to load contact {id}"))?
    .ok_or_else(|| not_found("contact", id.0))?
    .into_contact()
}

fn query_contacts(conn: &Connection, sql: &str) -> Result<Vec<Contact>> {
    let mut stmt = conn
        .prepare(sql)
        .store_context("failed to prepare contact query")?;
    let rows = stmt
        .query_map([], ContactRow::from_row)
        .store_context("failed to query contacts")?;
    let mut contacts = Vec::new();
    for row in rows {
        let row = row.store_context("failed to read contact row")?;
        contacts.push(row.into_contact()?);
    }
    Ok(contacts)
}

fn load_identities(conn: &Connection) -> Result<Vec<IdentityRow>> {
    let mut stmt = conn
        .prepare("SELECT id, name, company_name FROM contacts")
        .store_context("failed to prepare identity query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(IdentityRow {
                id: ContactId(row.get(0)?),
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                company: row.get(2)?,
            })
        })
        .store_context("failed to query contact identities")?;
    let mut identities = Vec::new();
    for row in rows {
        let identity = row.store_context("failed to read contact identity")?;
        identities.push(identity);
    }
    Ok(identities)
}

/// Raw column values. Older databases may hold NULL in any text column.
struct ContactRow {
    id: i64,
    name: Option<String>,
    job_title: Option<String>,
    linkedin_url: Option<String>,
    company_name: Option<String>,
    company_website: Option<String>,
    company_linkedin: Option<String>,
    company_social: Option<String>,
    company_twitter: Option<String>,
    location: Option<String>,
    company_niche: Option<String>,
    applied_date: Option<String>,
    followup_interval: Option<i64>,
    last_followup_date: Option<String>,
    next_followup_date: Option<String>,
    status: Option<String>,
    notes: Option<String>,
    created_at: Option<String>,
}

impl ContactRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            job_title: row.get(2)?,
            linkedin_url: row.get(3)?,
            company_name: row.get(4)?,
            company_website: row.get(5)?,
            company_linkedin: row.get(6)?,
            company_social: row.get(7)?,
            company_twitter: row.get(8)?,
            location: row.get(9)?,
            company_niche: row.get(10)?,
            applied_date: row.get(11)?,
            followup_interval: row.get(12)?,
            last_followup_date: row.get(13)?,
            next_followup_date: row.get(14)?,
            status: row.get(15)?,
            notes: row.get(16)?,
            created_at: row.get(17)?,
        })
    }

    fn into_contact(self) -> Result<Contact> {
        Ok(Contact {
            id: ContactId(self.id),
            name: self.name.unwrap_or_default(),
            job_title: self.job_title.unwrap_or_default(),
            linkedin_url: self.linkedin_url.unwrap_or_default(),
            company_name: self.company_name.unwrap_or_default(),
            company_website: self.company_website.unwrap_or_default(),
            company_linkedin: self.company_linkedin.unwrap_or_default(),
            company_social: self.company_social.unwrap_or_default(),
            company_twitter: self.company_twitter.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            company_niche: self.company_niche.unwrap_or_default(),
            applied_date: parse_optional(self.applied_date.as_deref(), parse_date)?,
            followup_interval: stored_interval(self.followup_interval),
            last_followup_date: parse_optional(
                self.last_followup_date.as_deref(),
                parse_timestamp,
            )?,
            next_followup_date: parse_optional(
                self.next_followup_date.as_deref(),
                parse_timestamp,
            )?,
            status: ContactStatus::from_stored(self.status.as_deref()),
            notes: self.notes.unwrap_or_default(),
            created_at: parse_required_timestamp(self.created_at.as_deref(), "contacts", self.id)?,
        })
    }
}

fn stored_interval(raw: Option<i64>) -> u32 {
    raw.and_then(|hours| u32::try_from(hours).ok())
        .filter(|hours| *hours > 0)
        .unwrap_or(DEFAULT_FOLLOWUP_INTERVAL_HOURS)
}

fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
        .store_context("failed to list tables")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .store_context("failed to list tables")?;
    let mut tables = Vec::new();
    for row in rows {
        tables.push(row.store_context("failed to read table name")?);
    }
    Ok(tables)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_store_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))
        .with_store_context(|| format!("failed to inspect table_info for {table}"))?;
    let mut rows = stmt.query([]).store_context("failed to read table_info")?;

    while let Some(row) = rows.next().store_context("failed to read table_info")? {
        let name: String = row.get(1).store_context("failed to read column name")?;
        if name == column {
            return Ok(true);
        }
    }

    Ok(false)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .store_context("failed to read current schema version")
}

fn record_schema_version(conn: &Connection, version: i64, now: OffsetDateTime) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, rfc3339(now)?],
    )
    .with_store_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

/// UTC, whole seconds.
fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|err| storage_error("failed to truncate timestamp", err))?
        .format(&Rfc3339)
        .map_err(|err| storage_error("failed to format RFC3339 timestamp", err))
}

fn iso_date(value: Date) -> Result<String> {
    value
        .format(ISO_DATE)
        .map_err(|err| storage_error("failed to format date", err))
}

fn parse_optional<T>(value: Option<&str>, parse: fn(&str) -> Result<T>) -> Result<Option<T>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse(value).map(Some),
        None => Ok(None),
    }
}

fn parse_required_timestamp(value: Option<&str>, table: &str, id: i64) -> Result<OffsetDateTime> {
    parse_optional(value, parse_timestamp)?
        .ok_or_else(|| OutreachError::Storage(format!("{table} row {id} has no created_at")))
}

/// RFC 3339, `SQLite`'s `YYYY-MM-DD HH:MM:SS`, or a bare date taken as UTC midnight.
fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(parsed);
    }
    if let Ok(parsed) = PrimitiveDateTime::parse(value, SQLITE_DATETIME) {
        return Ok(parsed.assume_utc());
    }
    Date::parse(value, ISO_DATE)
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| OutreachError::Storage(format!("unrecognised timestamp `{value}`")))
}

fn parse_date(value: &str) -> Result<Date> {
    if let Ok(parsed) = Date::parse(value, ISO_DATE) {
        return Ok(parsed);
    }
    parse_timestamp(value)
        .map(|timestamp| timestamp.to_offset(UtcOffset::UTC).date())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use anyhow::{anyhow, Result};
    use tempfile::TempDir;
    use time::macros::{date, datetime};
    use time::Duration;

    use super::*;

    fn temp_store() -> Result<(TempDir, SqliteStore)> {
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&dir.path().join("outreach.sqlite3"))?;
        store.init_schema()?;
        Ok((dir, store))
    }

    fn jane() -> NewContact {
        let mut contact = NewContact::named("Jane Doe").with_company("Acme");
        contact.job_title = "Head of Talent".to_string();
        contact.linkedin_url = "https://linkedin.com/in/janedoe".to_string();
        contact.location = "Berlin".to_string();
        contact.company_niche = "Logistics".to_string();
        contact.applied_date = Some(date!(2025 - 02 - 27));
        contact.notes = "met at meetup".to_string();
        contact
    }

    // Test IDs: TDB-001
    #[test]
    fn init_schema_is_idempotent_and_records_version() -> Result<()> {
        let (_dir, store) = temp_store()?;
        store.init_schema()?;
        store.init_schema()?;

        let status = store.schema_status()?;
        assert_eq!(status.current_version, LATEST_SCHEMA_VERSION);
        assert!(status.is_current());
        assert!(status.tables.iter().all(|table| table.exists));
        Ok(())
    }

    // Test IDs: TDB-002
    #[test]
    fn legacy_contacts_table_gains_status_column() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("legacy.sqlite3");
        {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "CREATE TABLE contacts (
                   id INTEGER PRIMARY KEY AUTOINCREMENT,
                   name TEXT NOT NULL, job_title TEXT, linkedin_url TEXT, company_name TEXT,
                   company_website TEXT, company_linkedin TEXT, company_social TEXT,
                   company_twitter TEXT, location TEXT, company_niche TEXT, applied_date DATE,
                   followup_interval INTEGER DEFAULT 72, last_followup_date TIMESTAMP,
                   next_followup_date TIMESTAMP, notes TEXT,
                   created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                 );
                 INSERT INTO contacts (name, company_name, next_followup_date, created_at)
                 VALUES ('Old Timer', 'Legacy Co', '2024-01-05', '2024-01-02 08:30:00');",
            )?;
        }

        let store = SqliteStore::open(&path)?;
        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.missing_columns, vec!["contacts.status".to_string()]);

        store.init_schema()?;
        let contacts = store.list_contacts()?;
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].status, ContactStatus::NotApplied);
        assert_eq!(
            contacts[0].next_followup_date,
            Some(datetime!(2024-01-05 00:00 UTC))
        );
        assert_eq!(contacts[0].created_at, datetime!(2024-01-02 08:30 UTC));
        assert!(store.schema_status()?.is_current());
        Ok(())
    }

    // Test IDs: TDB-003
    #[test]
    fn insert_then_get_round_trips_every_field() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let input = jane();
        let created = datetime!(2025-03-01 09:00:00.750 UTC);
        let id = store.insert_contact_at(&input, created)?;

        let stored = store.get_contact(id)?;
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, input.name);
        assert_eq!(stored.job_title, input.job_title);
        assert_eq!(stored.linkedin_url, input.linkedin_url);
        assert_eq!(stored.company_name, input.company_name);
        assert_eq!(stored.location, input.location);
        assert_eq!(stored.company_niche, input.company_niche);
        assert_eq!(stored.applied_date, input.applied_date);
        assert_eq!(stored.followup_interval, input.followup_interval);
        assert_eq!(stored.status, input.status);
        assert_eq!(stored.notes, input.notes);
        assert_eq!(stored.last_followup_date, None);
        assert_eq!(stored.next_followup_date, None);
        assert_eq!(stored.created_at, datetime!(2025-03-01 09:00 UTC));
        Ok(())
    }

    // Test IDs: TDB-004
    #[test]
    fn blank_name_and_unknown_ids_are_rejected() -> Result<()> {
        let (_dir, store) = temp_store()?;

        let Err(err) = store.insert_contact(&NewContact::named("  ")) else {
            return Err(anyhow!("expected blank name to be rejected"));
        };
        assert!(matches!(err, OutreachError::Validation(_)));

        let missing = ContactId(404);
        let not_found = |err: OutreachError| err.is_not_found();
        assert!(store.get_contact(missing).is_err_and(not_found));
        assert!(store.delete_contact(missing).is_err_and(not_found));
        assert!(store
            .update_contact_status(missing, ContactStatus::Applied, "")
            .is_err_and(not_found));
        assert!(store.mark_followup_sent(missing, Some(72)).is_err_and(not_found));
        assert!(store.delete_template(TemplateId(404)).is_err_and(not_found));
        assert!(store.list_contacts()?.is_empty());
        Ok(())
    }

    // Test IDs: TDB-005
    #[test]
    fn contacts_list_newest_first_with_id_tie_break() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let january = datetime!(2025-01-01 00:00 UTC);
        let february = datetime!(2025-02-01 00:00 UTC);
        let early = store.insert_contact_at(&NewContact::named("Early"), january)?;
        let late_a = store.insert_contact_at(&NewContact::named("Late A"), february)?;
        let late_b = store.insert_contact_at(&NewContact::named("Late B"), february)?;

        let ids = store
            .list_contacts()?
            .into_iter()
            .map(|contact| contact.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![late_b, late_a, early]);
        Ok(())
    }

    // Test IDs: TDB-006
    #[test]
    fn status_update_stamps_last_followup_only() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let id = store.insert_contact(&jane())?;
        let now = datetime!(2025-03-02 10:15:30 UTC);

        store.update_contact_status_at(id, ContactStatus::Applied, "sent CV", now)?;
        let stored = store.get_contact(id)?;
        assert_eq!(stored.status, ContactStatus::Applied);
        assert_eq!(stored.notes, "sent CV");
        assert_eq!(stored.last_followup_date, Some(now));
        assert_eq!(stored.next_followup_date, None);
        Ok(())
    }

    // Test IDs: TDB-007
    #[test]
    fn mark_followup_sent_schedules_from_now() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let id = store.insert_contact(&jane())?;
        let now = datetime!(2025-03-02 10:15:30.5 UTC);

        let marked = store.mark_followup_sent_at(id, Some(48), now)?;
        assert_eq!(marked.status, ContactStatus::FollowUpSent);
        let sent = datetime!(2025-03-02 10:15:30 UTC);
        assert_eq!(marked.last_followup_date, Some(sent));
        assert_eq!(marked.next_followup_date, Some(sent + Duration::hours(48)));
        assert_eq!(marked.followup_interval, 48);
        assert_eq!(store.get_contact(id)?, marked);

        let resent = datetime!(2025-03-05 08:00 UTC);
        let again = store.mark_followup_sent_at(id, None, resent)?;
        assert_eq!(again.next_followup_date, Some(resent + Duration::hours(48)));
        let (Some(last), Some(next)) = (again.last_followup_date, again.next_followup_date) else {
            return Err(anyhow!("follow-up dates missing after mark"));
        };
        assert_eq!(next - last, Duration::hours(48));
        Ok(())
    }

    // Test IDs: TDB-008
    #[test]
    fn applied_contact_becomes_due_once_interval_elapses() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let start = datetime!(2025-03-03 09:00 UTC);
        let id = store.insert_contact_at(&jane(), start)?;

        store.update_contact_status_at(id, ContactStatus::Applied, "", start)?;
        assert!(store.list_due_followups_at(start)?.is_empty());

        store.mark_followup_sent_at(id, Some(72), start)?;
        assert!(store.list_due_followups_at(start)?.is_empty());
        let almost = datetime!(2025-03-05 23:59:59 UTC);
        assert!(store.list_due_followups_at(almost)?.is_empty());

        let due = store.list_due_followups_at(start + Duration::hours(72))?;
        let due_ids = due.iter().map(|contact| contact.id).collect::<Vec<_>>();
        assert_eq!(due_ids, vec![id]);
        Ok(())
    }

    // Test IDs: TDB-009
    #[test]
    fn closed_statuses_are_never_due() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let start = datetime!(2025-03-03 09:00 UTC);
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            let id = store.insert_contact_at(&NewContact::named(name), start)?;
            store.mark_followup_sent_at(id, Some(1), start)?;
            ids.push(id);
        }
        store.update_contact_status_at(ids[0], ContactStatus::Rejected, "", start)?;
        store.update_contact_status_at(ids[1], ContactStatus::Accepted, "", start)?;
        store.update_contact_status_at(ids[2], ContactStatus::NoResponse, "", start)?;
        store.update_contact_status_at(ids[3], ContactStatus::NotApplied, "", start)?;

        let due = store.list_due_followups_at(start + Duration::days(3))?;
        let due_ids = due.iter().map(|contact| contact.id).collect::<Vec<_>>();
        assert_eq!(due_ids, vec![ids[4]]);
        Ok(())
    }

    // Test IDs: TDB-010
    #[test]
    fn bulk_insert_is_all_or_nothing() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let mut blank = NewContact::named("");
        blank.notes = "   ".to_string();
        let rows = vec![
            NewContact::named("Jane Doe"),
            NewContact::named("").with_company("Acme"),
            blank.clone(),
            NewContact::named("John Roe"),
        ];

        let Err(OutreachError::InvalidRows(failures)) = store.insert_contacts_bulk(&rows) else {
            return Err(anyhow!("expected invalid rows to reject the batch"));
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 2);
        assert!(store.list_contacts()?.is_empty());

        let summary = store.insert_contacts_bulk(&[NewContact::named("Jane Doe"), blank])?;
        assert_eq!(
            summary,
            ImportSummary {
                inserted: 1,
                skipped_blank: 1,
            }
        );
        assert_eq!(store.list_contacts()?.len(), 1);
        Ok(())
    }

    // Test IDs: TDB-011
    #[test]
    fn dedup_keeps_lowest_id_and_matches_stats() -> Result<()> {
        let (_dir, store) = temp_store()?;
        store.insert_contacts_bulk(&[
            NewContact::named("Jane Doe").with_company("Acme"),
            NewContact::named("John Roe").with_company("Globex"),
            NewContact::named("JANE DOE").with_company("acme"),
        ])?;
        let lowest = store
            .list_contacts()?
            .into_iter()
            .filter(|contact| contact.name.eq_ignore_ascii_case("jane doe"))
            .map(|contact| contact.id)
            .min()
            .ok_or_else(|| anyhow!("no Jane Doe rows"))?;

        let stats = store.stats()?;
        assert_eq!(stats.total_contacts, 3);
        assert_eq!(stats.duplicate_groups, 1);
        assert_eq!(stats.duplicates[0].count, 2);

        assert_eq!(store.remove_duplicate_contacts()?, 1);
        assert_eq!(store.remove_duplicate_contacts()?, 0);

        let remaining = store.list_contacts()?;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|contact| contact.id == lowest));
        assert_eq!(store.stats()?.duplicate_groups, 0);
        Ok(())
    }

    // Test IDs: TDB-012
    #[test]
    fn delete_all_reports_count() -> Result<()> {
        let (_dir, store) = temp_store()?;
        for index in 0..5 {
            store.insert_contact(&NewContact::named(format!("Contact {index}")))?;
        }
        assert_eq!(store.delete_all_contacts()?, 5);
        assert!(store.list_contacts()?.is_empty());
        assert_eq!(store.delete_all_contacts()?, 0);
        Ok(())
    }

    // Test IDs: TDB-013
    #[test]
    fn templates_add_list_delete() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let first = store.add_template_at(
            &NewTemplate {
                title: "Intro".to_string(),
                body: "Hi {name}".to_string(),
            },
            datetime!(2025-01-01 00:00 UTC),
        )?;
        let second = store.add_template_at(
            &NewTemplate {
                title: "Nudge".to_string(),
                body: "Following up".to_string(),
            },
            datetime!(2025-01-02 00:00 UTC),
        )?;
        let untitled = NewTemplate {
            title: String::new(),
            body: "x".to_string(),
        };
        assert!(store
            .add_template(&untitled)
            .is_err_and(|err| err.is_validation()));

        let ids = store
            .list_templates()?
            .into_iter()
            .map(|template| template.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(store.stats()?.total_templates, 2);

        store.delete_template(first)?;
        assert_eq!(store.list_templates()?.len(), 1);
        Ok(())
    }

    // Test IDs: TDB-014
    #[test]
    fn reset_drops_everything_and_recreates_schema() -> Result<()> {
        let (_dir, store) = temp_store()?;
        store.insert_contact(&jane())?;
        store.add_template(&NewTemplate {
            title: "Intro".to_string(),
            body: "Hi".to_string(),
        })?;
        let conn = Connection::open(store.path())?;
        conn.execute_batch("CREATE TABLE \"scratch pad\" (x INTEGER);")?;
        drop(conn);

        store.reset_database()?;
        assert!(store.list_contacts()?.is_empty());
        assert!(store.list_templates()?.is_empty());
        assert!(store.schema_status()?.is_current());
        let conn = Connection::open(store.path())?;
        assert!(!table_exists(&conn, "scratch pad")?);

        let id = store.insert_contact(&jane())?;
        assert_eq!(id, ContactId(1));
        Ok(())
    }

    // Test IDs: TDB-015
    #[test]
    fn backup_copies_contacts_and_integrity_is_clean() -> Result<()> {
        let (dir, store) = temp_store()?;
        store.insert_contact(&jane())?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert!(report.schema_status.is_current());

        let backup_path = dir.path().join("backups").join("copy.sqlite3");
        store.backup_database(&backup_path)?;
        let restored = SqliteStore::open(&backup_path)?;
        assert_eq!(restored.list_contacts()?.len(), 1);
        Ok(())
    }

    // Test IDs: TDB-016
    #[test]
    fn in_memory_databases_are_rejected() {
        let opened = SqliteStore::open(Path::new(":memory:"));
        assert!(opened.is_err_and(|err| err.is_validation()));
    }

    // Test IDs: TDB-017
    #[test]
    fn padded_name_round_trips_and_stays_out_of_duplicate_groups() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let padded = NewContact::named("Jane Doe ").with_company(" Acme");
        let padded = store.insert_contact(&padded)?;
        let plain = NewContact::named("Jane Doe").with_company("Acme");
        store.insert_contact(&plain)?;

        let stored = store.get_contact(padded)?;
        assert_eq!(stored.name, "Jane Doe ");
        assert_eq!(stored.company_name, " Acme");

        let stats = store.stats()?;
        assert_eq!(stats.total_contacts, 2);
        assert_eq!(stats.duplicate_groups, 0);
        assert_eq!(store.remove_duplicate_contacts()?, 0);
        Ok(())
    }

    // Test IDs: TDB-018
    #[test]
    fn null_company_and_empty_company_group_separately() -> Result<()> {
        let (_dir, store) = temp_store()?;
        store.insert_contact(&NewContact::named("Jane Doe"))?;
        store.insert_contact(&NewContact::named("jane doe"))?;
        Connection::open(store.path())?.execute_batch(
            "INSERT INTO contacts (name, company_name) VALUES ('Jane Doe', NULL);
             INSERT INTO contacts (name, company_name) VALUES ('JANE DOE', NULL);",
        )?;

        let stats = store.stats()?;
        assert_eq!(stats.total_contacts, 4);
        assert_eq!(stats.duplicate_groups, 2);
        assert_eq!(store.remove_duplicate_contacts()?, 2);
        assert_eq!(store.list_contacts()?.len(), 2);
        Ok(())
    }

    // Test IDs: TCONC-001
    #[test]
    fn concurrent_writers_and_readers_preserve_every_row() -> Result<()> {
        let (_dir, store) = temp_store()?;
        let writer_threads = 4;
        let writes_per_thread = 15;

        let mut handles = Vec::new();
        for writer in 0..writer_threads {
            let store = store.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                for index in 0..writes_per_thread {
                    let contact = NewContact::named(format!("Writer {writer} contact {index}"));
                    loop {
                        match store.insert_contact(&contact) {
                            Ok(_) => break,
                            Err(err) if err.is_busy() => {}
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
                Ok(())
            }));
        }
        for _ in 0..2 {
            let store = store.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                for _ in 0..20 {
                    match store.list_contacts() {
                        Ok(_) => {}
                        Err(err) if err.is_busy() => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                Ok(())
            }));
        }

        for handle in handles {
            let Ok(thread_result) = handle.join() else {
                return Err(anyhow!("concurrency thread panicked"));
            };
            thread_result?;
        }

        let stored = store.list_contacts()?.len();
        assert_eq!(stored, writer_threads * writes_per_thread);
        assert!(store.integrity_check()?.quick_check_ok);
        Ok(())
    }
}
