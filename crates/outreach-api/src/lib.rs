use std::path::Path;
use std::sync::Arc;

use outreach_core::views::unique_companies;
use outreach_core::{
    Analytics, Clock, Contact, ContactFilter, ContactId, ContactPage, ContactStatus,
    DashboardSummary, ImportSummary, ImportTable, NewContact, NewTemplate, OutreachError,
    StoreStats, SystemClock, Template, TemplateId, CONTACTS_PER_PAGE,
};
use outreach_store_sqlite::{IntegrityReport, SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod import;

pub use cache::{CacheConfig, CacheScope, Mutation, ReadCache};

pub const API_CONTRACT_VERSION: &str = "api.v1";

type Result<T> = std::result::Result<T, OutreachError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardView {
    pub summary: DashboardSummary,
    pub page: ContactPage,
    pub unique_companies: Vec<String>,
}

/// Entry point for front-ends: cached reads over the store plus pass-through writes.
///
/// Writes never touch the cache. Callers invalidate the scopes a write affects, usually
/// with [`OutreachApi::invalidate_after`].
pub struct OutreachApi {
    store: SqliteStore,
    cache: ReadCache,
    clock: Arc<dyn Clock>,
}

impl OutreachApi {
    /// Open the database at `db_path` and make sure its schema is current.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or the schema cannot be applied.
    pub fn open(db_path: &Path, config: CacheConfig) -> Result<Self> {
        Self::with_clock(db_path, config, Arc::new(SystemClock))
    }

    /// # Errors
    /// Returns an error when the database cannot be opened or the schema cannot be applied.
    pub fn with_clock(db_path: &Path, config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = SqliteStore::open(db_path)?;
        retry_once("init_schema", || store.init_schema_at(clock.now()))?;
        tracing::info!(db = %db_path.display(), "outreach store ready");
        Ok(Self {
            store,
            cache: ReadCache::new(config, Arc::clone(&clock)),
            clock,
        })
    }

    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn invalidate(&self, scope: CacheScope) {
        self.cache.invalidate(scope);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn invalidate_after(&self, mutation: Mutation) {
        self.cache.invalidate_after(mutation);
    }

    /// # Errors
    /// Returns an error when the contact listing fails.
    pub fn load_contacts(&self) -> Result<Arc<Vec<Contact>>> {
        self.cache
            .contacts(|| retry_once("list_contacts", || self.store.list_contacts()))
    }

    /// # Errors
    /// Returns an error when the due listing fails.
    pub fn load_due_followups(&self) -> Result<Arc<Vec<Contact>>> {
        self.cache.due_followups(|| {
            retry_once("list_due_followups", || {
                self.store.list_due_followups_at(self.clock.now())
            })
        })
    }

    /// # Errors
    /// Returns an error when the template listing fails.
    pub fn load_templates(&self) -> Result<Arc<Vec<Template>>> {
        self.cache
            .templates(|| retry_once("list_templates", || self.store.list_templates()))
    }

    /// # Errors
    /// Returns an error when the stats queries fail.
    pub fn load_stats(&self) -> Result<Arc<StoreStats>> {
        self.cache
            .stats(|| retry_once("stats", || self.store.stats()))
    }

    /// Headline counts, one filtered page of contacts, and the company picker list.
    ///
    /// # Errors
    /// Returns an error when the contact or due listing fails.
    pub fn load_dashboard(&self, filter: &ContactFilter, page: usize) -> Result<DashboardView> {
        let contacts = self.load_contacts()?;
        let due = self.load_due_followups()?;
        let matching = filter.apply(&contacts);
        Ok(DashboardView {
            summary: DashboardSummary::compute(&contacts, due.len()),
            page: ContactPage::paginate(&matching, page, CONTACTS_PER_PAGE),
            unique_companies: unique_companies(&contacts),
        })
    }

    /// # Errors
    /// Returns an error when the contact listing fails.
    pub fn load_analytics(&self) -> Result<Analytics> {
        Ok(Analytics::compute(&self.load_contacts()?))
    }

    /// Uncached single-row read.
    ///
    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn get_contact(&self, id: ContactId) -> Result<Contact> {
        retry_once("get_contact", || self.store.get_contact(id))
    }

    /// # Errors
    /// Returns an error when schema metadata cannot be read.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.store.schema_status()
    }

    /// # Errors
    /// Returns an error when any integrity query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        self.store.integrity_check()
    }

    /// # Errors
    /// Returns an error when the backup cannot be written.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        retry_once("backup_database", || self.store.backup_database(out_file))
    }

    /// # Errors
    /// Returns an error when the schema cannot be applied.
    pub fn init_schema(&self) -> Result<()> {
        retry_once("init_schema", || {
            self.store.init_schema_at(self.clock.now())
        })
    }

    /// # Errors
    /// Returns a validation error for bad input or a storage error when the insert fails.
    pub fn insert_contact(&self, contact: &NewContact) -> Result<ContactId> {
        retry_once("insert_contact", || {
            self.store.insert_contact_at(contact, self.clock.now())
        })
    }

    /// # Errors
    /// Returns [`OutreachError::InvalidRows`] when any row is invalid; nothing is written.
    pub fn insert_contacts_bulk(&self, rows: &[NewContact]) -> Result<ImportSummary> {
        retry_once("insert_contacts_bulk", || {
            self.store.insert_contacts_bulk_at(rows, self.clock.now())
        })
    }

    /// Read a spreadsheet or JSON file and insert its rows as one batch.
    ///
    /// # Errors
    /// Returns a validation error when the file cannot be read, a known header repeats,
    /// or any row is invalid. Nothing is written in those cases.
    pub fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        let table = import::read_import_file(path)?;
        let summary = self.import_table(&table)?;
        tracing::info!(
            file = %path.display(),
            inserted = summary.inserted,
            skipped_blank = summary.skipped_blank,
            "contacts imported"
        );
        Ok(summary)
    }

    /// Map header-keyed rows onto contacts and insert them as one batch.
    ///
    /// # Errors
    /// Returns a validation error when a known header repeats or any row is invalid.
    /// Nothing is written in those cases.
    pub fn import_table(&self, table: &ImportTable) -> Result<ImportSummary> {
        let (_, ignored) = table.column_map()?;
        if !ignored.is_empty() {
            tracing::debug!(columns = ?ignored, "ignoring unrecognised import columns");
        }
        let prepared = table.to_contacts()?;
        let mut summary = self.insert_contacts_bulk(&prepared.contacts)?;
        summary.skipped_blank += prepared.skipped_blank;
        Ok(summary)
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn update_contact_status(
        &self,
        id: ContactId,
        status: ContactStatus,
        notes: &str,
    ) -> Result<()> {
        retry_once("update_contact_status", || {
            self.store
                .update_contact_status_at(id, status, notes, self.clock.now())
        })
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn mark_followup_sent(
        &self,
        id: ContactId,
        interval_hours: Option<u32>,
    ) -> Result<Contact> {
        retry_once("mark_followup_sent", || {
            self.store
                .mark_followup_sent_at(id, interval_hours, self.clock.now())
        })
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no contact has `id`.
    pub fn delete_contact(&self, id: ContactId) -> Result<()> {
        retry_once("delete_contact", || self.store.delete_contact(id))
    }

    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_all_contacts(&self) -> Result<usize> {
        retry_once("delete_all_contacts", || self.store.delete_all_contacts())
    }

    /// # Errors
    /// Returns an error when the sweep fails.
    pub fn remove_duplicate_contacts(&self) -> Result<usize> {
        retry_once("remove_duplicate_contacts", || {
            self.store.remove_duplicate_contacts()
        })
    }

    /// # Errors
    /// Returns a validation error for a blank title or body.
    pub fn add_template(&self, template: &NewTemplate) -> Result<TemplateId> {
        retry_once("add_template", || {
            self.store.add_template_at(template, self.clock.now())
        })
    }

    /// # Errors
    /// Returns [`OutreachError::NotFound`] when no template has `id`.
    pub fn delete_template(&self, id: TemplateId) -> Result<()> {
        retry_once("delete_template", || self.store.delete_template(id))
    }

    /// # Errors
    /// Returns an error when the drop or recreate fails.
    pub fn reset_database(&self) -> Result<()> {
        retry_once("reset_database", || {
            self.store.reset_database_at(self.clock.now())
        })
    }
}

/// Lock contention gets exactly one more attempt.
fn retry_once<T>(operation: &'static str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(err) if err.is_busy() => {
            tracing::warn!(operation, error = %err, "store busy; retrying once");
            op()
        }
        other => other,
    }
}
