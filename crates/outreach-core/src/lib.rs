use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

pub mod clock;
pub mod dedup;
#[cfg(test)]
mod fixtures;
pub mod import;
pub mod schedule;
pub mod views;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{duplicate_clusters, DuplicateCluster, IdentityRow};
pub use import::{ImportColumn, ImportTable, PreparedImport, IMPORT_COLUMNS};
pub use schedule::{
    is_due, FollowupPlan, DEFAULT_FOLLOWUP_INTERVAL_HOURS, MAX_FOLLOWUP_INTERVAL_HOURS,
};
pub use views::{
    Analytics, CompanyCount, ContactFilter, ContactPage, DashboardSummary, StatusCount,
    CONTACTS_PER_PAGE,
};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum OutreachError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("store busy: {0}")]
    StoreBusy(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{} import row(s) rejected: {}", .0.len(), join_row_errors(.0))]
    InvalidRows(Vec<RowError>),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("schema missing: {0}")]
    SchemaMissing(String),
}

impl OutreachError {
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::StoreBusy(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidRows(_))
    }
}

/// One rejected bulk-import row. `row` is the 1-based data row, header excluded.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

fn join_row_errors(errors: &[RowError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ContactId(pub i64);

impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TemplateId(pub i64);

impl Display for TemplateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub enum ContactStatus {
    #[default]
    #[serde(rename = "Not Applied")]
    NotApplied,
    #[serde(rename = "Applied")]
    Applied,
    #[serde(rename = "Follow-Up Sent")]
    FollowUpSent,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "No Response")]
    NoResponse,
}

impl ContactStatus {
    pub const ALL: [Self; 6] = [
        Self::NotApplied,
        Self::Applied,
        Self::FollowUpSent,
        Self::Rejected,
        Self::Accepted,
        Self::NoResponse,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotApplied => "Not Applied",
            Self::Applied => "Applied",
            Self::FollowUpSent => "Follow-Up Sent",
            Self::Rejected => "Rejected",
            Self::Accepted => "Accepted",
            Self::NoResponse => "No Response",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Not Applied" => Some(Self::NotApplied),
            "Applied" => Some(Self::Applied),
            "Follow-Up Sent" => Some(Self::FollowUpSent),
            "Rejected" => Some(Self::Rejected),
            "Accepted" => Some(Self::Accepted),
            "No Response" => Some(Self::NoResponse),
            _ => None,
        }
    }

    /// Read a persisted status column. NULL and unknown values fall back to `Not Applied`.
    #[must_use]
    pub fn from_stored(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }

    /// Outreach is underway and a follow-up may come due.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Applied | Self::FollowUpSent)
    }
}

impl Display for ContactStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_followup_interval() -> u32 {
    DEFAULT_FOLLOWUP_INTERVAL_HOURS
}

/// Insert payload for one contact. Follow-up dates and `created_at` are owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_website: String,
    #[serde(default)]
    pub company_linkedin: String,
    #[serde(default)]
    pub company_social: String,
    #[serde(default)]
    pub company_twitter: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub company_niche: String,
    #[serde(default, with = "iso_date::option")]
    pub applied_date: Option<Date>,
    #[serde(default = "default_followup_interval")]
    pub followup_interval: u32,
    #[serde(default)]
    pub status: ContactStatus,
    #[serde(default)]
    pub notes: String,
}

impl NewContact {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_title: String::new(),
            linkedin_url: String::new(),
            company_name: String::new(),
            company_website: String::new(),
            company_linkedin: String::new(),
            company_social: String::new(),
            company_twitter: String::new(),
            location: String::new(),
            company_niche: String::new(),
            applied_date: None,
            followup_interval: DEFAULT_FOLLOWUP_INTERVAL_HOURS,
            status: ContactStatus::NotApplied,
            notes: String::new(),
        }
    }

    #[must_use]
    pub fn with_company(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = company_name.into();
        self
    }

    /// Every free-text column is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        [
            &self.name,
            &self.job_title,
            &self.linkedin_url,
            &self.company_name,
            &self.company_website,
            &self.company_linkedin,
            &self.company_social,
            &self.company_twitter,
            &self.location,
            &self.company_niche,
            &self.notes,
        ]
        .iter()
        .all(|value| value.trim().is_empty())
    }

    /// Check the fields the store cannot enforce on its own.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] when the name is blank or the follow-up
    /// interval is outside `1..=MAX_FOLLOWUP_INTERVAL_HOURS`.
    pub fn validate(&self) -> Result<(), OutreachError> {
        if self.name.trim().is_empty() {
            return Err(OutreachError::Validation(
                "name MUST be provided for every contact".to_string(),
            ));
        }
        schedule::validate_interval(self.followup_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub job_title: String,
    pub linkedin_url: String,
    pub company_name: String,
    pub company_website: String,
    pub company_linkedin: String,
    pub company_social: String,
    pub company_twitter: String,
    pub location: String,
    pub company_niche: String,
    #[serde(with = "iso_date::option")]
    pub applied_date: Option<Date>,
    pub followup_interval: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_followup_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_followup_date: Option<OffsetDateTime>,
    pub status: ContactStatus,
    pub notes: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Contact {
    #[must_use]
    pub fn identity(&self) -> IdentityRow {
        IdentityRow {
            id: self.id,
            name: self.name.clone(),
            company: Some(self.company_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewTemplate {
    pub title: String,
    pub body: String,
}

impl NewTemplate {
    /// # Errors
    /// Returns [`OutreachError::Validation`] when the title or body is blank.
    pub fn validate(&self) -> Result<(), OutreachError> {
        if self.title.trim().is_empty() {
            return Err(OutreachError::Validation(
                "title MUST be provided for every template".to_string(),
            ));
        }
        if self.body.trim().is_empty() {
            return Err(OutreachError::Validation(
                "body MUST be provided for every template".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Template {
    pub id: TemplateId,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DuplicateGroup {
    pub name: String,
    pub company: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StoreStats {
    pub total_contacts: usize,
    pub total_templates: usize,
    pub duplicate_groups: usize,
    pub duplicates: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped_blank: usize,
}
