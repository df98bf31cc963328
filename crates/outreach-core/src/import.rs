use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NewContact, OutreachError, RowError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ImportColumn {
    Name,
    JobTitle,
    LinkedinUrl,
    CompanyName,
    CompanyWebsite,
    CompanyLinkedin,
    CompanySocial,
    CompanyTwitter,
    Location,
    CompanyNiche,
}

pub const IMPORT_COLUMNS: [ImportColumn; 10] = [
    ImportColumn::Name,
    ImportColumn::JobTitle,
    ImportColumn::LinkedinUrl,
    ImportColumn::CompanyName,
    ImportColumn::CompanyWebsite,
    ImportColumn::CompanyLinkedin,
    ImportColumn::CompanySocial,
    ImportColumn::CompanyTwitter,
    ImportColumn::Location,
    ImportColumn::CompanyNiche,
];

impl ImportColumn {
    #[must_use]
    pub fn header(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::JobTitle => "Job Title",
            Self::LinkedinUrl => "Linkedin URL",
            Self::CompanyName => "Company Name",
            Self::CompanyWebsite => "Company Website",
            Self::CompanyLinkedin => "Company Linkedin",
            Self::CompanySocial => "Company Social",
            Self::CompanyTwitter => "Company Twitter",
            Self::Location => "Location",
            Self::CompanyNiche => "Company Niche",
        }
    }

    /// Exact match after trimming surrounding whitespace.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        IMPORT_COLUMNS
            .into_iter()
            .find(|column| column.header() == value)
    }

    fn assign(self, contact: &mut NewContact, value: String) {
        let field = match self {
            Self::Name => &mut contact.name,
            Self::JobTitle => &mut contact.job_title,
            Self::LinkedinUrl => &mut contact.linkedin_url,
            Self::CompanyName => &mut contact.company_name,
            Self::CompanyWebsite => &mut contact.company_website,
            Self::CompanyLinkedin => &mut contact.company_linkedin,
            Self::CompanySocial => &mut contact.company_social,
            Self::CompanyTwitter => &mut contact.company_twitter,
            Self::Location => &mut contact.location,
            Self::CompanyNiche => &mut contact.company_niche,
        };
        *field = value;
    }
}

/// A spreadsheet-shaped input: one header row, then data rows of cell text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ImportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Contacts ready for a bulk insert plus the count of all-blank rows dropped on the way.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PreparedImport {
    pub contacts: Vec<NewContact>,
    pub skipped_blank: usize,
}

impl ImportTable {
    /// Map recognised headers to their column index. Unknown headers are returned
    /// separately so callers can log them.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] when a recognised header appears twice.
    pub fn column_map(
        &self,
    ) -> Result<(BTreeMap<ImportColumn, usize>, Vec<String>), OutreachError> {
        let mut mapped = BTreeMap::new();
        let mut ignored = Vec::new();
        for (index, header) in self.headers.iter().enumerate() {
            match ImportColumn::from_header(header) {
                Some(column) => {
                    if mapped.insert(column, index).is_some() {
                        return Err(OutreachError::Validation(format!(
                            "column `{}` appears more than once",
                            column.header()
                        )));
                    }
                }
                None => ignored.push(header.clone()),
            }
        }
        Ok((mapped, ignored))
    }

    /// Build insert payloads. Every row is checked before anything is returned, so a
    /// single bad row rejects the batch with the full list of failures.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] for duplicate headers and
    /// [`OutreachError::InvalidRows`] when any non-blank row has no name.
    pub fn to_contacts(&self) -> Result<PreparedImport, OutreachError> {
        let (columns, _) = self.column_map()?;
        let mut prepared = PreparedImport::default();
        let mut failures = Vec::new();

        for (offset, cells) in self.rows.iter().enumerate() {
            let row_number = offset + 1;
            let mut contact = NewContact::named("");
            let mut any_value = false;
            for (&column, &index) in &columns {
                let value = cells.get(index).cloned().unwrap_or_default();
                if !value.trim().is_empty() {
                    any_value = true;
                }
                column.assign(&mut contact, value);
            }

            if !any_value {
                prepared.skipped_blank += 1;
                continue;
            }
            if contact.name.trim().is_empty() {
                failures.push(RowError {
                    row: row_number,
                    reason: "Name is blank".to_string(),
                });
                continue;
            }
            prepared.contacts.push(contact);
        }

        if failures.is_empty() {
            Ok(prepared)
        } else {
            Err(OutreachError::InvalidRows(failures))
        }
    }
}
