use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Contact, ContactStatus};

pub const CONTACTS_PER_PAGE: usize = 20;
pub const TOP_COMPANIES: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContactFilter {
    #[serde(default)]
    pub status: Option<ContactStatus>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ContactFilter {
    #[must_use]
    pub fn matches(&self, contact: &Contact) -> bool {
        if self.status.is_some_and(|status| status != contact.status) {
            return false;
        }
        if self
            .company
            .as_deref()
            .is_some_and(|company| company != contact.company_name)
        {
            return false;
        }
        let needle = self.search.as_deref().map_or("", str::trim);
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        contact.name.to_lowercase().contains(&needle)
            || contact.company_name.to_lowercase().contains(&needle)
    }

    #[must_use]
    pub fn apply<'a>(&self, contacts: &'a [Contact]) -> Vec<&'a Contact> {
        contacts
            .iter()
            .filter(|contact| self.matches(contact))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContactPage {
    pub page: usize,
    pub total_pages: usize,
    pub total_matching: usize,
    pub contacts: Vec<Contact>,
}

impl ContactPage {
    /// Slice out one 1-based page. Out-of-range pages clamp to the nearest valid one.
    #[must_use]
    pub fn paginate(matching: &[&Contact], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = matching.len().div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);
        let contacts = matching
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|contact| (*contact).clone())
            .collect();
        Self {
            page,
            total_pages,
            total_matching: matching.len(),
            contacts,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct DashboardSummary {
    pub total_contacts: usize,
    pub applied: usize,
    pub followups_due: usize,
    pub accepted: usize,
}

impl DashboardSummary {
    #[must_use]
    pub fn compute(contacts: &[Contact], followups_due: usize) -> Self {
        Self {
            total_contacts: contacts.len(),
            applied: contacts
                .iter()
                .filter(|contact| contact.status.is_in_progress())
                .count(),
            followups_due,
            accepted: contacts
                .iter()
                .filter(|contact| contact.status == ContactStatus::Accepted)
                .count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StatusCount {
    pub status: ContactStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CompanyCount {
    pub company: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Analytics {
    pub status_distribution: Vec<StatusCount>,
    pub top_companies: Vec<CompanyCount>,
}

impl Analytics {
    #[must_use]
    pub fn compute(contacts: &[Contact]) -> Self {
        let mut statuses: BTreeMap<ContactStatus, usize> = BTreeMap::new();
        let mut companies: BTreeMap<&str, usize> = BTreeMap::new();
        for contact in contacts {
            *statuses.entry(contact.status).or_default() += 1;
            let company = contact.company_name.as_str();
            if !company.trim().is_empty() {
                *companies.entry(company).or_default() += 1;
            }
        }

        let mut status_distribution = statuses
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect::<Vec<_>>();
        status_distribution.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then(left.status.cmp(&right.status))
        });

        let mut top_companies = companies
            .into_iter()
            .map(|(company, count)| CompanyCount {
                company: company.to_string(),
                count,
            })
            .collect::<Vec<_>>();
        top_companies.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.company.cmp(&right.company))
        });
        top_companies.truncate(TOP_COMPANIES);

        Self {
            status_distribution,
            top_companies,
        }
    }
}

/// Distinct non-blank company names, sorted.
#[must_use]
pub fn unique_companies(contacts: &[Contact]) -> Vec<String> {
    contacts
        .iter()
        .map(|contact| contact.company_name.as_str())
        .filter(|company| !company.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
