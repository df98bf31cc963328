use time::macros::datetime;

use crate::{Contact, ContactId, ContactStatus, DEFAULT_FOLLOWUP_INTERVAL_HOURS};

pub(crate) fn contact(id: i64, name: &str, company: &str) -> Contact {
    Contact {
        id: ContactId(id),
        name: name.to_string(),
        job_title: String::new(),
        linkedin_url: String::new(),
        company_name: company.to_string(),
        company_website: String::new(),
        company_linkedin: String::new(),
        company_social: String::new(),
        company_twitter: String::new(),
        location: String::new(),
        company_niche: String::new(),
        applied_date: None,
        followup_interval: DEFAULT_FOLLOWUP_INTERVAL_HOURS,
        last_followup_date: None,
        next_followup_date: None,
        status: ContactStatus::NotApplied,
        notes: String::new(),
        created_at: datetime!(2025-01-01 00:00 UTC),
    }
}
