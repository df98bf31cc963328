use time::{Duration, OffsetDateTime, UtcOffset};

use crate::{Contact, OutreachError};

pub const DEFAULT_FOLLOWUP_INTERVAL_HOURS: u32 = 72;
/// One year. Longer gaps are almost certainly a unit mistake.
pub const MAX_FOLLOWUP_INTERVAL_HOURS: u32 = 24 * 365;

/// The last/next pair written by a follow-up-sent mark.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FollowupPlan {
    pub last: OffsetDateTime,
    pub next: OffsetDateTime,
    pub interval_hours: u32,
}

impl FollowupPlan {
    /// Schedule the next follow-up `interval_hours` after `now`.
    ///
    /// `now` is normalised to UTC and truncated to whole seconds so the pair survives a
    /// round trip through the store unchanged.
    ///
    /// # Errors
    /// Returns [`OutreachError::Validation`] when the interval is out of range or the
    /// resulting instant cannot be represented.
    pub fn from_now(now: OffsetDateTime, interval_hours: u32) -> Result<Self, OutreachError> {
        validate_interval(interval_hours)?;
        let last = truncate_to_second(now)?;
        let next = next_followup_at(last, interval_hours)?;
        Ok(Self {
            last,
            next,
            interval_hours,
        })
    }
}

/// # Errors
/// Returns [`OutreachError::Validation`] when `now + interval_hours` overflows.
pub fn next_followup_at(
    now: OffsetDateTime,
    interval_hours: u32,
) -> Result<OffsetDateTime, OutreachError> {
    now.checked_add(Duration::hours(i64::from(interval_hours)))
        .ok_or_else(|| {
            OutreachError::Validation(format!(
                "follow-up interval of {interval_hours}h overflows the supported date range"
            ))
        })
}

pub(crate) fn validate_interval(interval_hours: u32) -> Result<(), OutreachError> {
    if (1..=MAX_FOLLOWUP_INTERVAL_HOURS).contains(&interval_hours) {
        Ok(())
    } else {
        Err(OutreachError::Validation(format!(
            "followup_interval MUST be between 1 and {max} hours, got {interval_hours}",
            max = MAX_FOLLOWUP_INTERVAL_HOURS
        )))
    }
}

fn truncate_to_second(now: OffsetDateTime) -> Result<OffsetDateTime, OutreachError> {
    now.to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|err| OutreachError::Validation(format!("invalid timestamp: {err}")))
}

/// A follow-up is due once the UTC calendar date of `now` reaches the date it was
/// scheduled for, and only while outreach is still in progress.
#[must_use]
pub fn is_due(contact: &Contact, now: OffsetDateTime) -> bool {
    if !contact.status.is_in_progress() {
        return false;
    }
    let today = now.to_offset(UtcOffset::UTC).date();
    contact
        .next_followup_date
        .is_some_and(|next| next.to_offset(UtcOffset::UTC).date() <= today)
}

/// Earliest due first, id breaking ties.
pub fn sort_due(contacts: &mut [Contact]) {
    contacts.sort_by(|left, right| {
        left.next_followup_date
            .cmp(&right.next_followup_date)
            .then(left.id.cmp(&right.id))
    });
}

#[must_use]
pub fn due_followups<I>(contacts: I, now: OffsetDateTime) -> Vec<Contact>
where
    I: IntoIterator<Item = Contact>,
{
    let mut due = contacts
        .into_iter()
        .filter(|contact| is_due(contact, now))
        .collect::<Vec<_>>();
    sort_due(&mut due);
    due
}
