use std::sync::Arc;

use outreach_core::{Clock, Contact, StoreStats, Template};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub contacts_ttl: Duration,
    pub due_followups_ttl: Duration,
    pub templates_ttl: Duration,
    pub stats_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            contacts_ttl: Duration::seconds(30),
            due_followups_ttl: Duration::seconds(30),
            templates_ttl: Duration::seconds(60),
            stats_ttl: Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    Contacts,
    DueFollowups,
    Templates,
    Stats,
}

impl CacheScope {
    pub const ALL: [Self; 4] = [
        Self::Contacts,
        Self::DueFollowups,
        Self::Templates,
        Self::Stats,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::DueFollowups => "due_followups",
            Self::Templates => "templates",
            Self::Stats => "stats",
        }
    }

    /// The cached reads a mutation can make stale.
    #[must_use]
    pub fn affected_by(mutation: Mutation) -> &'static [Self] {
        match mutation {
            Mutation::InsertContact
            | Mutation::InsertContactsBulk
            | Mutation::UpdateContactStatus
            | Mutation::MarkFollowupSent
            | Mutation::DeleteContact
            | Mutation::DeleteAllContacts
            | Mutation::RemoveDuplicateContacts => {
                &[Self::Contacts, Self::DueFollowups, Self::Stats]
            }
            Mutation::AddTemplate | Mutation::DeleteTemplate => &[Self::Templates, Self::Stats],
            Mutation::ResetDatabase => &Self::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    InsertContact,
    InsertContactsBulk,
    UpdateContactStatus,
    MarkFollowupSent,
    DeleteContact,
    DeleteAllContacts,
    RemoveDuplicateContacts,
    AddTemplate,
    DeleteTemplate,
    ResetDatabase,
}

struct Entry<T> {
    value: Arc<T>,
    loaded_at: OffsetDateTime,
}

struct SlotState<T> {
    entry: Option<Entry<T>>,
    generation: u64,
}

/// One cached value with its own TTL.
///
/// The lock is released while loading. Invalidation bumps a generation counter, and a
/// load that started before the bump does not repopulate the slot.
struct TtlSlot<T> {
    ttl: Duration,
    state: Mutex<SlotState<T>>,
}

impl<T> TtlSlot<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(SlotState {
                entry: None,
                generation: 0,
            }),
        }
    }

    fn is_fresh(&self, loaded_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        let age = now - loaded_at;
        !age.is_negative() && age < self.ttl
    }

    fn get_or_load<E>(
        &self,
        now: OffsetDateTime,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let generation = {
            let state = self.state.lock();
            if let Some(entry) = &state.entry {
                if self.is_fresh(entry.loaded_at, now) {
                    return Ok(Arc::clone(&entry.value));
                }
            }
            state.generation
        };

        let value = Arc::new(load()?);
        let mut state = self.state.lock();
        if state.generation == generation {
            state.entry = Some(Entry {
                value: Arc::clone(&value),
                loaded_at: now,
            });
        }
        Ok(value)
    }

    fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entry = None;
        state.generation = state.generation.wrapping_add(1);
    }
}

/// Process-wide read cache keyed by entity type.
pub struct ReadCache {
    clock: Arc<dyn Clock>,
    contacts: TtlSlot<Vec<Contact>>,
    due_followups: TtlSlot<Vec<Contact>>,
    templates: TtlSlot<Vec<Template>>,
    stats: TtlSlot<StoreStats>,
}

impl ReadCache {
    #[must_use]
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            contacts: TtlSlot::new(config.contacts_ttl),
            due_followups: TtlSlot::new(config.due_followups_ttl),
            templates: TtlSlot::new(config.templates_ttl),
            stats: TtlSlot::new(config.stats_ttl),
        }
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub fn contacts<E>(
        &self,
        load: impl FnOnce() -> Result<Vec<Contact>, E>,
    ) -> Result<Arc<Vec<Contact>>, E> {
        self.contacts.get_or_load(self.now(), load)
    }

    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub fn due_followups<E>(
        &self,
        load: impl FnOnce() -> Result<Vec<Contact>, E>,
    ) -> Result<Arc<Vec<Contact>>, E> {
        self.due_followups.get_or_load(self.now(), load)
    }

    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub fn templates<E>(
        &self,
        load: impl FnOnce() -> Result<Vec<Template>, E>,
    ) -> Result<Arc<Vec<Template>>, E> {
        self.templates.get_or_load(self.now(), load)
    }

    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub fn stats<E>(
        &self,
        load: impl FnOnce() -> Result<StoreStats, E>,
    ) -> Result<Arc<StoreStats>, E> {
        self.stats.get_or_load(self.now(), load)
    }

    pub fn invalidate(&self, scope: CacheScope) {
        match scope {
            CacheScope::Contacts => self.contacts.invalidate(),
            CacheScope::DueFollowups => self.due_followups.invalidate(),
            CacheScope::Templates => self.templates.invalidate(),
            CacheScope::Stats => self.stats.invalidate(),
        }
        tracing::debug!(scope = scope.as_str(), "cache invalidated");
    }

    pub fn invalidate_all(&self) {
        for scope in CacheScope::ALL {
            self.invalidate(scope);
        }
    }

    pub fn invalidate_after(&self, mutation: Mutation) {
        for scope in CacheScope::affected_by(mutation) {
            self.invalidate(*scope);
        }
    }
}
