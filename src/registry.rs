use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rearch::CapsuleHandle;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{instrument, warn};

use crate::{
    clock::Clock,
    config::clock_capsule,
    shortcode::{CodeGenerator, RandomCodeGenerator},
};

/// Validity applied when none (or a non-positive one) is requested.
pub const DEFAULT_VALIDITY_MINUTES: i64 = 30;

/// Upper bound on random draws before giving up on finding a free shortcode.
pub const MAX_GENERATION_ATTEMPTS: usize = 1024;

pub const DIRECT_REFERRER: &str = "direct";
pub const UNKNOWN_LOCATION: &str = "N/A";

type Entries = DashMap<String, ShortcodeEntry>;

/// Holds the entries for the lifetime of the container, so rebuilding
/// [`shortcode_store_capsule`] (e.g. after a clock swap) never drops them.
fn shortcode_entries_manager(CapsuleHandle { register, .. }: CapsuleHandle) -> Arc<Entries> {
    register
        .register(rearch_effects::state::<rearch_effects::Cloned<_>>(Arc::new(
            Entries::new(),
        )))
        .0
}

pub fn shortcode_store_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShortcodeStore> {
    let entries = Arc::clone(get.as_ref(shortcode_entries_manager));
    let clock = Arc::clone(get.as_ref(clock_capsule));
    Arc::new(ShortcodeRegistry {
        entries,
        clock,
        code_generator: Arc::new(RandomCodeGenerator),
    })
}

/// Owner of every registered shortcode.
///
/// Clicks can only be appended through [`ShortcodeStore::resolve_and_record`],
/// and entries are never removed or rewritten once inserted.
pub trait ShortcodeStore: Send + Sync {
    /// Registers `new.original_url` under the desired code, or under a freshly
    /// generated one when no code was requested.
    ///
    /// # Errors
    /// See [`CreateError`].
    fn create(&self, new: NewShortcode) -> Result<CreatedShortcode, CreateError>;

    /// Returns a snapshot of the entry's statistics, expired or not.
    ///
    /// # Errors
    /// [`StatsError::NotFound`] when the code was never registered.
    fn stats(&self, code: &str) -> Result<ShortcodeStats, StatsError>;

    /// Returns the original URL and records a click, as long as the entry has
    /// not expired. A referrer of `None` or `""` is recorded as [`DIRECT_REFERRER`].
    ///
    /// # Errors
    /// See [`ResolveError`].
    fn resolve_and_record(
        &self,
        code: &str,
        referrer: Option<String>,
    ) -> Result<String, ResolveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShortcode {
    pub original_url: String,
    pub validity_minutes: Option<i64>,
    pub desired_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedShortcode {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRecord {
    pub timestamp: OffsetDateTime,
    pub referrer: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcodeStats {
    pub click_count: usize,
    pub original_url: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub clicks: Vec<ClickRecord>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateError {
    #[error("URL is a required field")]
    MissingUrl,
    #[error("validity of {0} minutes is out of range")]
    ValidityOutOfRange(i64),
    #[error("shortcode {0} is already in use")]
    Collision(String),
    #[error("no free shortcode found after {0} attempts")]
    Exhausted(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("shortcode not found")]
    NotFound,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("shortcode not found")]
    NotFound,
    #[error("shortcode has expired")]
    Expired,
}

#[derive(Debug)]
struct ShortcodeEntry {
    original_url: String,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    clicks: Vec<ClickRecord>,
}

impl ShortcodeEntry {
    fn stats(&self) -> ShortcodeStats {
        ShortcodeStats {
            click_count: self.clicks.len(),
            original_url: self.original_url.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            clicks: self.clicks.clone(),
        }
    }
}

pub struct ShortcodeRegistry {
    entries: Arc<Entries>,
    clock: Arc<dyn Clock>,
    code_generator: Arc<dyn CodeGenerator>,
}

impl ShortcodeRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, code_generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            entries: Arc::new(Entries::new()),
            clock,
            code_generator,
        }
    }
}

impl ShortcodeStore for ShortcodeRegistry {
    #[instrument(skip(self))]
    fn create(
        &self,
        NewShortcode {
            original_url,
            validity_minutes,
            desired_code,
        }: NewShortcode,
    ) -> Result<CreatedShortcode, CreateError> {
        if original_url.is_empty() {
            return Err(CreateError::MissingUrl);
        }

        let created_at = self.clock.now();
        let minutes = validity_minutes
            .filter(|&minutes| minutes > 0)
            .unwrap_or(DEFAULT_VALIDITY_MINUTES);
        let expires_at = minutes
            .checked_mul(60)
            .map(Duration::seconds)
            .and_then(|validity| created_at.checked_add(validity))
            .ok_or(CreateError::ValidityOutOfRange(minutes))?;
        let new_entry = ShortcodeEntry {
            original_url,
            created_at,
            expires_at,
            clicks: Vec::new(),
        };

        if let Some(code) = desired_code.filter(|code| !code.is_empty()) {
            return match self.entries.entry(code) {
                Entry::Occupied(taken) => Err(CreateError::Collision(taken.key().clone())),
                Entry::Vacant(slot) => {
                    let code = slot.key().clone();
                    slot.insert(new_entry);
                    Ok(CreatedShortcode { code, expires_at })
                }
            };
        }

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            match self.entries.entry(self.code_generator.generate()) {
                Entry::Vacant(slot) => {
                    let code = slot.key().clone();
                    slot.insert(new_entry);
                    return Ok(CreatedShortcode { code, expires_at });
                }
                Entry::Occupied(taken) => {
                    warn!(code = %taken.key(), "Generated shortcode that was already taken");
                }
            }
        }

        Err(CreateError::Exhausted(MAX_GENERATION_ATTEMPTS))
    }

    #[instrument(skip(self))]
    fn stats(&self, code: &str) -> Result<ShortcodeStats, StatsError> {
        self.entries
            .get(code)
            .map(|entry| entry.stats())
            .ok_or(StatsError::NotFound)
    }

    #[instrument(skip(self))]
    fn resolve_and_record(
        &self,
        code: &str,
        referrer: Option<String>,
    ) -> Result<String, ResolveError> {
        // NOTE: the shard guard stays held from the expiry check through the
        // append so an expired entry can never gain a click
        let mut entry = self.entries.get_mut(code).ok_or(ResolveError::NotFound)?;

        let now = self.clock.now();
        if now > entry.expires_at {
            return Err(ResolveError::Expired);
        }

        entry.clicks.push(ClickRecord {
            timestamp: now,
            referrer: referrer
                .filter(|referrer| !referrer.is_empty())
                .unwrap_or_else(|| DIRECT_REFERRER.to_owned()),
            location: UNKNOWN_LOCATION.to_owned(),
        });
        Ok(entry.original_url.clone())
    }
}
