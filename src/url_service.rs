use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{error, instrument};
use url::Url;

use crate::{
    api::{ClickDetail, CreateShortUrlPayload, CreatedShortUrl, Redirect, ShortUrlStats},
    audit_log::{AuditLog, Level, Package},
    config::{audit_log_capsule, public_base_url_capsule},
    registry::{
        ClickRecord, CreateError, NewShortcode, ResolveError, ShortcodeStats, ShortcodeStore,
        StatsError, shortcode_store_capsule,
    },
};

pub fn url_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn UrlService> {
    let store = Arc::clone(get.as_ref(shortcode_store_capsule));
    let audit_log = get.as_ref(audit_log_capsule).clone();
    let base_url = get.as_ref(public_base_url_capsule).clone();
    Arc::new(UrlServiceImpl {
        store,
        audit_log,
        base_url,
    })
}

#[async_trait]
pub trait UrlService: Send + Sync {
    async fn create_short_url(
        &self,
        payload: CreateShortUrlPayload,
    ) -> Result<CreatedShortUrl, CreateShortUrlError>;
    async fn get_stats(&self, code: &str) -> Result<ShortUrlStats, GetStatsError>;
    async fn redirect(
        &self,
        code: &str,
        referrer: Option<String>,
    ) -> Result<Redirect, ResolveError>;
}

#[derive(Debug, Error)]
pub enum CreateShortUrlError {
    #[error("URL is a required field.")]
    MissingUrl,
    #[error("validity of {0} minutes is out of range")]
    ValidityOutOfRange(i64),
    #[error("This shortcode is already in use.")]
    ShortcodeTaken(String),
    #[error("internal error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum GetStatsError {
    #[error("Shortcode not found.")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

struct UrlServiceImpl {
    store: Arc<dyn ShortcodeStore>,
    audit_log: AuditLog,
    base_url: Url,
}

impl UrlServiceImpl {
    fn short_link(&self, code: &str) -> String {
        format!("{}/{code}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl UrlService for UrlServiceImpl {
    #[instrument(skip(self))]
    async fn create_short_url(
        &self,
        CreateShortUrlPayload {
            url,
            validity,
            shortcode,
        }: CreateShortUrlPayload,
    ) -> Result<CreatedShortUrl, CreateShortUrlError> {
        self.audit_log.log(
            Level::Info,
            Package::Route,
            "Request received at POST /shorturls",
        );

        let original_url = url.unwrap_or_default();
        let created = self
            .store
            .create(NewShortcode {
                original_url: original_url.clone(),
                validity_minutes: validity,
                desired_code: shortcode,
            })
            .map_err(|err| match err {
                CreateError::MissingUrl => {
                    self.audit_log.log(
                        Level::Error,
                        Package::Handler,
                        "Validation failed: URL is a required field.",
                    );
                    CreateShortUrlError::MissingUrl
                }
                CreateError::ValidityOutOfRange(minutes) => {
                    self.audit_log.log(
                        Level::Error,
                        Package::Handler,
                        format!("Validation failed: validity of {minutes} minutes is out of range."),
                    );
                    CreateShortUrlError::ValidityOutOfRange(minutes)
                }
                CreateError::Collision(code) => {
                    self.audit_log.log(
                        Level::Error,
                        Package::Handler,
                        format!("Shortcode collision: {code} already exists."),
                    );
                    CreateShortUrlError::ShortcodeTaken(code)
                }
                CreateError::Exhausted(_) => {
                    error!(?err, "Could not generate a free shortcode");
                    self.audit_log.log(
                        Level::Fatal,
                        Package::Service,
                        "Could not generate a free shortcode.",
                    );
                    CreateShortUrlError::Internal(
                        anyhow::Error::new(err).context("Failed to register shortcode"),
                    )
                }
            })?;

        let expiry = format_timestamp(created.expires_at)
            .context("Failed to format expiration timestamp")
            .map_err(CreateShortUrlError::Internal)?;

        self.audit_log.log(
            Level::Info,
            Package::Service,
            format!(
                "Successfully created shortcode {} for URL {original_url}",
                created.code
            ),
        );
        Ok(CreatedShortUrl {
            short_link: self.short_link(&created.code),
            expiry,
        })
    }

    #[instrument(skip(self))]
    async fn get_stats(&self, code: &str) -> Result<ShortUrlStats, GetStatsError> {
        self.audit_log.log(
            Level::Info,
            Package::Route,
            format!("Statistics request for shortcode: {code}"),
        );

        match self.store.stats(code) {
            Ok(stats) => stats
                .try_into()
                .context("Failed to convert ShortcodeStats into external format")
                .map_err(GetStatsError::Internal),
            Err(StatsError::NotFound) => {
                self.audit_log.log(
                    Level::Warn,
                    Package::Handler,
                    format!("Statistics requested for non-existent shortcode: {code}"),
                );
                Err(GetStatsError::NotFound)
            }
        }
    }

    #[instrument(skip(self))]
    async fn redirect(
        &self,
        code: &str,
        referrer: Option<String>,
    ) -> Result<Redirect, ResolveError> {
        self.audit_log.log(
            Level::Info,
            Package::Route,
            format!("Redirect request for shortcode: {code}"),
        );

        match self.store.resolve_and_record(code, referrer) {
            Ok(url) => {
                self.audit_log.log(
                    Level::Info,
                    Package::Service,
                    format!("Redirecting {code} to its original URL."),
                );
                Ok(Redirect { url })
            }
            Err(ResolveError::NotFound) => {
                self.audit_log.log(
                    Level::Warn,
                    Package::Handler,
                    format!("Redirect failed: Shortcode not found: {code}"),
                );
                Err(ResolveError::NotFound)
            }
            Err(ResolveError::Expired) => {
                self.audit_log.log(
                    Level::Warn,
                    Package::Handler,
                    format!("Attempted to access expired link: {code}"),
                );
                Err(ResolveError::Expired)
            }
        }
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.format(&Rfc3339)
}

impl TryFrom<ClickRecord> for ClickDetail {
    type Error = anyhow::Error;

    fn try_from(
        ClickRecord {
            timestamp,
            referrer,
            location,
        }: ClickRecord,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            timestamp: format_timestamp(timestamp).context("Failed to format click timestamp")?,
            referrer,
            location,
        })
    }
}

impl TryFrom<ShortcodeStats> for ShortUrlStats {
    type Error = anyhow::Error;

    fn try_from(
        ShortcodeStats {
            click_count,
            original_url,
            created_at,
            expires_at,
            clicks,
        }: ShortcodeStats,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            total_clicks: click_count,
            original_url,
            creation_date: format_timestamp(created_at)
                .context("Failed to format creation timestamp")?,
            expiry_date: format_timestamp(expires_at)
                .context("Failed to format expiration timestamp")?,
            click_details: clicks
                .into_iter()
                .map(ClickDetail::try_from)
                .collect::<anyhow::Result<_>>()?,
        })
    }
}
