use std::{
    env::{self, VarError},
    sync::Arc,
};

use rearch::{CData, CapsuleHandle, Container};
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    audit_log::{AuditLog, AuditLogConfig},
    clock::{Clock, SystemClock},
};

/// Builds the [`Container`] the server runs with, starting the audit log
/// worker when it is configured.
///
/// # Panics
/// Panics when called outside of a tokio runtime, or when an environment
/// variable is set to an invalid value.
#[instrument]
#[must_use]
pub fn init_container() -> Container {
    info!("Initializing container");
    let container = Container::new();

    let (audit_log_config, set_audit_log) =
        container.read((audit_log_config_capsule, audit_log_init_action));
    match audit_log_config {
        Some(config) => {
            info!(endpoint = %config.endpoint, "Starting audit log worker");
            set_audit_log(AuditLog::spawn(config));
        }
        None => warn!("LOG_API_URL or LOG_API_TOKEN not set; audit logging is disabled"),
    }

    info!("Container initialized");
    container
}

fn read_env_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(actual)) => {
            panic!("{name} environment variable is invalid: {}", actual.display());
        }
    }
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    const ENV_VAR_NAME: &str = "ADDR";
    const DEFAULT_ADDR: &str = "127.0.0.1:3000";

    read_env_var(ENV_VAR_NAME).map_or_else(
        || {
            warn!(
                addr = DEFAULT_ADDR,
                "{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_ADDR}"
            );
            DEFAULT_ADDR.to_owned()
        },
        |addr| {
            info!(addr, "{ENV_VAR_NAME} environment variable set");
            addr
        },
    )
}

/// Base URL that short links are built on.
///
/// # Panics
/// Panics when environment variable is not a valid URL.
pub fn public_base_url_capsule(_: CapsuleHandle) -> Url {
    const ENV_VAR_NAME: &str = "PUBLIC_BASE_URL";
    const DEFAULT_BASE_URL: &str = "http://localhost:3000";

    let base_url = read_env_var(ENV_VAR_NAME).unwrap_or_else(|| {
        warn!("{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_BASE_URL}");
        DEFAULT_BASE_URL.to_owned()
    });
    Url::parse(&base_url).unwrap_or_else(|err| {
        panic!("{ENV_VAR_NAME} environment variable is not a valid URL ({base_url}): {err}")
    })
}

/// Remote collector settings; [`None`] unless both variables are set.
///
/// # Panics
/// Panics when `LOG_API_URL` is not a valid URL.
pub fn audit_log_config_capsule(_: CapsuleHandle) -> Option<AuditLogConfig> {
    const URL_ENV_VAR_NAME: &str = "LOG_API_URL";
    const TOKEN_ENV_VAR_NAME: &str = "LOG_API_TOKEN";

    let endpoint = read_env_var(URL_ENV_VAR_NAME)?;
    let token = read_env_var(TOKEN_ENV_VAR_NAME).filter(|token| !token.is_empty())?;
    let endpoint = Url::parse(&endpoint).unwrap_or_else(|err| {
        panic!("{URL_ENV_VAR_NAME} environment variable is not a valid URL ({endpoint}): {err}")
    });
    Some(AuditLogConfig { endpoint, token })
}

fn audit_log_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<AuditLog>, impl use<> + CData + Fn(Option<AuditLog>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn audit_log_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(AuditLog) {
    let set_audit_log = get.as_ref(audit_log_manager).1.clone();
    move |audit_log| set_audit_log(Some(audit_log))
}

/// The [`AuditLog`] set via [`audit_log_init_action`], or a disabled one.
pub fn audit_log_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> AuditLog {
    get.as_ref(audit_log_manager)
        .0
        .clone()
        .unwrap_or_else(AuditLog::disabled)
}

fn clock_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (
    Option<Arc<dyn Clock>>,
    impl use<> + CData + Fn(Option<Arc<dyn Clock>>),
) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

/// Replaces the clock everything in the container reads time from.
pub fn clock_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(Arc<dyn Clock>) {
    let set_clock = get.as_ref(clock_manager).1.clone();
    move |clock| set_clock(Some(clock))
}

pub fn clock_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Arc<dyn Clock> {
    get.as_ref(clock_manager)
        .0
        .clone()
        .unwrap_or_else(|| Arc::new(SystemClock))
}
