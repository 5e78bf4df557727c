use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{instrument, warn};
use url::Url;

/// Stack reported with every audit event emitted by this service.
pub const STACK: &str = "backend";

/// Number of undelivered events held before new ones get dropped.
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Package {
    Route,
    Handler,
    Service,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub stack: &'static str,
    pub level: Level,
    pub package: Package,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    pub endpoint: Url,
    pub token: String,
}

/// Fire-and-forget handle to the remote audit collector.
///
/// Events are queued for a background worker; [`AuditLog::log`] never waits on
/// the network and never reports delivery failures to the caller.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    sender: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditLog {
    /// An audit log that silently discards everything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sender: None }
    }

    /// Spawns the delivery worker onto the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn spawn(config: AuditLogConfig) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_audit_log_worker(
            receiver,
            reqwest::Client::new(),
            config,
        ));
        Self {
            sender: Some(sender),
        }
    }

    #[cfg(test)]
    pub(crate) const fn with_sender(sender: mpsc::Sender<AuditEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn log(&self, level: Level, package: Package, message: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };

        let event = AuditEvent {
            stack: STACK,
            level,
            package,
            message: message.into(),
        };
        if let Err(err) = sender.try_send(event) {
            warn!(%err, "Dropped audit event");
        }
    }
}

#[instrument(skip_all, fields(endpoint = %config.endpoint))]
async fn run_audit_log_worker(
    mut receiver: mpsc::Receiver<AuditEvent>,
    client: reqwest::Client,
    config: AuditLogConfig,
) {
    while let Some(event) = receiver.recv().await {
        let delivery = client
            .post(config.endpoint.clone())
            .bearer_auth(&config.token)
            .json(&event)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(err) = delivery {
            warn!(
                ?err,
                stack = event.stack,
                level = ?event.level,
                package = ?event.package,
                message = %event.message,
                "Failed to deliver audit event"
            );
        }
    }
}
