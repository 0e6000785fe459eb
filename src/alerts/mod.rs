pub mod policy;
pub mod transport;

use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{instrument, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::event_log::{EventLog, Severity};
use crate::monitors::probe::ProbePolicy;
use crate::monitors::registry::{Endpoint, Transition};

use self::transport::{Attachment, Notification, Transport};

/// A state change worth telling someone about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub address: String,
    pub display_name: String,
    pub transition: Transition,
    pub timestamp: DateTime<Local>,
}

impl AlertEvent {
    pub fn new(endpoint: &Endpoint, transition: Transition, timestamp: DateTime<Local>) -> Self {
        Self {
            address: endpoint.address.clone(),
            display_name: endpoint.display_name.clone(),
            transition,
            timestamp,
        }
    }

    fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.address)
    }
}

/// Static parts of every alert
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub sender: String,
    pub recipients: Vec<String>,
    pub probe: ProbePolicy,
    pub failure_threshold: u32,
    pub attach_log: bool,
}

/// Composes alerts and hands them to the configured transport
#[derive(Clone)]
pub struct AlertManager {
    settings: AlertSettings,
    transport: Option<Arc<dyn Transport>>,
    event_log: Arc<EventLog>,
}

impl AlertManager {
    pub fn new(
        settings: AlertSettings,
        transport: Option<Arc<dyn Transport>>,
        event_log: Arc<EventLog>,
    ) -> Self {
        Self {
            settings,
            transport,
            event_log,
        }
    }

    pub fn compose(&self, event: &AlertEvent, attachment: Option<Attachment>) -> Notification {
        let endpoint = event.label();
        let at = event.timestamp.format("%Y-%m-%d %H:%M:%S");
        let (subject, body) = match event.transition {
            Transition::BecameDown => (
                format!("Alert: {endpoint} unreachable"),
                format!(
                    "The host {endpoint} did not answer: unreachable after {} series of {} checks, \
                     on {} consecutive monitoring cycles.\nDetected at {at}.",
                    self.settings.probe.series,
                    self.settings.probe.checks_per_series,
                    self.settings.failure_threshold,
                ),
            ),
            Transition::BecameUp => (
                format!("Recovered: {endpoint} reachable again"),
                format!(
                    "The host {endpoint} recovered after a prior outage and answers again.\n\
                     Recovered at {at}."
                ),
            ),
        };

        Notification {
            from: self.settings.sender.clone(),
            to: self.settings.recipients.clone(),
            subject,
            body,
            attachment,
        }
    }

    /// Event log contents as an attachment, if enabled and readable
    fn log_attachment(&self) -> Option<Attachment> {
        if !self.settings.attach_log {
            return None;
        }

        match self.event_log.contents() {
            Ok(content) => {
                let filename = self
                    .event_log
                    .path()
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "events.log".to_string());
                Some(Attachment { filename, content })
            }
            Err(e) => {
                warn!("sending alert without log attachment: {e}");
                None
            }
        }
    }

    /// Send the alert for `transition` of `endpoint`
    ///
    /// Transport faults are logged and returned, never raised further. The
    /// caller records the alert time only on `Ok`.
    #[instrument(skip_all, fields(address = %endpoint.address, ?transition))]
    pub async fn dispatch(
        &self,
        endpoint: &Endpoint,
        transition: Transition,
        now: DateTime<Local>,
    ) -> MonitorResult<()> {
        let event = AlertEvent::new(endpoint, transition, now);

        let Some(transport) = &self.transport else {
            let notification = self.compose(&event, None);
            self.event_log.log(
                Severity::Warning,
                format!(
                    "{} (no transport configured, alert only logged)",
                    notification.subject
                ),
            );
            return Ok(());
        };

        let notification = self.compose(&event, self.log_attachment());
        match transport.send(&notification).await {
            Ok(()) => {
                self.event_log.log(
                    Severity::Success,
                    format!("Alert sent for {}: {}", event.label(), notification.subject),
                );
                Ok(())
            }
            Err(e) => {
                self.event_log.log(
                    Severity::Error,
                    format!("Failed to send alert for {}: {e}", event.label()),
                );
                Err(MonitorError::Dispatch(e))
            }
        }
    }
}
