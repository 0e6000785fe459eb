//! MonitorActor - Drives the monitoring cycles
//!
//! ## Message Flow
//!
//! ```text
//! cycle: load inventory → reconcile registry → for each endpoint:
//!            probe → observe → (pending alert?) → policy → dispatch
//!    ↓
//! sleep (interval) ──┬── timer fires → next cycle
//!                    ├── command → handled, keep sleeping
//!                    └── stop flag → exit
//! ```
//!
//! The stop flag is checked at the top of each cycle, before each probe,
//! before each dispatch and while sleeping. A dispatch already handed to the
//! transport is allowed to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::alerts::policy::{AlertDecision, AlertPolicy};
use crate::alerts::transport::{Transport, build_transport};
use crate::alerts::{AlertManager, AlertSettings};
use crate::config::Config;
use crate::event_log::{EventLog, LogEntry, Severity};
use crate::inventory::{InventoryEntry, load_snapshot};
use crate::monitors::probe::{ProbePolicy, Prober, build_check};
use crate::monitors::registry::{Endpoint, EndpointRegistry, Transition};
use crate::util::{Clock, SystemClock};

use super::messages::{CycleReport, MonitorCommand};

/// Everything a monitor needs besides its channels
pub struct MonitorContext {
    pub config: Config,
    pub prober: Prober,
    pub transport: Option<Arc<dyn Transport>>,
    pub event_log: Arc<EventLog>,
    pub clock: Arc<dyn Clock>,
}

impl MonitorContext {
    /// Wire up the real prober, transport, event log and clock
    pub fn from_config(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let policy = ProbePolicy::from(&config.probe);
        let prober = Prober::new(policy, build_check(config.probe.method, policy.check_timeout));
        let transport: Option<Arc<dyn Transport>> = match &config.transport {
            Some(transport) => Some(Arc::from(build_transport(transport)?)),
            None => None,
        };
        let event_log = Arc::new(EventLog::new(
            config.log_file.clone(),
            config.log_retention(),
            clock.clone(),
        ));

        Ok(Self {
            config,
            prober,
            transport,
            event_log,
            clock,
        })
    }
}

pub struct MonitorActor {
    inventory: PathBuf,
    interval: Duration,
    registry: EndpointRegistry,
    prober: Prober,
    policy: AlertPolicy,
    alerts: AlertManager,
    event_log: Arc<EventLog>,
    clock: Arc<dyn Clock>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<MonitorCommand>,

    /// Becomes `true` once a stop is requested
    shutdown_rx: watch::Receiver<bool>,
}

impl MonitorActor {
    pub fn new(
        context: MonitorContext,
        command_rx: mpsc::Receiver<MonitorCommand>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let MonitorContext {
            config,
            prober,
            transport,
            event_log,
            clock,
        } = context;

        let settings = AlertSettings {
            sender: config.sender.clone(),
            recipients: config.recipients.clone(),
            probe: *prober.policy(),
            failure_threshold: config.failure_threshold,
            attach_log: config.attach_log,
        };

        Self {
            inventory: config.inventory.clone(),
            interval: config.scan_interval(),
            registry: EndpointRegistry::new(config.failure_threshold),
            policy: AlertPolicy::from_config(&config),
            alerts: AlertManager::new(settings, transport, event_log.clone()),
            prober,
            event_log,
            clock,
            command_rx,
            shutdown_rx,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Run cycles until a stop is requested or the handle is dropped
    #[instrument(skip(self), fields(inventory = %self.inventory.display()))]
    pub async fn run(mut self) {
        debug!("starting monitor actor");
        self.event_log.log(
            Severity::Info,
            format!(
                "Monitoring started, scanning every {} min",
                self.interval.as_secs() / 60
            ),
        );

        while !self.stop_requested() {
            self.run_cycle().await;

            if !self.wait_for_next_cycle().await {
                break;
            }
        }

        self.event_log.log(Severity::Info, "Monitoring stopped");
        debug!("monitor actor stopped");
    }

    /// Sleep until the next cycle is due, serving commands meanwhile
    ///
    /// Returns `false` when the monitor should stop instead.
    async fn wait_for_next_cycle(&mut self) -> bool {
        if self.stop_requested() {
            return false;
        }

        let next_cycle = sleep(self.interval);
        tokio::pin!(next_cycle);

        loop {
            tokio::select! {
                _ = &mut next_cycle => return true,

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("stop requested while sleeping");
                        return false;
                    }
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        warn!("command channel closed, shutting down");
                        return false;
                    }
                },
            }
        }
    }

    async fn handle_command(&mut self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::CycleNow { respond_to } => {
                debug!("received CycleNow command");
                let report = self.run_cycle().await;
                let _ = respond_to.send(report);
            }

            MonitorCommand::GetEndpoint {
                address,
                respond_to,
            } => {
                let _ = respond_to.send(self.registry.get(&address).cloned());
            }

            MonitorCommand::ListEndpoints { respond_to } => {
                let mut endpoints: Vec<_> = self.registry.iter().cloned().collect();
                endpoints.sort_by(|a, b| a.address.cmp(&b.address));
                let _ = respond_to.send(endpoints);
            }
        }
    }

    /// One full pass over the inventory
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let now = self.clock.now();
        let mut report = CycleReport::default();

        self.event_log.log(
            Severity::Info,
            format!("--- Scan at {} ---", now.format("%H:%M:%S")),
        );

        let snapshot = match load_snapshot(&self.inventory) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.event_log
                    .log(Severity::Error, format!("Scan skipped: {e}"));
                report.inventory_error = Some(e.to_string());
                return report;
            }
        };

        for line in &snapshot.incomplete_lines {
            self.event_log.log(
                Severity::Warning,
                format!("Incomplete line {line} in inventory (ignored)"),
            );
        }

        let added = self.registry.reconcile(&snapshot.entries);
        if added > 0 {
            debug!("{added} new endpoint(s) in inventory");
        }

        for entry in &snapshot.entries {
            if self.stop_requested() {
                report.interrupted = true;
                break;
            }
            self.check_endpoint(entry, now, &mut report).await;
        }

        if report.interrupted {
            self.event_log
                .log(Severity::Warning, "Stop requested, scan interrupted");
        }

        self.event_log.log(
            Severity::Info,
            format!(
                "--- Scan finished: {} probed, {} unreachable ---",
                report.probed, report.unreachable
            ),
        );
        report
    }

    async fn check_endpoint(
        &mut self,
        entry: &InventoryEntry,
        now: DateTime<Local>,
        report: &mut CycleReport,
    ) {
        let label = format!("{} ({})", entry.name, entry.address);
        self.event_log
            .log(Severity::Info, format!("Checking {label}..."));

        let reachable = self.prober.probe(&entry.address).await;
        report.probed += 1;

        let transition = self
            .registry
            .observe(&entry.address, &entry.name, reachable, now);
        let Some(endpoint) = self.registry.get(&entry.address) else {
            return;
        };
        let failures = endpoint.consecutive_failures;
        let pending = endpoint.pending_alert;

        if reachable {
            self.event_log
                .log(Severity::Success, format!("{label} answers."));
        } else {
            report.unreachable += 1;
            self.event_log.log(
                Severity::Warning,
                format!(
                    "{label} does not answer ({failures}/{} consecutive failures).",
                    self.registry.failure_threshold()
                ),
            );
        }

        match transition {
            Some(Transition::BecameDown) => {
                report.transitions += 1;
                self.event_log.log(
                    Severity::Error,
                    format!("{label} is DOWN after {failures} consecutive failed probes"),
                );
            }
            Some(Transition::BecameUp) => {
                report.transitions += 1;
                self.event_log
                    .log(Severity::Success, format!("{label} is back UP"));
                if pending.is_none() {
                    self.event_log.log(
                        Severity::Info,
                        format!("{label} recovered before its outage alert went out, nothing to send"),
                    );
                }
            }
            None => {}
        }

        self.handle_pending_alert(&entry.address, now, report).await;
    }

    async fn handle_pending_alert(
        &mut self,
        address: &str,
        now: DateTime<Local>,
        report: &mut CycleReport,
    ) {
        let Some(endpoint) = self.registry.get(address).cloned() else {
            return;
        };
        let Some(transition) = endpoint.pending_alert else {
            return;
        };

        match self.policy.evaluate(&endpoint, now) {
            AlertDecision::Allowed => {}
            AlertDecision::QuietHours => {
                report.alerts_suppressed += 1;
                self.log_suppressed(&endpoint, transition, "quiet hours");
                return;
            }
            AlertDecision::Cooldown { remaining } => {
                report.alerts_suppressed += 1;
                let reason = format!(
                    "anti-spam active, {} min left of {} min",
                    (remaining.num_seconds() + 59) / 60,
                    self.policy.cooldown().num_minutes()
                );
                self.log_suppressed(&endpoint, transition, &reason);
                return;
            }
        }

        if self.stop_requested() {
            report.interrupted = true;
            return;
        }

        match self.alerts.dispatch(&endpoint, transition, now).await {
            Ok(()) => {
                self.registry.record_alert(address, now);
                report.alerts_sent += 1;
            }
            Err(e) => {
                debug!("alert for {address} stays pending: {e}");
                report.alerts_failed += 1;
            }
        }
    }

    fn log_suppressed(&self, endpoint: &Endpoint, transition: Transition, reason: &str) {
        let kind = match transition {
            Transition::BecameDown => "outage",
            Transition::BecameUp => "recovery",
        };
        self.event_log.log(
            Severity::Suppressed,
            format!("{}: {kind} alert held back ({reason})", endpoint.label()),
        );
    }
}

/// Handle for controlling a MonitorActor
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    shutdown_tx: watch::Sender<bool>,
    event_log: Arc<EventLog>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Spawn a new monitor actor; the first cycle starts immediately
    pub fn spawn(context: MonitorContext) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_log = context.event_log.clone();

        let actor = MonitorActor::new(context, cmd_rx, shutdown_rx);
        let task = tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            shutdown_tx,
            event_log,
            task,
        }
    }

    /// Run a cycle now and wait for its report
    pub async fn cycle_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::CycleNow { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    pub async fn endpoint(&self, address: impl Into<String>) -> Option<Endpoint> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::GetEndpoint {
                address: address.into(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    pub async fn endpoints(&self) -> Vec<Endpoint> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(MonitorCommand::ListEndpoints { respond_to: tx })
            .await
            .is_err()
        {
            return vec![];
        }

        rx.await.unwrap_or_default()
    }

    /// Live stream of event log entries
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.event_log.subscribe()
    }

    /// Ask the monitor to stop without waiting for it
    pub fn request_stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Stop the monitor and wait until it has exited
    pub async fn shutdown(self) -> Result<()> {
        self.request_stop();
        self.task.await?;
        Ok(())
    }
}
