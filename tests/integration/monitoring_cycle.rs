//! Monitoring cycle scenarios
//!
//! These tests drive the actor cycle by cycle with a manual clock, a fake
//! network and a recording transport.

use chrono::{NaiveTime, TimeDelta};
use pretty_assertions::assert_eq;
use reachability_monitoring::{
    EndpointStatus, MonitorActor, Severity, Transition,
    alerts::policy::QuietHours,
    monitors::probe::{Prober, ReachabilityCheck},
};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use crate::helpers::*;

const ROUTER: &str = "10.0.0.1";

fn actor(context: reachability_monitoring::MonitorContext) -> (MonitorActor, watch::Sender<bool>) {
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (MonitorActor::new(context, cmd_rx, shutdown_rx), shutdown_tx)
}

#[tokio::test]
async fn test_outage_alert_cooldown_and_recovery() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_inventory(&config.inventory, &[("router", ROUTER)]);
    let start = local(2026, 4, 20, 10, 0);
    let (context, harness) = test_context(config, start);
    let (mut actor, _stop) = actor(context);

    // t = 0, 1, 2: failing, below threshold
    for minute in 0..3 {
        harness.clock.set(start + TimeDelta::minutes(minute));
        let report = actor.run_cycle().await;
        assert_eq!(report.unreachable, 1);
        assert_eq!(report.alerts_sent, 0);
    }

    // t = 3: fourth failure, one outage alert
    harness.clock.set(start + TimeDelta::minutes(3));
    let report = actor.run_cycle().await;
    assert_eq!(report.transitions, 1);
    assert_eq!(report.alerts_sent, 1);

    let endpoint = actor.registry().get(ROUTER).unwrap();
    assert_eq!(endpoint.status, EndpointStatus::Down);
    assert_eq!(endpoint.last_alert, Some(start + TimeDelta::minutes(3)));

    // t = 4: still failing, nothing new
    harness.clock.set(start + TimeDelta::minutes(4));
    let report = actor.run_cycle().await;
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(harness.transport.sent().len(), 1);

    // t = 70: back up, one recovery alert
    harness.network.set(ROUTER, true);
    harness.clock.set(start + TimeDelta::minutes(70));
    let report = actor.run_cycle().await;
    assert_eq!(report.alerts_sent, 1);

    let endpoint = actor.registry().get(ROUTER).unwrap();
    assert_eq!(endpoint.consecutive_failures, 0);
    assert_eq!(endpoint.status, EndpointStatus::Up);

    let sent = harness.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, "Alert: router (10.0.0.1) unreachable");
    assert_eq!(sent[1].subject, "Recovered: router (10.0.0.1) reachable again");
    assert_eq!(sent[0].to, vec!["ops@example.com".to_string()]);
}

#[tokio::test]
async fn test_quiet_hours_suppress_then_deliver_after_window() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    config.quiet_hours = Some(QuietHours::new(
        NaiveTime::from_hms_opt(21, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
    ));
    write_inventory(&config.inventory, &[("router", ROUTER)]);
    let (context, harness) = test_context(config, local(2026, 4, 20, 23, 0));
    let (mut actor, _stop) = actor(context);

    let report = actor.run_cycle().await;

    assert_eq!(report.transitions, 1);
    assert_eq!(report.alerts_suppressed, 1);
    assert!(harness.transport.sent().is_empty());
    let endpoint = actor.registry().get(ROUTER).unwrap();
    assert_eq!(endpoint.last_alert, None);
    assert_eq!(endpoint.pending_alert, Some(Transition::BecameDown));

    let suppressed: Vec<_> = harness
        .event_log
        .entries()
        .unwrap()
        .into_iter()
        .filter(|entry| entry.severity == Severity::Suppressed)
        .collect();
    assert_eq!(suppressed.len(), 1);
    assert!(suppressed[0].message.contains("quiet hours"));

    // still down once the window is over: the held back alert goes out
    harness.clock.set(local(2026, 4, 21, 7, 31));
    let report = actor.run_cycle().await;
    assert_eq!(report.alerts_sent, 1);
    assert_eq!(harness.transport.sent().len(), 1);
    assert_eq!(actor.registry().get(ROUTER).unwrap().pending_alert, None);
}

#[tokio::test]
async fn test_missing_inventory_skips_cycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let inventory = config.inventory.clone();
    let (context, harness) = test_context(config, local(2026, 4, 20, 10, 0));
    let (mut actor, _stop) = actor(context);

    let report = actor.run_cycle().await;

    assert_eq!(report.probed, 0);
    assert!(report.inventory_error.is_some());
    assert!(actor.registry().is_empty());
    let entries = harness.event_log.entries().unwrap();
    assert!(
        entries
            .iter()
            .any(|entry| entry.severity == Severity::Error && entry.message.contains("not found"))
    );

    // the next cycle picks the file up
    write_inventory(&inventory, &[("router", ROUTER)]);
    harness.clock.advance(TimeDelta::minutes(1));
    let report = actor.run_cycle().await;
    assert_eq!(report.probed, 1);
    assert!(report.inventory_error.is_none());
}

#[tokio::test]
async fn test_missing_columns_skip_cycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(&config.inventory, "name,address\nrouter,10.0.0.1\n").unwrap();
    let (context, _harness) = test_context(config, local(2026, 4, 20, 10, 0));
    let (mut actor, _stop) = actor(context);

    let report = actor.run_cycle().await;

    assert_eq!(report.probed, 0);
    assert!(report.inventory_error.unwrap().contains("hostname, ip"));
}

#[tokio::test]
async fn test_transport_failure_keeps_alert_pending() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    write_inventory(&config.inventory, &[("router", ROUTER)]);
    let (context, harness) = test_context(config, local(2026, 4, 20, 10, 0));
    let (mut actor, _stop) = actor(context);
    harness.transport.set_failing(true);

    let report = actor.run_cycle().await;

    assert_eq!(report.alerts_failed, 1);
    let endpoint = actor.registry().get(ROUTER).unwrap();
    assert_eq!(endpoint.last_alert, None);
    assert_eq!(endpoint.pending_alert, Some(Transition::BecameDown));

    // relay is back, the alert is retried on the next cycle
    harness.transport.set_failing(false);
    harness.clock.advance(TimeDelta::minutes(1));
    let report = actor.run_cycle().await;

    assert_eq!(report.alerts_sent, 1);
    assert_eq!(harness.transport.sent().len(), 1);
    assert!(actor.registry().get(ROUTER).unwrap().last_alert.is_some());
}

#[tokio::test]
async fn test_recovery_within_cooldown_is_delayed_not_lost() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    write_inventory(&config.inventory, &[("router", ROUTER)]);
    let start = local(2026, 4, 20, 10, 0);
    let (context, harness) = test_context(config, start);
    let (mut actor, _stop) = actor(context);

    actor.run_cycle().await;
    assert_eq!(harness.transport.sent().len(), 1);

    harness.network.set(ROUTER, true);
    harness.clock.set(start + TimeDelta::minutes(10));
    let report = actor.run_cycle().await;
    assert_eq!(report.alerts_suppressed, 1);
    assert_eq!(harness.transport.sent().len(), 1);

    harness.clock.set(start + TimeDelta::minutes(61));
    let report = actor.run_cycle().await;
    assert_eq!(report.alerts_sent, 1);
    assert_eq!(
        harness.transport.sent()[1].subject,
        "Recovered: router (10.0.0.1) reachable again"
    );
}

#[tokio::test]
async fn test_short_outage_below_delivery_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    config.quiet_hours = Some(QuietHours::new(
        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
    ));
    write_inventory(&config.inventory, &[("router", ROUTER)]);
    let (context, harness) = test_context(config, local(2026, 4, 20, 3, 0));
    let (mut actor, _stop) = actor(context);

    // down during quiet hours, back up before they end
    actor.run_cycle().await;
    harness.network.set(ROUTER, true);
    harness.clock.set(local(2026, 4, 20, 5, 0));
    actor.run_cycle().await;
    harness.clock.set(local(2026, 4, 20, 8, 0));
    let report = actor.run_cycle().await;

    assert_eq!(report.alerts_sent, 0);
    assert!(harness.transport.sent().is_empty());
    assert_eq!(actor.registry().get(ROUTER).unwrap().pending_alert, None);
}

#[tokio::test]
async fn test_removed_endpoint_keeps_state_but_is_not_probed() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    let inventory = config.inventory.clone();
    write_inventory(&inventory, &[("router", ROUTER), ("nas", "10.0.0.2")]);
    let (context, harness) = test_context(config, local(2026, 4, 20, 10, 0));
    let (mut actor, _stop) = actor(context);

    actor.run_cycle().await;
    assert_eq!(harness.transport.sent().len(), 2);

    write_inventory(&inventory, &[("nas", "10.0.0.2")]);
    harness.clock.advance(TimeDelta::minutes(1));
    let report = actor.run_cycle().await;

    assert_eq!(report.probed, 1);
    assert_eq!(actor.registry().len(), 2);
    assert!(actor.registry().get(ROUTER).unwrap().last_alert.is_some());
}

#[tokio::test]
async fn test_incomplete_inventory_lines_are_logged() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(&config.inventory, "hostname,ip\nrouter,10.0.0.1\nghost,\n").unwrap();
    let (context, harness) = test_context(config, local(2026, 4, 20, 10, 0));
    let (mut actor, _stop) = actor(context);

    let report = actor.run_cycle().await;

    assert_eq!(report.probed, 1);
    assert!(harness.event_log.entries().unwrap().iter().any(|entry| {
        entry.severity == Severity::Warning && entry.message.contains("Incomplete line 3")
    }));
}

/// Requests a stop while the endpoint is being probed, then fails the check
struct StopDuringProbe {
    stop: watch::Sender<bool>,
}

#[async_trait::async_trait]
impl ReachabilityCheck for StopDuringProbe {
    async fn check(&self, _address: &str) -> bool {
        self.stop.send_replace(true);
        false
    }
}

#[tokio::test]
async fn test_stop_request_prevents_pending_dispatch() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.failure_threshold = 1;
    write_inventory(&config.inventory, &[("router", ROUTER), ("nas", "10.0.0.2")]);
    let (mut context, harness) = test_context(config, local(2026, 4, 20, 10, 0));

    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    context.prober = Prober::new(
        single_check_policy(),
        std::sync::Arc::new(StopDuringProbe { stop: shutdown_tx }),
    );
    let mut actor = MonitorActor::new(context, cmd_rx, shutdown_rx);

    let report = actor.run_cycle().await;

    assert!(report.interrupted);
    assert_eq!(report.probed, 1);
    assert_eq!(report.transitions, 1);
    assert_eq!(report.alerts_sent, 0);
    assert!(harness.transport.sent().is_empty());
    assert_eq!(
        actor.registry().get(ROUTER).unwrap().pending_alert,
        Some(Transition::BecameDown)
    );
    assert!(actor.registry().get("10.0.0.2").unwrap().status == EndpointStatus::Unknown);
}

#[tokio::test]
async fn test_inventory_name_with_line_break_is_one_log_line() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(&config.inventory, "hostname,ip\n\"evil\nname\",10.0.0.1\n").unwrap();
    let (context, harness) = test_context(config, local(2026, 4, 20, 10, 0));
    harness.network.set(ROUTER, true);
    let (mut actor, _stop) = actor(context);

    actor.run_cycle().await;

    let content = String::from_utf8(harness.event_log.contents().unwrap()).unwrap();
    let entries = harness.event_log.entries().unwrap();
    assert_eq!(content.lines().count(), entries.len());
    assert!(
        entries
            .iter()
            .any(|entry| entry.message == "Checking evil name (10.0.0.1)...")
    );
    assert!(
        entries
            .iter()
            .any(|entry| entry.message == "evil name (10.0.0.1) answers.")
    );
}
