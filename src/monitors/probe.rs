//! Reachability prober
//!
//! A probe is organised into series of individual checks:
//!
//! ```text
//! series 1: check ─ delay ─ check ─ delay ─ check   (stops at first success)
//!    │
//!  series delay
//!    │
//! series 2: check ─ delay ─ check ─ delay ─ check
//! ```
//!
//! The address is reachable as soon as any check succeeds. It is unreachable
//! only once every check of every series failed. Each check runs under a hard
//! timeout and a timed out check is simply a failed one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, trace};

use crate::config::{ProbeConfig, ProbeMethod};

/// A single reachability check against an address
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self, address: &str) -> bool;
}

/// One ICMP echo through the system `ping` utility
#[derive(Debug, Clone)]
pub struct PingCheck {
    timeout: Duration,
}

impl PingCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn args(&self, address: &str) -> Vec<String> {
        if cfg!(windows) {
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                self.timeout.as_millis().to_string(),
                address.to_string(),
            ]
        } else {
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                self.timeout.as_secs().max(1).to_string(),
                address.to_string(),
            ]
        }
    }
}

#[async_trait]
impl ReachabilityCheck for PingCheck {
    async fn check(&self, address: &str) -> bool {
        let output = Command::new("ping")
            .args(self.args(address))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                // replies carry a TTL, "destination unreachable" answers do not
                let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
                output.status.success() && stdout.contains("ttl=")
            }
            Err(e) => {
                debug!("{address}: could not run ping: {e}");
                false
            }
        }
    }
}

/// A TCP connect to a fixed port
#[derive(Debug, Clone)]
pub struct TcpCheck {
    port: u16,
}

impl TcpCheck {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ReachabilityCheck for TcpCheck {
    async fn check(&self, address: &str) -> bool {
        match TcpStream::connect((address, self.port)).await {
            Ok(_) => true,
            Err(e) => {
                trace!("{address}:{}: connect failed: {e}", self.port);
                false
            }
        }
    }
}

pub fn build_check(method: ProbeMethod, check_timeout: Duration) -> Arc<dyn ReachabilityCheck> {
    match method {
        ProbeMethod::Ping => Arc::new(PingCheck::new(check_timeout)),
        ProbeMethod::Tcp { port } => Arc::new(TcpCheck::new(port)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub series: u32,
    pub checks_per_series: u32,
    pub check_timeout: Duration,
    pub check_delay: Duration,
    pub series_delay: Duration,
}

impl ProbePolicy {
    /// Upper bound on how long a single probe can take
    pub fn worst_case_duration(&self) -> Duration {
        let per_check = self.check_timeout + self.check_delay;
        per_check * (self.series * self.checks_per_series)
            + self.series_delay * self.series.saturating_sub(1)
    }
}

impl From<&ProbeConfig> for ProbePolicy {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            series: config.series,
            checks_per_series: config.checks_per_series,
            check_timeout: Duration::from_secs(config.timeout_secs),
            check_delay: Duration::from_secs(config.check_delay_secs),
            series_delay: Duration::from_secs(config.series_delay_secs),
        }
    }
}

#[derive(Clone)]
pub struct Prober {
    policy: ProbePolicy,
    check: Arc<dyn ReachabilityCheck>,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Prober {
    pub fn new(policy: ProbePolicy, check: Arc<dyn ReachabilityCheck>) -> Self {
        Self { policy, check }
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    #[instrument(skip(self))]
    pub async fn probe(&self, address: &str) -> bool {
        let ProbePolicy {
            series,
            checks_per_series,
            check_timeout,
            check_delay,
            series_delay,
        } = self.policy;

        for current_series in 1..=series {
            if current_series > 1 {
                sleep(series_delay).await;
            }

            for attempt in 1..=checks_per_series {
                if attempt > 1 {
                    sleep(check_delay).await;
                }

                match timeout(check_timeout, self.check.check(address)).await {
                    Ok(true) => {
                        trace!("reachable (series {current_series}, check {attempt})");
                        return true;
                    }
                    Ok(false) => trace!("check {attempt}/{checks_per_series} failed"),
                    Err(_) => trace!("check {attempt}/{checks_per_series} timed out"),
                }
            }

            debug!("series {current_series}/{series} exhausted without an answer");
        }

        false
    }
}
