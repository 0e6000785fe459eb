use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use chrono::TimeDelta;
use tracing::trace;

use crate::alerts::policy::QuietHours;

const MAX_ANTI_SPAM_MINUTES: u64 = 365 * 24 * 60;
const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// CSV file with the `hostname` and `ip` columns
    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,

    /// Event log file (append-only, pruned to `log_retention_days`)
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: u64,

    /// Consecutive failed probes before an endpoint is declared down
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Minimum time between two alerts for the same endpoint
    #[serde(default = "default_anti_spam")]
    pub anti_spam_minutes: u64,

    #[serde(default)]
    pub probe: ProbeConfig,

    pub quiet_hours: Option<QuietHours>,

    #[serde(default = "default_retention_days")]
    pub log_retention_days: u32,

    /// Attach the current event log to every alert
    #[serde(default)]
    pub attach_log: bool,

    #[serde(default = "default_sender")]
    pub sender: String,

    #[serde(default)]
    pub recipients: Vec<String>,

    /// Where alerts go. Without a transport, alerts are only logged.
    pub transport: Option<TransportConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_series")]
    pub series: u32,
    #[serde(default = "default_checks_per_series")]
    pub checks_per_series: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_check_delay_secs")]
    pub check_delay_secs: u64,
    #[serde(default = "default_series_delay_secs")]
    pub series_delay_secs: u64,
    #[serde(default)]
    pub method: ProbeMethod,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            series: default_series(),
            checks_per_series: default_checks_per_series(),
            timeout_secs: default_timeout_secs(),
            check_delay_secs: default_check_delay_secs(),
            series_delay_secs: default_series_delay_secs(),
            method: ProbeMethod::default(),
        }
    }
}

/// How a single reachability check is performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeMethod {
    /// One ICMP echo through the system `ping` utility
    #[default]
    Ping,
    /// A TCP connect to the given port
    Tcp { port: u16 },
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    Webhook(WebhookConfig),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    /// Overridden by `MONITOR_SMTP_PASSWORD` when set
    pub password: Option<String>,
}

impl SmtpConfig {
    pub fn password(&self) -> Option<String> {
        crate::util::get_smtp_password().or_else(|| self.password.clone())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

fn default_inventory() -> PathBuf {
    PathBuf::from("equipements.csv")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log_surveillance.txt")
}

fn default_scan_interval() -> u64 {
    1
}

fn default_failure_threshold() -> u32 {
    4
}

fn default_anti_spam() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    7
}

fn default_sender() -> String {
    String::from("guardia-ping@localhost")
}

fn default_series() -> u32 {
    1
}

fn default_checks_per_series() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_check_delay_secs() -> u64 {
    1
}

fn default_series_delay_secs() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inventory: default_inventory(),
            log_file: default_log_file(),
            scan_interval_minutes: default_scan_interval(),
            failure_threshold: default_failure_threshold(),
            anti_spam_minutes: default_anti_spam(),
            probe: ProbeConfig::default(),
            quiet_hours: None,
            log_retention_days: default_retention_days(),
            attach_log: false,
            sender: default_sender(),
            recipients: vec![],
            transport: None,
        }
    }
}

impl Config {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes * 60)
    }

    /// Saturates instead of overflowing; `validate` keeps it in range
    pub fn anti_spam(&self) -> TimeDelta {
        i64::try_from(self.anti_spam_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn log_retention(&self) -> TimeDelta {
        TimeDelta::try_days(i64::from(self.log_retention_days)).unwrap_or(TimeDelta::MAX)
    }

    /// Reject settings that would make the monitor meaningless or spin
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_interval_minutes == 0 {
            bail!("scan_interval_minutes must be at least 1");
        }
        if self.failure_threshold == 0 {
            bail!("failure_threshold must be at least 1");
        }
        if self.probe.series == 0 || self.probe.checks_per_series == 0 {
            bail!("probe.series and probe.checks_per_series must be at least 1");
        }
        if self.probe.timeout_secs == 0 {
            bail!("probe.timeout_secs must be at least 1");
        }
        if self.anti_spam_minutes > MAX_ANTI_SPAM_MINUTES {
            bail!("anti_spam_minutes must be at most {MAX_ANTI_SPAM_MINUTES} (one year)");
        }
        if self.log_retention_days > MAX_RETENTION_DAYS {
            bail!("log_retention_days must be at most {MAX_RETENTION_DAYS}");
        }
        if self.transport.is_some() && self.recipients.is_empty() {
            bail!("a transport is configured but no recipients are given");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
