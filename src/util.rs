use chrono::{DateTime, Local};

const SMTP_PASSWORD: &str = "MONITOR_SMTP_PASSWORD";

pub fn get_smtp_password() -> Option<String> {
    let password_from_env = std::env::var(SMTP_PASSWORD);
    password_from_env.ok().filter(|password| !password.is_empty())
}

/// Source of the current time
///
/// The scheduler reads it once per cycle, so every decision within a cycle
/// sees the same `now`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
