pub mod actors;
pub mod alerts;
pub mod config;
pub mod error;
pub mod event_log;
pub mod inventory;
pub mod monitors;
pub mod util;

pub use actors::messages::CycleReport;
pub use actors::monitor::{MonitorActor, MonitorContext, MonitorHandle};
pub use error::{MonitorError, MonitorResult, TransportError};
pub use event_log::{EventLog, LogEntry, Severity};
pub use monitors::registry::{Endpoint, EndpointRegistry, EndpointStatus, Transition};
