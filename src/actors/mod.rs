//! Actor-based monitoring loop
//!
//! A single actor owns the endpoint registry and runs the monitoring cycles
//! as an independent tokio task. Everything else talks to it through a
//! [`monitor::MonitorHandle`]:
//!
//! ```text
//!   MonitorHandle ──commands (mpsc)──▶ MonitorActor ──lines (broadcast)──▶ viewers
//!         │                                 ▲
//!         └────────stop flag (watch)────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Events**: event log entries are broadcast for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod monitor;
