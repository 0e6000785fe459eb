//! Error types for the monitoring engine
//!
//! None of these are fatal while monitoring is running. They are reported
//! through the event log and the current cycle (or endpoint) moves on.

use std::path::PathBuf;

/// Result type alias for engine operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while running a monitoring cycle
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The inventory file does not exist
    #[error("inventory file {} not found", .0.display())]
    InventoryMissing(PathBuf),

    /// The inventory file lacks one of the required columns
    #[error("inventory is missing required column(s): {0}")]
    InventoryColumns(String),

    /// The inventory file could not be read or parsed
    #[error("failed to read inventory: {0}")]
    InventoryRead(#[from] csv::Error),

    /// Handing a notification to the transport failed
    #[error("failed to dispatch notification: {0}")]
    Dispatch(#[from] TransportError),

    /// Reading or writing the event log failed
    #[error("event log I/O error: {0}")]
    LogIo(#[from] std::io::Error),
}

/// Errors reported by a notification transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No transport is configured, alerts cannot leave the process
    #[error("no notification transport configured")]
    NotConfigured,

    /// The message could not be built (bad address, bad attachment type, ...)
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The relay or webhook rejected the message or could not be reached
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Delivery(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        TransportError::Delivery(err.to_string())
    }
}

impl From<lettre::error::Error> for TransportError {
    fn from(err: lettre::error::Error) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}

impl From<lettre::address::AddressError> for TransportError {
    fn from(err: lettre::address::AddressError) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}
