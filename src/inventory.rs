//! Endpoint inventory
//!
//! A CSV file with at least the `hostname` and `ip` columns, read from
//! scratch at the start of every cycle.

use std::path::Path;

use tracing::trace;

use crate::error::{MonitorError, MonitorResult};

const NAME_COLUMN: &str = "hostname";
const ADDRESS_COLUMN: &str = "ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub name: String,
    pub address: String,
}

impl InventoryEntry {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<InventoryEntry>,
    /// Line numbers of rows without a name or a usable address
    pub incomplete_lines: Vec<u64>,
}

pub fn load_snapshot(path: &Path) -> MonitorResult<Snapshot> {
    if !path.exists() {
        return Err(MonitorError::InventoryMissing(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|header| header == name);
    let (Some(name_idx), Some(address_idx)) = (column(NAME_COLUMN), column(ADDRESS_COLUMN)) else {
        let missing: Vec<_> = [NAME_COLUMN, ADDRESS_COLUMN]
            .into_iter()
            .filter(|name| column(*name).is_none())
            .collect();
        return Err(MonitorError::InventoryColumns(missing.join(", ")));
    };

    let mut snapshot = Snapshot::default();
    for record in reader.records() {
        let record = record?;
        let name = normalise_name(record.get(name_idx).unwrap_or_default());
        let address = record.get(address_idx).unwrap_or_default();

        if name.is_empty() || address.is_empty() || address.chars().any(char::is_control) {
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            snapshot.incomplete_lines.push(line);
            continue;
        }

        snapshot.entries.push(InventoryEntry::new(name, address));
    }

    trace!(
        "loaded {} endpoint(s) from {}",
        snapshot.entries.len(),
        path.display()
    );
    Ok(snapshot)
}

/// Control characters (quoted line breaks, tabs) become single spaces
fn normalise_name(name: &str) -> String {
    name.split(char::is_control)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
