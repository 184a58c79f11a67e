//! Access to the source and destination accounts.
//!
//! The migration only needs a handful of DynamoDB operations, split by the side
//! that uses them. `dynamodb` talks to AWS and backs real and dry runs;
//! `inmemory` stands in for an account in tests (`inmemory` feature).

pub mod dynamodb;
#[cfg(any(test, feature = "inmemory"))]
pub mod inmemory;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, TableDescription};

use crate::error::Result;
use crate::schema::CreateTableRequest;

/// One DynamoDB item, copied verbatim.
pub type Item = HashMap<String, AttributeValue>;

/// Maximum items per batch write request (DynamoDB limit).
pub const BATCH_WRITE_MAX_ITEMS: usize = 25;

/// One page of a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Cursor for the next page; `None` when the scan is complete.
    pub last_evaluated_key: Option<Item>,
}

/// Result of a create-table call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The destination already has a table with this name.
    AlreadyExists,
}

/// Represents the current state of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub status: TableStatus,
    pub gsis: Vec<GsiState>,
}

impl TableState {
    /// True when the table and all of its GSIs are active.
    pub fn is_active(&self) -> bool {
        self.status == TableStatus::Active && self.gsis.iter().all(|g| g.status == GsiStatus::Active)
    }
}

/// Table status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    Creating,
    Updating,
    Deleting,
    /// Any other status, or none reported. Never treated as active.
    Unknown,
}

/// GSI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiState {
    pub name: String,
    pub status: GsiStatus,
}

/// GSI status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsiStatus {
    Active,
    Creating,
    Updating,
    Deleting,
    /// Any other status, or none reported. Never treated as active.
    Unknown,
}

/// Operations used against the account tables are read from.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Describes a table.
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription>;

    /// Fetches one scan page starting after `exclusive_start_key`.
    async fn scan_page(
        &self,
        table_name: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage>;
}

/// Operations used against the account tables are written to.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Issues a create-table call.
    async fn create_table(&self, request: &CreateTableRequest) -> Result<CreateOutcome>;

    /// Fetches current table state, returns None if the table doesn't exist.
    async fn table_state(&self, table_name: &str) -> Result<Option<TableState>>;

    /// Writes up to [`BATCH_WRITE_MAX_ITEMS`] items in one request.
    ///
    /// Returns the items the service left unprocessed.
    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> Result<Vec<Item>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_state_requires_active_gsis() {
        let mut state = TableState {
            status: TableStatus::Active,
            gsis: vec![GsiState {
                name: "by-customer".to_string(),
                status: GsiStatus::Creating,
            }],
        };
        assert!(!state.is_active());

        state.gsis[0].status = GsiStatus::Active;
        assert!(state.is_active());

        state.status = TableStatus::Updating;
        assert!(!state.is_active());
    }

    #[test]
    fn test_unknown_status_is_not_active() {
        let mut state = TableState {
            status: TableStatus::Unknown,
            gsis: Vec::new(),
        };
        assert!(!state.is_active());

        state.status = TableStatus::Active;
        state.gsis.push(GsiState {
            name: "by-status".to_string(),
            status: GsiStatus::Unknown,
        });
        assert!(!state.is_active());
    }
}
