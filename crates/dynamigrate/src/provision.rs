//! Destination table creation (Imperative Shell).

use crate::config::WaitConfig;
use crate::error::{MigrateError, Result};
use crate::schema::CreateTableRequest;
use crate::store::{CreateOutcome, DestinationStore};

/// How the destination table came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// Created by this run and confirmed active.
    Created,
    /// Already present; its configuration was left untouched.
    AlreadyExisted,
}

/// Creates the destination table and waits for it to become active.
///
/// An existing table with the same name counts as success and is not waited on.
pub async fn provision_table<D>(
    dest: &D,
    request: &CreateTableRequest,
    wait: &WaitConfig,
) -> Result<Provisioned>
where
    D: DestinationStore + ?Sized,
{
    match dest.create_table(request).await? {
        CreateOutcome::Created => {
            tracing::info!(table = %request.table_name, "creating destination table");
            wait_for_table_active(dest, &request.table_name, wait).await?;
            tracing::info!(table = %request.table_name, "table created successfully");
            Ok(Provisioned::Created)
        }
        CreateOutcome::AlreadyExists => {
            tracing::warn!(table = %request.table_name, "table already exists, skipping creation");
            Ok(Provisioned::AlreadyExisted)
        }
    }
}

/// Polls until the table and all its GSIs are active.
pub async fn wait_for_table_active<D>(dest: &D, table_name: &str, wait: &WaitConfig) -> Result<()>
where
    D: DestinationStore + ?Sized,
{
    for attempt in 1..=wait.max_attempts {
        if let Some(state) = dest.table_state(table_name).await? {
            if state.is_active() {
                return Ok(());
            }
            tracing::debug!(table = table_name, attempt, status = ?state.status, "table not active yet");
        }
        if attempt < wait.max_attempts {
            tokio::time::sleep(wait.poll_interval).await;
        }
    }

    Err(MigrateError::TableActivationTimeout {
        table_name: table_name.to_string(),
        attempts: wait.max_attempts,
    })
}
