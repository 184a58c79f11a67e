//! Item copy from the source table to the destination table.

use crate::config::RetryConfig;
use crate::error::{MigrateError, Result};
use crate::store::{DestinationStore, Item, SourceStore, BATCH_WRITE_MAX_ITEMS};

/// Counters for one table's copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Scan pages read, empty ones included.
    pub pages: usize,
    pub items: usize,
    /// Chunks of at most 25 items, one per first write attempt.
    pub batches: usize,
    /// Extra batch-write calls spent on unprocessed items.
    pub retries: usize,
}

/// Copies every item of `source_table` into `dest_table`.
///
/// The destination must already exist and be active. Items are written
/// unchanged, in chunks of at most [`BATCH_WRITE_MAX_ITEMS`] per page.
pub async fn replicate_table<S, D>(
    source: &S,
    dest: &D,
    source_table: &str,
    dest_table: &str,
    retry: &RetryConfig,
) -> Result<ReplicationStats>
where
    S: SourceStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    let mut stats = ReplicationStats::default();
    let mut exclusive_start_key = None;

    loop {
        let page = source.scan_page(source_table, exclusive_start_key.take()).await?;
        stats.pages += 1;

        if !page.items.is_empty() {
            tracing::debug!(
                table = source_table,
                page = stats.pages,
                items = page.items.len(),
                "copying scan page"
            );

            for chunk in page.items.chunks(BATCH_WRITE_MAX_ITEMS) {
                stats.retries += write_chunk(dest, dest_table, chunk.to_vec(), retry).await?;
                stats.batches += 1;
                stats.items += chunk.len();
            }
        }

        match page.last_evaluated_key {
            Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
            _ => break,
        }
    }

    tracing::info!(
        source = source_table,
        destination = dest_table,
        items = stats.items,
        batches = stats.batches,
        "data migration completed"
    );
    Ok(stats)
}

/// Writes one chunk, retrying unprocessed items with exponential backoff.
///
/// Returns the number of retries spent.
async fn write_chunk<D>(
    dest: &D,
    table_name: &str,
    chunk: Vec<Item>,
    retry: &RetryConfig,
) -> Result<usize>
where
    D: DestinationStore + ?Sized,
{
    let mut pending = dest.batch_write(table_name, chunk).await?;
    let mut retries = 0;

    while !pending.is_empty() {
        if retries >= retry.max_retries {
            return Err(MigrateError::UnprocessedItems {
                table_name: table_name.to_string(),
                remaining: pending.len(),
                retries: retry.max_retries,
            });
        }
        retries += 1;

        let delay = retry.delay_for(retries);
        tracing::warn!(
            table = table_name,
            unprocessed = pending.len(),
            attempt = retries,
            ?delay,
            "retrying unprocessed items"
        );
        tokio::time::sleep(delay).await;

        pending = dest.batch_write(table_name, pending).await?;
    }

    Ok(retries as usize)
}
