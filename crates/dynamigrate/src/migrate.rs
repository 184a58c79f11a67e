//! Per-table migration driver.
//!
//! Tables are migrated one at a time, in configured order. A failure is
//! confined to its own table unless `fail_fast` is set.

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::provision::{provision_table, Provisioned};
use crate::replicate::{replicate_table, ReplicationStats};
use crate::schema::{translate, CreateTableRequest};
use crate::store::{DestinationStore, SourceStore};

/// A successfully migrated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub provisioned: Provisioned,
    pub stats: ReplicationStats,
}

/// Result for one table of the run.
#[derive(Debug)]
pub struct TableReport {
    pub source: String,
    pub destination: String,
    pub result: Result<TableOutcome>,
}

impl TableReport {
    /// The error, if the table failed.
    pub fn error(&self) -> Option<&MigrateError> {
        self.result.as_ref().err()
    }
}

/// Progress notifications emitted while a run is under way.
#[derive(Debug)]
pub enum Progress<'a> {
    Started { source: &'a str, destination: &'a str },
    Finished(&'a TableReport),
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
    /// Tables never attempted because `fail_fast` stopped the run.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none() && self.skipped.is_empty()
    }
}

/// Drives the migration of every configured table.
pub struct Migrator<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    dest: &'a D,
    config: &'a MigrationConfig,
}

impl<'a, S, D> Migrator<'a, S, D>
where
    S: SourceStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    pub fn new(source: &'a S, dest: &'a D, config: &'a MigrationConfig) -> Self {
        Self {
            source,
            dest,
            config,
        }
    }

    /// Migrates all tables.
    pub async fn run(&self) -> MigrationReport {
        self.run_with(|_| {}).await
    }

    /// Migrates all tables, reporting progress to `on_progress`.
    pub async fn run_with<F>(&self, mut on_progress: F) -> MigrationReport
    where
        F: FnMut(Progress<'_>),
    {
        let mut report = MigrationReport::default();

        for (index, source) in self.config.tables.iter().enumerate() {
            let destination = self.config.destination_name(source);
            on_progress(Progress::Started {
                source: source.as_str(),
                destination: &destination,
            });

            let result = self.migrate_table(source, &destination).await;
            if let Err(err) = &result {
                tracing::error!(source = %source, destination = %destination, error = %err, "table migration failed");
            }

            let table_report = TableReport {
                source: source.clone(),
                destination,
                result,
            };
            on_progress(Progress::Finished(&table_report));

            let stop = self.config.fail_fast && table_report.result.is_err();
            report.tables.push(table_report);

            if stop {
                report.skipped = self.config.tables[index + 1..].to_vec();
                tracing::warn!(skipped = report.skipped.len(), "stopping after first failure");
                break;
            }
        }

        report
    }

    /// Migrates one table: describe, create, wait, copy.
    pub async fn migrate_table(&self, source: &str, destination: &str) -> Result<TableOutcome> {
        tracing::info!(source, destination, "migrating table");

        let description = self.source.describe_table(source).await?;
        let request = translate(&description, destination)?;

        let provisioned = provision_table(self.dest, &request, &self.config.wait).await?;
        let stats =
            replicate_table(self.source, self.dest, source, destination, &self.config.retry)
                .await?;

        Ok(TableOutcome { provisioned, stats })
    }

    /// Describes and translates every table without touching the destination.
    pub async fn dry_run(&self) -> Vec<(String, Result<CreateTableRequest>)> {
        let mut plans = Vec::with_capacity(self.config.tables.len());
        for source in &self.config.tables {
            let destination = self.config.destination_name(source);
            let request = match self.source.describe_table(source).await {
                Ok(description) => translate(&description, &destination),
                Err(err) => Err(err),
            };
            plans.push((source.clone(), request));
        }
        plans
    }
}

/// Convenience wrapper around [`Migrator::run`].
pub async fn migrate_all<S, D>(source: &S, dest: &D, config: &MigrationConfig) -> MigrationReport
where
    S: SourceStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    Migrator::new(source, dest, config).run().await
}
