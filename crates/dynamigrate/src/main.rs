use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dynamigrate::planning::{calculate_plan, format_create_request, format_plan};
use dynamigrate::prelude::*;
use dynamigrate::provision::Provisioned;
use dynamigrate::store::dynamodb::DynamoDbStore;
use dynamigrate::{
    AwsTarget, MigrateError, MigrationConfig, Migrator, Progress, RetryConfig, WaitConfig,
};

/// dynamigrate - copy DynamoDB tables between accounts and regions
#[derive(Debug, Parser)]
#[command(name = "dynamigrate")]
#[command(version, about, long_about = "Copy DynamoDB tables between accounts and regions.

For every table in the list, the source table is described, recreated in the
destination under a new name (first occurrence of --source-prefix replaced by
--destination-prefix), and every item is copied with batch writes of at most
25 items.

An existing destination table is reused as is. Tables are migrated one at a
time; a failure stops only that table unless --fail-fast is given.

Examples:
  dynamigrate --table DEV-users,DEV-orders --source-prefix DEV- --destination-prefix PROD-
  dynamigrate --table DEV-users --source-prefix DEV- --destination-prefix PROD- --dry-run")]
struct Cli {
    #[command(flatten)]
    global: Global,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    destination: DestinationArgs,

    /// Source tables to migrate, in order.
    #[arg(long = "table", env = "MIGRATE_TABLES", value_delimiter = ',', required = true)]
    tables: Vec<String>,

    /// Name prefix to replace in source table names.
    #[arg(long, env = "MIGRATE_SOURCE_PREFIX")]
    source_prefix: String,

    /// Replacement for the source prefix.
    #[arg(long, env = "MIGRATE_DESTINATION_PREFIX")]
    destination_prefix: String,

    /// Seconds between checks while waiting for a new table to become active.
    #[arg(long, env = "MIGRATE_POLL_INTERVAL_SECS", default_value = "2")]
    poll_interval_secs: u64,

    /// Checks before giving up on a new table becoming active.
    #[arg(long, env = "MIGRATE_MAX_POLL_ATTEMPTS", default_value = "60")]
    max_poll_attempts: u32,

    /// Retries for items a batch write leaves unprocessed.
    #[arg(long, env = "MIGRATE_MAX_WRITE_RETRIES", default_value = "5")]
    max_write_retries: u32,

    /// Stop the whole run after the first failed table.
    #[arg(long)]
    fail_fast: bool,

    /// Describe source tables and print the tables that would be created.
    #[arg(long)]
    dry_run: bool,

    /// Skip confirmation prompts.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, clap::Args)]
struct Global {
    /// Silence the command output
    #[clap(long, global = true)]
    silent: bool,

    /// Enable verbose output
    #[clap(long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, clap::Args)]
struct SourceArgs {
    /// Access key id for the source account.
    #[arg(long = "src-access-key-id", env = "SRC_AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// Secret access key for the source account.
    #[arg(
        long = "src-secret-access-key",
        env = "SRC_AWS_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    secret_access_key: Option<String>,

    /// Source region.
    #[arg(long = "src-region", env = "SRC_AWS_REGION")]
    region: String,

    /// Source endpoint override (e.g. http://localhost:8000).
    #[arg(long = "src-endpoint-url", env = "SRC_AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
struct DestinationArgs {
    /// Access key id for the destination account.
    #[arg(long = "dest-access-key-id", env = "DEST_AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// Secret access key for the destination account.
    #[arg(
        long = "dest-secret-access-key",
        env = "DEST_AWS_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    secret_access_key: Option<String>,

    /// Destination region.
    #[arg(long = "dest-region", env = "DEST_AWS_REGION")]
    region: String,

    /// Destination endpoint override (e.g. http://localhost:8000).
    #[arg(long = "dest-endpoint-url", env = "DEST_AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,
}

impl Cli {
    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::new(
            self.tables.clone(),
            &self.source_prefix,
            &self.destination_prefix,
        )
        .with_wait(WaitConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_poll_attempts,
        })
        .with_retry(RetryConfig {
            max_retries: self.max_write_retries,
            ..RetryConfig::default()
        })
        .with_fail_fast(self.fail_fast)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose {
        "dynamigrate=debug"
    } else {
        "dynamigrate=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let silent = cli.global.silent;
    let source_target = AwsTarget::new(
        cli.source.access_key_id.clone(),
        cli.source.secret_access_key.clone(),
        &cli.source.region,
        cli.source.endpoint_url.clone(),
    )
    .context("invalid source settings")?;
    let dest_target = AwsTarget::new(
        cli.destination.access_key_id.clone(),
        cli.destination.secret_access_key.clone(),
        &cli.destination.region,
        cli.destination.endpoint_url.clone(),
    )
    .context("invalid destination settings")?;
    let config = cli.migration_config();

    if !silent {
        aprintln!("{} {}", p_b("Source:"), source_target.target_display());
        aprintln!("{} {}", p_b("Destination:"), dest_target.target_display());
        aprintln!();
        aprintln!("{}", p_c("Migration Plan:"));
        for line in format_plan(&calculate_plan(&config)) {
            if line.starts_with('~') {
                aprintln!("  {}", p_y(&line));
            } else {
                aprintln!("  {}", p_g(&line));
            }
        }
        aprintln!();
    }

    let source = DynamoDbStore::connect(&source_target).await;
    let dest = DynamoDbStore::connect(&dest_target).await;
    let migrator = Migrator::new(&source, &dest, &config);

    if cli.dry_run {
        let mut failed = 0;
        for (table, request) in migrator.dry_run().await {
            match request {
                Ok(request) => {
                    if !silent {
                        for line in format_create_request(&request) {
                            aprintln!("  {}", line);
                        }
                    }
                }
                Err(err) => {
                    failed += 1;
                    aeprintln!("  {} {}: {}", p_r("✗"), table, err);
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} of {} tables cannot be migrated", config.tables.len());
        }
        return Ok(());
    }

    if !cli.force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Copy {} tables into {}?",
                config.tables.len(),
                dest_target.target_display()
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;

        if !confirmed {
            return Err(MigrateError::UserCancelled.into());
        }
    }

    let report = migrator
        .run_with(|progress| {
            if silent {
                return;
            }
            match progress {
                Progress::Started {
                    source,
                    destination,
                } => {
                    aprintln!("{} {} → {}", p_b("Migrating:"), source, destination);
                }
                Progress::Finished(table) => match &table.result {
                    Ok(outcome) => {
                        if outcome.provisioned == Provisioned::AlreadyExisted {
                            aprintln!(
                                "  {}",
                                p_y(&format!(
                                    "Table {} already exists. Skipped creation.",
                                    table.destination
                                ))
                            );
                        }
                        aprintln!(
                            "  {} {} items in {} batches ({} retries)",
                            p_g("Copied"),
                            outcome.stats.items,
                            outcome.stats.batches,
                            outcome.stats.retries
                        );
                    }
                    Err(err) => {
                        aeprintln!("  {} {}", p_r("Failed:"), err);
                    }
                },
            }
        })
        .await;

    let failed = report.failed().count();
    if !silent {
        aprintln!();
        aprintln!(
            "{} {} migrated, {} failed, {} skipped",
            p_c("Summary:"),
            report.succeeded().count(),
            failed,
            report.skipped.len()
        );
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} tables were not migrated",
            failed + report.skipped.len(),
            config.tables.len()
        );
    }

    Ok(())
}
