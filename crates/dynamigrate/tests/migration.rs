//! End-to-end migration scenarios against in-memory accounts.

use std::time::Duration;

use aws_sdk_dynamodb::types::BillingMode;
use dynamigrate::provision::Provisioned;
use dynamigrate::store::inmemory::{fixtures, Call, InMemoryStore};
use dynamigrate::{migrate_all, MigrateError, MigrationConfig, RetryConfig, WaitConfig};

fn config(tables: &[&str], source_prefix: &str, destination_prefix: &str) -> MigrationConfig {
    MigrationConfig::new(
        tables.iter().map(|t| t.to_string()).collect(),
        source_prefix,
        destination_prefix,
    )
    .with_wait(WaitConfig {
        poll_interval: Duration::ZERO,
        max_attempts: 10,
    })
    .with_retry(RetryConfig {
        max_retries: 3,
        base_delay: Duration::ZERO,
    })
}

#[tokio::test]
async fn test_single_provisioned_table_with_thirty_items() {
    let source = InMemoryStore::new().with_table(
        fixtures::provisioned_table("DEV-TABLE-1", 5, 5),
        fixtures::items(30),
    );
    let dest = InMemoryStore::new().with_activation_polls(1);
    let config = config(&["DEV-TABLE-1"], "DEV-TABLE-1", "PROD-TABLE-1");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(report.is_success());
    let table = &report.tables[0];
    assert_eq!(table.destination, "PROD-TABLE-1");
    let outcome = table.result.as_ref().unwrap();
    assert_eq!(outcome.provisioned, Provisioned::Created);
    assert_eq!(outcome.stats.items, 30);

    let creates = dest.create_requests();
    assert_eq!(creates.len(), 1);
    let request = &creates[0];
    assert_eq!(request.table_name, "PROD-TABLE-1");
    assert_eq!(request.billing_mode, BillingMode::Provisioned);
    let throughput = request.provisioned_throughput.as_ref().unwrap();
    assert_eq!(
        (throughput.read_capacity_units(), throughput.write_capacity_units()),
        (5, 5)
    );
    assert!(request.global_secondary_indexes.is_empty());

    // Create, wait until active, then two batches of 25 and 5.
    let calls = dest.calls();
    assert!(matches!(calls[0], Call::CreateTable(_)));
    assert_eq!(
        calls[1..],
        [
            Call::TableState("PROD-TABLE-1".to_string()),
            Call::TableState("PROD-TABLE-1".to_string()),
            Call::BatchWrite {
                table_name: "PROD-TABLE-1".to_string(),
                items: 25
            },
            Call::BatchWrite {
                table_name: "PROD-TABLE-1".to_string(),
                items: 5
            },
        ]
    );
    assert_eq!(dest.items("PROD-TABLE-1"), source.items("DEV-TABLE-1"));
}

#[tokio::test]
async fn test_existing_destination_goes_straight_to_copy() {
    let source = InMemoryStore::new().with_table(
        fixtures::provisioned_table("DEV-TABLE-2", 5, 5),
        fixtures::items(3),
    );
    let dest = InMemoryStore::new()
        .with_table(fixtures::on_demand_table("PROD-TABLE-2"), Vec::new());
    let config = config(&["DEV-TABLE-2"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(report.is_success());
    let outcome = report.tables[0].result.as_ref().unwrap();
    assert_eq!(outcome.provisioned, Provisioned::AlreadyExisted);
    assert!(!dest
        .calls()
        .iter()
        .any(|call| matches!(call, Call::TableState(_))));
    assert_eq!(dest.batch_sizes("PROD-TABLE-2"), vec![3]);
    assert_eq!(dest.items("PROD-TABLE-2").len(), 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent_for_provisioning() {
    let source = InMemoryStore::new().with_table(
        fixtures::provisioned_table("DEV-TABLE-1", 5, 5),
        fixtures::items(2),
    );
    let dest = InMemoryStore::new();
    let config = config(&["DEV-TABLE-1"], "DEV", "PROD");

    assert!(migrate_all(&source, &dest, &config).await.is_success());
    let before = dest.description("PROD-TABLE-1");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(report.is_success());
    assert_eq!(
        report.tables[0].result.as_ref().unwrap().provisioned,
        Provisioned::AlreadyExisted
    );
    assert_eq!(dest.description("PROD-TABLE-1"), before);
}

#[tokio::test]
async fn test_describe_failure_skips_only_that_table() {
    let source = InMemoryStore::new()
        .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(1))
        .with_table(fixtures::provisioned_table("DEV-TABLE-2", 1, 1), fixtures::items(1))
        .with_table(fixtures::on_demand_table("DEV-TABLE-3"), fixtures::items(4))
        .failing_describe("DEV-TABLE-2");
    let dest = InMemoryStore::new();
    let config = config(&["DEV-TABLE-1", "DEV-TABLE-2", "DEV-TABLE-3"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert_eq!(report.tables.len(), 3);
    assert_eq!(report.succeeded().count(), 2);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source, "DEV-TABLE-2");
    assert!(matches!(
        failed[0].error(),
        Some(MigrateError::DescribeTable { table_name, .. }) if table_name == "DEV-TABLE-2"
    ));
    assert!(!dest.has_table("PROD-TABLE-2"));
    assert_eq!(dest.items("PROD-TABLE-3").len(), 4);
}

#[tokio::test]
async fn test_create_failure_skips_copy() {
    let source = InMemoryStore::new()
        .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(3));
    let dest = InMemoryStore::new().failing_create("PROD-TABLE-1");
    let config = config(&["DEV-TABLE-1"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(matches!(
        report.tables[0].error(),
        Some(MigrateError::CreateTable { .. })
    ));
    assert!(dest.batch_sizes("PROD-TABLE-1").is_empty());
    assert!(!source
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Scan(_))));
}

#[tokio::test]
async fn test_replication_failure_is_isolated() {
    let source = InMemoryStore::new()
        .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(3))
        .with_table(fixtures::provisioned_table("DEV-TABLE-2", 1, 1), fixtures::items(3));
    let dest = InMemoryStore::new().failing_writes("PROD-TABLE-1");
    let config = config(&["DEV-TABLE-1", "DEV-TABLE-2"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(matches!(
        report.tables[0].error(),
        Some(MigrateError::BatchWrite { .. })
    ));
    assert!(report.tables[1].result.is_ok());
    assert_eq!(dest.items("PROD-TABLE-2").len(), 3);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_scan_failure_is_isolated() {
    let source = InMemoryStore::new()
        .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(30))
        .with_table(fixtures::provisioned_table("DEV-TABLE-2", 1, 1), fixtures::items(3))
        .with_page_size(20)
        .failing_scan("DEV-TABLE-1");
    let dest = InMemoryStore::new();
    let config = config(&["DEV-TABLE-1", "DEV-TABLE-2"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(matches!(
        report.tables[0].error(),
        Some(MigrateError::Scan { table_name, .. }) if table_name == "DEV-TABLE-1"
    ));
    // The first page landed before the second scan failed.
    assert_eq!(dest.batch_sizes("PROD-TABLE-1"), vec![20]);
    assert_eq!(dest.items("PROD-TABLE-1"), fixtures::items(30)[..20].to_vec());

    assert!(report.tables[1].result.is_ok());
    assert_eq!(dest.items("PROD-TABLE-2").len(), 3);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_unprefixed_table_keeps_its_name() {
    let source = InMemoryStore::new()
        .with_table(fixtures::on_demand_table("shared-config"), fixtures::items(1));
    let dest = InMemoryStore::new();
    let config = config(&["shared-config"], "DEV-", "PROD-");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(report.is_success());
    assert_eq!(report.tables[0].destination, "shared-config");
    assert_eq!(dest.items("shared-config").len(), 1);
}

#[tokio::test]
async fn test_gsis_are_recreated() {
    let description = fixtures::table_builder("DEV-orders")
        .provisioned_throughput(fixtures::throughput(4, 4))
        .global_secondary_indexes(fixtures::gsi("by-customer", Some((2, 2))))
        .global_secondary_indexes(fixtures::gsi("by-status", Some((1, 1))))
        .build();
    let source = InMemoryStore::new().with_table(description, fixtures::items(60));
    let dest = InMemoryStore::new().with_activation_polls(2);
    let config = config(&["DEV-orders"], "DEV", "PROD");

    let report = migrate_all(&source, &dest, &config).await;

    assert!(report.is_success());
    let request = &dest.create_requests()[0];
    let names: Vec<_> = request
        .global_secondary_indexes
        .iter()
        .map(|gsi| gsi.index_name())
        .collect();
    assert_eq!(names, vec!["by-customer", "by-status"]);
    assert_eq!(dest.batch_sizes("PROD-orders"), vec![25, 25, 10]);
}
