//! In-memory store implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, BillingModeSummary, GlobalSecondaryIndexDescription, IndexStatus,
    ProvisionedThroughputDescription, TableDescription,
};

use super::{
    CreateOutcome, DestinationStore, GsiState, GsiStatus, Item, ScanPage, SourceStore, TableState,
    TableStatus,
};
use crate::error::{MigrateError, Result};
use crate::schema::CreateTableRequest;

/// Attribute holding the scan offset inside an in-memory `last_evaluated_key`.
const CURSOR_ATTRIBUTE: &str = "__offset";

/// A call made against an [`InMemoryStore`], recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DescribeTable(String),
    Scan(String),
    CreateTable(CreateTableRequest),
    TableState(String),
    BatchWrite { table_name: String, items: usize },
}

/// In-memory storage backend for testing.
///
/// Stands in for one account/region. Every call is recorded so tests can assert
/// on the exact sequence of requests, and failures can be injected per table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, InMemoryTable>,
    calls: Vec<Call>,
    page_size: Option<usize>,
    activation_polls: u32,
    unprocessed_once: usize,
    unprocessed_always: bool,
    failing_describes: HashSet<String>,
    failing_creates: HashSet<String>,
    failing_writes: HashSet<String>,
    failing_scans: HashSet<String>,
}

#[derive(Debug, Clone)]
struct InMemoryTable {
    description: TableDescription,
    items: Vec<Item>,
    polls_until_active: u32,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an existing table with the given items.
    pub fn with_table(self, description: TableDescription, items: Vec<Item>) -> Self {
        let name = description.table_name().unwrap_or_default().to_string();
        self.lock().tables.insert(
            name,
            InMemoryTable {
                description,
                items,
                polls_until_active: 0,
            },
        );
        self
    }

    /// Limits scan pages to `page_size` items. Unlimited by default.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = Some(page_size.max(1));
        self
    }

    /// Tables created through this store report `CREATING` for `polls` state checks.
    pub fn with_activation_polls(self, polls: u32) -> Self {
        self.lock().activation_polls = polls;
        self
    }

    /// The next batch write leaves its last `count` items unprocessed.
    pub fn with_unprocessed_once(self, count: usize) -> Self {
        self.lock().unprocessed_once = count;
        self
    }

    /// Every batch write leaves all of its items unprocessed.
    pub fn with_unprocessed_always(self) -> Self {
        self.lock().unprocessed_always = true;
        self
    }

    pub fn failing_describe(self, table_name: &str) -> Self {
        self.lock().failing_describes.insert(table_name.to_string());
        self
    }

    pub fn failing_create(self, table_name: &str) -> Self {
        self.lock().failing_creates.insert(table_name.to_string());
        self
    }

    pub fn failing_writes(self, table_name: &str) -> Self {
        self.lock().failing_writes.insert(table_name.to_string());
        self
    }

    /// Scans of `table_name` fail on every page after the first.
    pub fn failing_scan(self, table_name: &str) -> Self {
        self.lock().failing_scans.insert(table_name.to_string());
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Create requests received so far.
    pub fn create_requests(&self) -> Vec<CreateTableRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::CreateTable(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Sizes of the batch writes sent to `table_name`, in order.
    pub fn batch_sizes(&self, table_name: &str) -> Vec<usize> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::BatchWrite { table_name: t, items } if t == table_name => Some(*items),
                _ => None,
            })
            .collect()
    }

    /// Items currently stored in `table_name`.
    pub fn items(&self, table_name: &str) -> Vec<Item> {
        self.lock()
            .tables
            .get(table_name)
            .map(|table| table.items.clone())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table_name: &str) -> bool {
        self.lock().tables.contains_key(table_name)
    }

    /// Stored description of `table_name`.
    pub fn description(&self, table_name: &str) -> Option<TableDescription> {
        self.lock()
            .tables
            .get(table_name)
            .map(|table| table.description.clone())
    }
}

fn cursor_item(offset: usize) -> Item {
    HashMap::from([(
        CURSOR_ATTRIBUTE.to_string(),
        AttributeValue::N(offset.to_string()),
    )])
}

fn cursor_offset(key: Option<&Item>) -> usize {
    key.and_then(|key| key.get(CURSOR_ATTRIBUTE))
        .and_then(|value| value.as_n().ok())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn describe_created(request: &CreateTableRequest) -> TableDescription {
    let gsis = request
        .global_secondary_indexes
        .iter()
        .map(|gsi| {
            GlobalSecondaryIndexDescription::builder()
                .index_name(gsi.index_name())
                .set_key_schema(Some(gsi.key_schema().to_vec()))
                .set_projection(gsi.projection().cloned())
                .set_provisioned_throughput(gsi.provisioned_throughput().map(|t| {
                    ProvisionedThroughputDescription::builder()
                        .read_capacity_units(t.read_capacity_units())
                        .write_capacity_units(t.write_capacity_units())
                        .build()
                }))
                .index_status(IndexStatus::Creating)
                .build()
        })
        .collect();

    TableDescription::builder()
        .table_name(&request.table_name)
        .set_attribute_definitions(Some(request.attribute_definitions.clone()))
        .set_key_schema(Some(request.key_schema.clone()))
        .billing_mode_summary(
            BillingModeSummary::builder()
                .billing_mode(request.billing_mode.clone())
                .build(),
        )
        .set_provisioned_throughput(request.provisioned_throughput.as_ref().map(|t| {
            ProvisionedThroughputDescription::builder()
                .read_capacity_units(t.read_capacity_units())
                .write_capacity_units(t.write_capacity_units())
                .build()
        }))
        .set_global_secondary_indexes(Some(gsis))
        .table_status(aws_sdk_dynamodb::types::TableStatus::Creating)
        .build()
}

#[async_trait]
impl SourceStore for InMemoryStore {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let mut state = self.lock();
        state.calls.push(Call::DescribeTable(table_name.to_string()));

        if state.failing_describes.contains(table_name) {
            return Err(MigrateError::DescribeTable {
                table_name: table_name.to_string(),
                message: "AccessDeniedException: not authorized to perform dynamodb:DescribeTable"
                    .to_string(),
            });
        }

        state
            .tables
            .get(table_name)
            .map(|table| table.description.clone())
            .ok_or_else(|| MigrateError::SourceTableNotFound {
                table_name: table_name.to_string(),
            })
    }

    async fn scan_page(
        &self,
        table_name: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage> {
        let mut state = self.lock();
        state.calls.push(Call::Scan(table_name.to_string()));
        let page_size = state.page_size;

        if exclusive_start_key.is_some() && state.failing_scans.contains(table_name) {
            return Err(MigrateError::Scan {
                table_name: table_name.to_string(),
                message: "ProvisionedThroughputExceededException: simulated throttling".to_string(),
            });
        }

        let table = state
            .tables
            .get(table_name)
            .ok_or_else(|| MigrateError::SourceTableNotFound {
                table_name: table_name.to_string(),
            })?;

        let start = cursor_offset(exclusive_start_key.as_ref()).min(table.items.len());
        let end = match page_size {
            Some(size) => (start + size).min(table.items.len()),
            None => table.items.len(),
        };

        Ok(ScanPage {
            items: table.items[start..end].to_vec(),
            last_evaluated_key: (end < table.items.len()).then(|| cursor_item(end)),
        })
    }
}

#[async_trait]
impl DestinationStore for InMemoryStore {
    async fn create_table(&self, request: &CreateTableRequest) -> Result<CreateOutcome> {
        let mut state = self.lock();
        state.calls.push(Call::CreateTable(request.clone()));

        if state.failing_creates.contains(&request.table_name) {
            return Err(MigrateError::CreateTable {
                table_name: request.table_name.clone(),
                message: "LimitExceededException: too many tables being created".to_string(),
            });
        }

        if state.tables.contains_key(&request.table_name) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let polls_until_active = state.activation_polls;
        state.tables.insert(
            request.table_name.clone(),
            InMemoryTable {
                description: describe_created(request),
                items: Vec::new(),
                polls_until_active,
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn table_state(&self, table_name: &str) -> Result<Option<TableState>> {
        let mut state = self.lock();
        state.calls.push(Call::TableState(table_name.to_string()));

        let Some(table) = state.tables.get_mut(table_name) else {
            return Ok(None);
        };

        let (status, gsi_status) = if table.polls_until_active > 0 {
            table.polls_until_active -= 1;
            (TableStatus::Creating, GsiStatus::Creating)
        } else {
            (TableStatus::Active, GsiStatus::Active)
        };

        let gsis = table
            .description
            .global_secondary_indexes()
            .iter()
            .map(|gsi| GsiState {
                name: gsi.index_name().unwrap_or_default().to_string(),
                status: gsi_status,
            })
            .collect();

        Ok(Some(TableState { status, gsis }))
    }

    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        let mut state = self.lock();
        state.calls.push(Call::BatchWrite {
            table_name: table_name.to_string(),
            items: items.len(),
        });

        if state.failing_writes.contains(table_name) {
            return Err(MigrateError::BatchWrite {
                table_name: table_name.to_string(),
                message: "InternalServerError: simulated outage".to_string(),
            });
        }
        if !state.tables.contains_key(table_name) {
            return Err(MigrateError::BatchWrite {
                table_name: table_name.to_string(),
                message: "ResourceNotFoundException: Requested resource not found".to_string(),
            });
        }

        let mut items = items;
        let unprocessed = if state.unprocessed_always {
            std::mem::take(&mut items)
        } else {
            let count = std::mem::take(&mut state.unprocessed_once).min(items.len());
            items.split_off(items.len() - count)
        };

        if let Some(table) = state.tables.get_mut(table_name) {
            table.items.extend(items);
        }
        Ok(unprocessed)
    }
}

/// Table descriptions and items for seeding in-memory stores.
pub mod fixtures {
    use aws_sdk_dynamodb::types::builders::TableDescriptionBuilder;
    use aws_sdk_dynamodb::types::{
        AttributeDefinition, AttributeValue, BillingMode, BillingModeSummary,
        GlobalSecondaryIndexDescription, IndexStatus, KeySchemaElement, KeyType, Projection,
        ProjectionType, ProvisionedThroughputDescription, ScalarAttributeType, TableDescription,
        TableStatus,
    };

    use crate::store::Item;

    pub const PARTITION_KEY: &str = "id";
    pub const GSI_PARTITION_KEY: &str = "gsi_pk";

    fn key(name: &str, key_type: KeyType) -> KeySchemaElement {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(key_type)
            .build()
            .expect("key schema element has all required fields")
    }

    fn attribute(name: &str) -> AttributeDefinition {
        AttributeDefinition::builder()
            .attribute_name(name)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .expect("attribute definition has all required fields")
    }

    /// An active table keyed on `id` with no billing information.
    pub fn table_builder(name: &str) -> TableDescriptionBuilder {
        TableDescription::builder()
            .table_name(name)
            .attribute_definitions(attribute(PARTITION_KEY))
            .attribute_definitions(attribute(GSI_PARTITION_KEY))
            .key_schema(key(PARTITION_KEY, KeyType::Hash))
            .table_status(TableStatus::Active)
    }

    pub fn throughput(read: i64, write: i64) -> ProvisionedThroughputDescription {
        ProvisionedThroughputDescription::builder()
            .read_capacity_units(read)
            .write_capacity_units(write)
            .build()
    }

    /// A provisioned table as DescribeTable reports it (no billing summary).
    pub fn provisioned_table(name: &str, read: i64, write: i64) -> TableDescription {
        table_builder(name)
            .provisioned_throughput(throughput(read, write))
            .build()
    }

    pub fn on_demand_table(name: &str) -> TableDescription {
        table_builder(name)
            .billing_mode_summary(
                BillingModeSummary::builder()
                    .billing_mode(BillingMode::PayPerRequest)
                    .build(),
            )
            .provisioned_throughput(throughput(0, 0))
            .build()
    }

    /// An active GSI on `gsi_pk` projecting all attributes.
    pub fn gsi(name: &str, capacity: Option<(i64, i64)>) -> GlobalSecondaryIndexDescription {
        GlobalSecondaryIndexDescription::builder()
            .index_name(name)
            .key_schema(key(GSI_PARTITION_KEY, KeyType::Hash))
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .set_provisioned_throughput(capacity.map(|(read, write)| throughput(read, write)))
            .index_status(IndexStatus::Active)
            .build()
    }

    /// `count` distinct items with a string key and a numeric payload.
    pub fn items(count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| {
                Item::from([
                    (
                        PARTITION_KEY.to_string(),
                        AttributeValue::S(format!("item-{i:05}")),
                    ),
                    ("position".to_string(), AttributeValue::N(i.to_string())),
                    (
                        "tags".to_string(),
                        AttributeValue::Ss(vec!["migrated".to_string(), format!("n{i}")]),
                    ),
                ])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_pages_follow_cursor() {
        let store = InMemoryStore::new()
            .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(5))
            .with_page_size(2);

        let first = store.scan_page("DEV-TABLE-1", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let second = store
            .scan_page("DEV-TABLE-1", first.last_evaluated_key)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        let third = store
            .scan_page("DEV-TABLE-1", second.last_evaluated_key)
            .await
            .unwrap();
        assert_eq!(third.items, fixtures::items(5)[4..].to_vec());
        assert!(third.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_failing_scan_breaks_on_second_page() {
        let store = InMemoryStore::new()
            .with_table(fixtures::provisioned_table("DEV-TABLE-1", 1, 1), fixtures::items(5))
            .with_page_size(2)
            .failing_scan("DEV-TABLE-1");

        let first = store.scan_page("DEV-TABLE-1", None).await.unwrap();
        assert_eq!(first.items.len(), 2);

        let err = store
            .scan_page("DEV-TABLE-1", first.last_evaluated_key)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Scan { .. }));
    }

    #[tokio::test]
    async fn test_unknown_source_table() {
        let store = InMemoryStore::new();
        let err = store.describe_table("missing").await.unwrap_err();
        assert!(matches!(err, MigrateError::SourceTableNotFound { .. }));
    }

    #[tokio::test]
    async fn test_created_table_activates_after_polls() {
        let store = InMemoryStore::new().with_activation_polls(1);
        let request = crate::schema::translate(
            &fixtures::provisioned_table("DEV-TABLE-1", 5, 5),
            "PROD-TABLE-1",
        )
        .unwrap();

        assert_eq!(
            store.create_table(&request).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_table(&request).await.unwrap(),
            CreateOutcome::AlreadyExists
        );

        let state = store.table_state("PROD-TABLE-1").await.unwrap().unwrap();
        assert_eq!(state.status, TableStatus::Creating);
        let state = store.table_state("PROD-TABLE-1").await.unwrap().unwrap();
        assert!(state.is_active());
        assert!(store.table_state("PROD-TABLE-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unprocessed_once_holds_back_tail() {
        let store = InMemoryStore::new()
            .with_table(fixtures::on_demand_table("PROD-TABLE-1"), Vec::new())
            .with_unprocessed_once(2);

        let unprocessed = store
            .batch_write("PROD-TABLE-1", fixtures::items(5))
            .await
            .unwrap();
        assert_eq!(unprocessed, fixtures::items(5)[3..].to_vec());
        assert_eq!(store.items("PROD-TABLE-1").len(), 3);

        let unprocessed = store.batch_write("PROD-TABLE-1", unprocessed).await.unwrap();
        assert!(unprocessed.is_empty());
        assert_eq!(store.items("PROD-TABLE-1"), fixtures::items(5));
    }
}
