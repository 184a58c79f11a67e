//! DynamoDB-backed stores (Imperative Shell).

use async_trait::async_trait;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types::{IndexStatus, PutRequest, TableDescription, WriteRequest};
use aws_sdk_dynamodb::Client;

use super::{
    CreateOutcome, DestinationStore, GsiState, GsiStatus, Item, ScanPage, SourceStore, TableState,
    TableStatus,
};
use crate::config::AwsTarget;
use crate::error::{
    map_batch_write_error, map_create_table_error, map_describe_table_error, map_scan_error,
    MigrateError, Result,
};
use crate::schema::CreateTableRequest;

const CREDENTIALS_PROVIDER_NAME: &str = "dynamigrate";

/// Maps a reported table status; anything unrecognised keeps the wait going.
fn table_status(status: Option<&aws_sdk_dynamodb::types::TableStatus>) -> TableStatus {
    use aws_sdk_dynamodb::types::TableStatus as Sdk;

    match status {
        Some(Sdk::Active) => TableStatus::Active,
        Some(Sdk::Creating) => TableStatus::Creating,
        Some(Sdk::Updating) => TableStatus::Updating,
        Some(Sdk::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Unknown,
    }
}

fn gsi_status(status: Option<&IndexStatus>) -> GsiStatus {
    match status {
        Some(IndexStatus::Active) => GsiStatus::Active,
        Some(IndexStatus::Creating) => GsiStatus::Creating,
        Some(IndexStatus::Updating) => GsiStatus::Updating,
        Some(IndexStatus::Deleting) => GsiStatus::Deleting,
        _ => GsiStatus::Unknown,
    }
}

/// A DynamoDB account/region, usable as either side of a migration.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a client for the given target.
    pub async fn connect(target: &AwsTarget) -> Self {
        let mut sdk_config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(target.region.clone()));

        if let Some(credentials) = &target.credentials {
            sdk_config_loader = sdk_config_loader.credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        }

        if let Some(endpoint) = &target.endpoint_url {
            sdk_config_loader = sdk_config_loader.endpoint_url(endpoint);
        }

        let sdk_config = sdk_config_loader.load().await;
        Self::new(Client::new(&sdk_config))
    }
}

#[async_trait]
impl SourceStore for DynamoDbStore {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| map_describe_table_error(e, table_name))?;

        output.table.ok_or_else(|| MigrateError::DescribeTable {
            table_name: table_name.to_string(),
            message: "response did not include a table description".to_string(),
        })
    }

    async fn scan_page(
        &self,
        table_name: &str,
        exclusive_start_key: Option<Item>,
    ) -> Result<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(table_name)
            .set_exclusive_start_key(exclusive_start_key)
            .send()
            .await
            .map_err(|e| map_scan_error(e, table_name))?;

        Ok(ScanPage {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl DestinationStore for DynamoDbStore {
    async fn create_table(&self, request: &CreateTableRequest) -> Result<CreateOutcome> {
        let gsis = (!request.global_secondary_indexes.is_empty())
            .then(|| request.global_secondary_indexes.clone());

        let result = self
            .client
            .create_table()
            .table_name(&request.table_name)
            .set_attribute_definitions(Some(request.attribute_definitions.clone()))
            .set_key_schema(Some(request.key_schema.clone()))
            .billing_mode(request.billing_mode.clone())
            .set_provisioned_throughput(request.provisioned_throughput.clone())
            .set_global_secondary_indexes(gsis)
            .send()
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err)
                if matches!(
                    err.as_service_error(),
                    Some(CreateTableError::ResourceInUseException(_))
                ) =>
            {
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(err) => Err(map_create_table_error(err, &request.table_name)),
        }
    }

    async fn table_state(&self, table_name: &str) -> Result<Option<TableState>> {
        let response = match self.client.describe_table().table_name(table_name).send().await {
            Ok(response) => response,
            Err(err)
                if matches!(
                    err.as_service_error(),
                    Some(DescribeTableError::ResourceNotFoundException(_))
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(map_describe_table_error(err, table_name)),
        };

        let Some(table) = response.table() else {
            return Ok(None);
        };

        let gsis = table
            .global_secondary_indexes()
            .iter()
            .map(|gsi| GsiState {
                name: gsi.index_name().unwrap_or_default().to_string(),
                status: gsi_status(gsi.index_status()),
            })
            .collect();

        Ok(Some(TableState {
            status: table_status(table.table_status()),
            gsis,
        }))
    }

    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        let write_requests = items
            .into_iter()
            .map(|item| {
                PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map(|put| WriteRequest::builder().put_request(put).build())
                    .map_err(|e| MigrateError::BatchWrite {
                        table_name: table_name.to_string(),
                        message: format!("Failed to build put request: {e}"),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table_name, write_requests)
            .send()
            .await
            .map_err(|e| map_batch_write_error(e, table_name))?;

        let unprocessed = output
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(table_name))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|request| request.put_request.map(|put| put.item))
            .collect();

        Ok(unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::TableStatus as Sdk;

    #[test]
    fn test_table_status_mapping() {
        assert_eq!(table_status(Some(&Sdk::Active)), TableStatus::Active);
        assert_eq!(table_status(Some(&Sdk::Creating)), TableStatus::Creating);
        assert_eq!(table_status(Some(&Sdk::Archiving)), TableStatus::Unknown);
        assert_eq!(
            table_status(Some(&Sdk::InaccessibleEncryptionCredentials)),
            TableStatus::Unknown
        );
        assert_eq!(table_status(None), TableStatus::Unknown);
    }

    #[test]
    fn test_gsi_status_mapping() {
        assert_eq!(gsi_status(Some(&IndexStatus::Active)), GsiStatus::Active);
        assert_eq!(gsi_status(Some(&IndexStatus::Deleting)), GsiStatus::Deleting);
        assert_eq!(gsi_status(None), GsiStatus::Unknown);
    }
}
