//! Error types and AWS SDK error mapping.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Errors that can occur while migrating a table.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Source table '{table_name}' not found")]
    SourceTableNotFound { table_name: String },

    #[error("Error describing table {table_name}: {message}")]
    DescribeTable { table_name: String, message: String },

    #[error("Table {table_name} cannot be recreated: {message}")]
    InvalidSchema { table_name: String, message: String },

    #[error("Error creating table {table_name}: {message}")]
    CreateTable { table_name: String, message: String },

    #[error("Timeout waiting for table {table_name} to become active after {attempts} attempts")]
    TableActivationTimeout { table_name: String, attempts: u32 },

    #[error("Error scanning table {table_name}: {message}")]
    Scan { table_name: String, message: String },

    #[error("Error writing batch to table {table_name}: {message}")]
    BatchWrite { table_name: String, message: String },

    #[error("{remaining} items still unprocessed in table {table_name} after {retries} retries")]
    UnprocessedItems {
        table_name: String,
        remaining: usize,
        retries: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled by user")]
    UserCancelled,
}

impl MigrateError {
    /// Name of the table the error refers to, if any.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Self::SourceTableNotFound { table_name }
            | Self::DescribeTable { table_name, .. }
            | Self::InvalidSchema { table_name, .. }
            | Self::CreateTable { table_name, .. }
            | Self::TableActivationTimeout { table_name, .. }
            | Self::Scan { table_name, .. }
            | Self::BatchWrite { table_name, .. }
            | Self::UnprocessedItems { table_name, .. } => Some(table_name),
            Self::InvalidConfig(_) | Self::UserCancelled => None,
        }
    }
}

/// Map a DescribeTable SDK error to MigrateError.
pub fn map_describe_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DescribeTableError, R>,
    table_name: &str,
) -> MigrateError {
    let message = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        DescribeTableError::ResourceNotFoundException(_) => MigrateError::SourceTableNotFound {
            table_name: table_name.to_string(),
        },
        _ => MigrateError::DescribeTable {
            table_name: table_name.to_string(),
            message,
        },
    }
}

/// Map a CreateTable SDK error to MigrateError.
///
/// `ResourceInUseException` is handled by the caller before this is reached.
pub fn map_create_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<CreateTableError, R>,
    table_name: &str,
) -> MigrateError {
    let message = DisplayErrorContext(&err).to_string();
    let message = match err.into_service_error() {
        CreateTableError::LimitExceededException(_) => {
            format!("Table or index limit exceeded for the account: {message}")
        }
        CreateTableError::InternalServerError(_) => {
            format!("DynamoDB internal server error: {message}")
        }
        _ => message,
    };
    MigrateError::CreateTable {
        table_name: table_name.to_string(),
        message,
    }
}

/// Map a Scan SDK error to MigrateError.
pub fn map_scan_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<ScanError, R>,
    table_name: &str,
) -> MigrateError {
    let message = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        ScanError::ResourceNotFoundException(_) => MigrateError::SourceTableNotFound {
            table_name: table_name.to_string(),
        },
        ScanError::ProvisionedThroughputExceededException(_) => MigrateError::Scan {
            table_name: table_name.to_string(),
            message: format!("Throughput exceeded: {message}"),
        },
        _ => MigrateError::Scan {
            table_name: table_name.to_string(),
            message,
        },
    }
}

/// Map a BatchWriteItem SDK error to MigrateError.
pub fn map_batch_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchWriteItemError, R>,
    table_name: &str,
) -> MigrateError {
    let message = DisplayErrorContext(&err).to_string();
    let message = match err.into_service_error() {
        BatchWriteItemError::ProvisionedThroughputExceededException(_) => {
            format!("Throughput exceeded: {message}")
        }
        BatchWriteItemError::RequestLimitExceeded(_) => {
            format!("Request limit exceeded: {message}")
        }
        BatchWriteItemError::ItemCollectionSizeLimitExceededException(_) => {
            format!("Item collection size limit exceeded: {message}")
        }
        _ => message,
    };
    MigrateError::BatchWrite {
        table_name: table_name.to_string(),
        message,
    }
}
