//! Copies DynamoDB tables (schema and items) from one account/region to
//! another, renaming each table by swapping a name prefix.
//!
//! The flow per table is: describe the source, translate the description into
//! a create request ([`schema`]), create the destination and wait for it
//! ([`provision`]), then scan and batch-write every item ([`replicate`]).
//! [`migrate::Migrator`] drives that flow over the configured table list.

pub mod config;
pub mod error;
pub mod migrate;
pub mod planning;
pub mod prelude;
pub mod provision;
pub mod replicate;
pub mod schema;
pub mod store;

pub use config::{AwsTarget, MigrationConfig, RetryConfig, WaitConfig};
pub use error::{MigrateError, Result};
pub use migrate::{migrate_all, MigrationReport, Migrator, Progress, TableReport};
