//! Translation of a source table description into a create-table request
//! (Functional Core - no I/O).

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, GlobalSecondaryIndexDescription,
    KeySchemaElement, ProvisionedThroughput, ProvisionedThroughputDescription, TableDescription,
};

use crate::error::{MigrateError, Result};

/// Everything needed to recreate a table in the destination account.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub key_schema: Vec<KeySchemaElement>,
    pub billing_mode: BillingMode,
    /// Present iff `billing_mode` is `PROVISIONED`.
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
}

impl CreateTableRequest {
    pub fn is_provisioned(&self) -> bool {
        self.billing_mode == BillingMode::Provisioned
    }
}

/// Billing mode of a described table, `PROVISIONED` when the summary is absent.
pub fn billing_mode(description: &TableDescription) -> BillingMode {
    description
        .billing_mode_summary()
        .and_then(|summary| summary.billing_mode())
        .cloned()
        .unwrap_or(BillingMode::Provisioned)
}

/// Builds the create request for `destination` from the source `description`.
pub fn translate(description: &TableDescription, destination: &str) -> Result<CreateTableRequest> {
    let source_name = description.table_name().unwrap_or(destination);
    let billing_mode = billing_mode(description);
    let provisioned = billing_mode == BillingMode::Provisioned;

    let provisioned_throughput = if provisioned {
        Some(copy_throughput(
            description.provisioned_throughput(),
            source_name,
            "table",
        )?)
    } else {
        None
    };

    let global_secondary_indexes = description
        .global_secondary_indexes()
        .iter()
        .map(|gsi| translate_gsi(gsi, provisioned, source_name))
        .collect::<Result<Vec<_>>>()?;

    Ok(CreateTableRequest {
        table_name: destination.to_string(),
        attribute_definitions: description.attribute_definitions().to_vec(),
        key_schema: description.key_schema().to_vec(),
        billing_mode,
        provisioned_throughput,
        global_secondary_indexes,
    })
}

fn translate_gsi(
    gsi: &GlobalSecondaryIndexDescription,
    provisioned: bool,
    source_name: &str,
) -> Result<GlobalSecondaryIndex> {
    let index_name = gsi.index_name().ok_or_else(|| MigrateError::InvalidSchema {
        table_name: source_name.to_string(),
        message: "global secondary index without a name".to_string(),
    })?;

    let provisioned_throughput = if provisioned {
        Some(copy_throughput(
            gsi.provisioned_throughput(),
            source_name,
            index_name,
        )?)
    } else {
        None
    };

    GlobalSecondaryIndex::builder()
        .index_name(index_name)
        .set_key_schema(Some(gsi.key_schema().to_vec()))
        .set_projection(gsi.projection().cloned())
        .set_provisioned_throughput(provisioned_throughput)
        .build()
        .map_err(|e| MigrateError::InvalidSchema {
            table_name: source_name.to_string(),
            message: format!("index {index_name}: {e}"),
        })
}

fn copy_throughput(
    throughput: Option<&ProvisionedThroughputDescription>,
    source_name: &str,
    owner: &str,
) -> Result<ProvisionedThroughput> {
    let missing = || MigrateError::InvalidSchema {
        table_name: source_name.to_string(),
        message: format!("{owner} is PROVISIONED but reports no read/write capacity"),
    };

    let throughput = throughput.ok_or_else(missing)?;
    let read = throughput.read_capacity_units().ok_or_else(missing)?;
    let write = throughput.write_capacity_units().ok_or_else(missing)?;

    ProvisionedThroughput::builder()
        .read_capacity_units(read)
        .write_capacity_units(write)
        .build()
        .map_err(|e| MigrateError::InvalidSchema {
            table_name: source_name.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::inmemory::fixtures;
    use aws_sdk_dynamodb::types::{BillingModeSummary, ProjectionType};

    #[test]
    fn test_provisioned_table_copies_capacity() {
        let description = fixtures::provisioned_table("DEV-TABLE-1", 5, 5);

        let request = translate(&description, "PROD-TABLE-1").unwrap();

        assert_eq!(request.table_name, "PROD-TABLE-1");
        assert_eq!(request.billing_mode, BillingMode::Provisioned);
        let throughput = request.provisioned_throughput.unwrap();
        assert_eq!(throughput.read_capacity_units(), 5);
        assert_eq!(throughput.write_capacity_units(), 5);
        assert!(request.global_secondary_indexes.is_empty());
    }

    #[test]
    fn test_on_demand_table_has_no_capacity() {
        let description = fixtures::on_demand_table("DEV-events");

        let request = translate(&description, "PROD-events").unwrap();

        assert_eq!(request.billing_mode, BillingMode::PayPerRequest);
        assert!(request.provisioned_throughput.is_none());
        assert!(!request.is_provisioned());
    }

    #[test]
    fn test_key_schema_and_attributes_copied_verbatim() {
        let description = fixtures::provisioned_table("DEV-TABLE-1", 1, 2);

        let request = translate(&description, "PROD-TABLE-1").unwrap();

        assert_eq!(request.key_schema, description.key_schema());
        assert_eq!(
            request.attribute_definitions,
            description.attribute_definitions()
        );
    }

    #[test]
    fn test_missing_billing_summary_defaults_to_provisioned() {
        let description = fixtures::provisioned_table("DEV-TABLE-1", 3, 4);
        assert!(description.billing_mode_summary().is_none());
        assert_eq!(billing_mode(&description), BillingMode::Provisioned);
    }

    #[test]
    fn test_explicit_provisioned_summary() {
        let description = fixtures::table_builder("DEV-TABLE-1")
            .billing_mode_summary(
                BillingModeSummary::builder()
                    .billing_mode(BillingMode::Provisioned)
                    .build(),
            )
            .provisioned_throughput(fixtures::throughput(3, 4))
            .build();

        let request = translate(&description, "PROD-TABLE-1").unwrap();
        assert_eq!(
            request
                .provisioned_throughput
                .map(|t| (t.read_capacity_units(), t.write_capacity_units())),
            Some((3, 4))
        );
    }

    #[test]
    fn test_provisioned_gsis_carry_capacity() {
        let description = fixtures::table_builder("DEV-orders")
            .provisioned_throughput(fixtures::throughput(10, 5))
            .global_secondary_indexes(fixtures::gsi("by-customer", Some((2, 3))))
            .global_secondary_indexes(fixtures::gsi("by-status", Some((4, 1))))
            .build();

        let request = translate(&description, "PROD-orders").unwrap();

        assert_eq!(request.global_secondary_indexes.len(), 2);
        for (gsi, source) in request
            .global_secondary_indexes
            .iter()
            .zip(description.global_secondary_indexes())
        {
            assert_eq!(Some(gsi.index_name()), source.index_name());
            assert_eq!(gsi.key_schema(), source.key_schema());
            assert_eq!(gsi.projection(), source.projection());
            assert!(gsi.provisioned_throughput().is_some());
        }
        let capacity = |i: usize| {
            request.global_secondary_indexes[i]
                .provisioned_throughput()
                .map(|t| (t.read_capacity_units(), t.write_capacity_units()))
        };
        assert_eq!(capacity(0), Some((2, 3)));
        assert_eq!(capacity(1), Some((4, 1)));
    }

    #[test]
    fn test_on_demand_gsis_have_no_capacity() {
        let description = fixtures::table_builder("DEV-orders")
            .billing_mode_summary(
                BillingModeSummary::builder()
                    .billing_mode(BillingMode::PayPerRequest)
                    .build(),
            )
            .global_secondary_indexes(fixtures::gsi("by-customer", None))
            .build();

        let request = translate(&description, "PROD-orders").unwrap();

        assert_eq!(request.global_secondary_indexes.len(), 1);
        let gsi = &request.global_secondary_indexes[0];
        assert_eq!(gsi.index_name(), "by-customer");
        assert!(gsi.provisioned_throughput().is_none());
        assert_eq!(
            gsi.projection().and_then(|p| p.projection_type()),
            Some(&ProjectionType::All)
        );
    }

    #[test]
    fn test_provisioned_gsi_without_capacity_is_invalid() {
        let description = fixtures::table_builder("DEV-orders")
            .provisioned_throughput(fixtures::throughput(1, 1))
            .global_secondary_indexes(fixtures::gsi("by-customer", None))
            .build();

        let err = translate(&description, "PROD-orders").unwrap_err();
        assert!(err.to_string().contains("by-customer"));
    }

    #[test]
    fn test_provisioned_without_capacity_is_invalid() {
        let description = fixtures::table_builder("DEV-broken").build();

        let err = translate(&description, "PROD-broken").unwrap_err();
        assert!(matches!(
            err,
            MigrateError::InvalidSchema { ref table_name, .. } if table_name == "DEV-broken"
        ));
    }
}
