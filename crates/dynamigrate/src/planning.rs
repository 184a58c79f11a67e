//! Pure functions for describing a migration before it runs (Functional Core).

use aws_sdk_dynamodb::types::{AttributeDefinition, KeySchemaElement, KeyType};

use crate::config::MigrationConfig;
use crate::schema::CreateTableRequest;

/// One source → destination pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTable {
    pub source: String,
    pub destination: String,
}

impl PlannedTable {
    pub fn is_renamed(&self) -> bool {
        self.source != self.destination
    }
}

/// Pure function: the tables a run will touch, in order.
pub fn calculate_plan(config: &MigrationConfig) -> Vec<PlannedTable> {
    config
        .tables
        .iter()
        .map(|table| PlannedTable {
            source: table.clone(),
            destination: config.destination_name(table),
        })
        .collect()
}

/// Pure function: Format a migration plan for display.
pub fn format_plan(plan: &[PlannedTable]) -> Vec<String> {
    plan.iter()
        .map(|table| {
            if table.is_renamed() {
                format!("+ Copy table: {} → {}", table.source, table.destination)
            } else {
                format!("~ Copy table: {} (name unchanged)", table.source)
            }
        })
        .collect()
}

/// Pure function: Format a create-table request for display.
pub fn format_create_request(request: &CreateTableRequest) -> Vec<String> {
    let mut lines = vec![format!("+ Create table: {}", request.table_name)];
    lines.extend(format_keys(
        &request.key_schema,
        &request.attribute_definitions,
        "  ",
    ));

    match &request.provisioned_throughput {
        Some(throughput) => lines.push(format!(
            "  Billing: {} ({} RCU / {} WCU)",
            request.billing_mode.as_str(),
            throughput.read_capacity_units(),
            throughput.write_capacity_units()
        )),
        None => lines.push(format!("  Billing: {}", request.billing_mode.as_str())),
    }

    for gsi in &request.global_secondary_indexes {
        lines.push(format!("  + GSI: {}", gsi.index_name()));
        lines.extend(format_keys(
            gsi.key_schema(),
            &request.attribute_definitions,
            "    ",
        ));
        if let Some(projection) = gsi.projection().and_then(|p| p.projection_type()) {
            lines.push(format!("    Projection: {}", projection.as_str()));
        }
        if let Some(throughput) = gsi.provisioned_throughput() {
            lines.push(format!(
                "    Capacity: {} RCU / {} WCU",
                throughput.read_capacity_units(),
                throughput.write_capacity_units()
            ));
        }
    }

    lines
}

fn format_keys(
    key_schema: &[KeySchemaElement],
    attributes: &[AttributeDefinition],
    indent: &str,
) -> Vec<String> {
    key_schema
        .iter()
        .map(|key| {
            let role = match key.key_type() {
                KeyType::Hash => "Partition key",
                KeyType::Range => "Sort key",
                other => other.as_str(),
            };
            let attribute_type = attributes
                .iter()
                .find(|a| a.attribute_name() == key.attribute_name())
                .map(|a| a.attribute_type().as_str())
                .unwrap_or("?");
            format!(
                "{indent}{role}: {} ({attribute_type})",
                key.attribute_name()
            )
        })
        .collect()
}
