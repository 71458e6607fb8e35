//! YAML catalog fixtures: tables with row counts, indexes, and optional
//! estimator overrides.
//!
//! Example:
//! ```yaml
//! tables:
//!   - name: customers
//!     columns:
//!       - { name: cid, type: int }
//!       - { name: name, type: varchar(32), average_size: 12 }
//!     primary_key: [cid]
//!     row_count: 10
//!   - name: orders
//!     parent: customers
//!     columns: [ { name: oid, type: int }, { name: cid, type: int } ]
//!     primary_key: [oid]
//!     row_count: 100
//! indexes:
//!   - { name: customer_name, table: customers, columns: [name] }
//!   - { name: name_oid, group: true, columns: [customers.name, orders.oid] }
//! config:
//!   insertion_sort_max_limit: 50
//! ```

use serde::{Deserialize, Serialize};

use costwise_core::config::EstimatorConfig;
use costwise_core::error::{Error, Result};
use costwise_core::oracle::StaticRowCounts;
use costwise_core::schema::{Column, DataType, Schema, SchemaBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub config: Option<EstimatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Unanalyzed tables report one row.
    #[serde(default)]
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub average_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Owning table of a table index.
    #[serde(default)]
    pub table: Option<String>,
    /// Group index; columns are `table.column`.
    #[serde(default)]
    pub group: bool,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub spatial: bool,
}

/// Everything needed to stand up a cost model for tests and benchmarks.
#[derive(Debug, Clone)]
pub struct CatalogFixture {
    pub schema: Schema,
    pub row_counts: StaticRowCounts,
    pub config: EstimatorConfig,
}

fn to_column(def: &ColumnDef) -> Result<Column> {
    let data_type: DataType = def.data_type.parse()?;
    let column = Column::new(&def.name, data_type);
    Ok(match def.average_size {
        Some(size) => column.with_average_storage_size(size),
        None => column,
    })
}

fn split_column(qualified: &str) -> Result<(&str, &str)> {
    qualified.split_once('.')
        .ok_or_else(|| Error::Config(format!("group index column '{qualified}' must be table.column")))
}

fn add_index(builder: &mut SchemaBuilder, def: &IndexDef) -> Result<()> {
    match (&def.table, def.group) {
        (Some(table), false) => {
            let cols: Vec<&str> = def.columns.iter().map(String::as_str).collect();
            if def.spatial {
                builder.spatial_index(table, &def.name, &cols);
            } else {
                builder.table_index(table, &def.name, &cols, def.unique);
            }
        }
        (None, true) => {
            if def.spatial {
                return Err(Error::Config(format!(
                    "group index '{}' cannot be spatial",
                    def.name
                )));
            }
            let cols = def
                .columns
                .iter()
                .map(|c| split_column(c))
                .collect::<Result<Vec<_>>>()?;
            builder.group_index(&def.name, &cols, def.unique);
        }
        _ => {
            return Err(Error::Config(format!(
                "index '{}' needs either a table or group: true",
                def.name
            )))
        }
    }
    Ok(())
}

/// Parse a YAML catalog into a schema, its row counts, and estimator config.
pub fn parse_yaml_catalog(yaml_src: &str) -> Result<CatalogFixture> {
    let doc: Catalog =
        serde_yaml::from_str(yaml_src).map_err(|e| Error::Config(e.to_string()))?;

    let mut builder = SchemaBuilder::new();
    for table in &doc.tables {
        let columns = table.columns.iter().map(to_column).collect::<Result<Vec<_>>>()?;
        let pk: Vec<&str> = table.primary_key.iter().map(String::as_str).collect();
        builder.table(&table.name, table.parent.as_deref(), columns, &pk);
    }
    for index in &doc.indexes {
        add_index(&mut builder, index)?;
    }
    let schema = builder.build()?;

    let mut row_counts = StaticRowCounts::new();
    for def in &doc.tables {
        if let (Some(count), Some(table)) = (def.row_count, schema.table_named(&def.name)) {
            row_counts.set(table.id, count);
        }
    }

    let config = doc.config.unwrap_or_default();
    config.validate()?;
    Ok(CatalogFixture {
        schema,
        row_counts,
        config,
    })
}
