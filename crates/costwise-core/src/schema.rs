//! Catalog model: groups of parent/child tables, their columns, and indexes.
//!
//! This is the slice of the schema the estimator consumes. It is immutable once
//! built; `SchemaBuilder` assigns ids, storage ordinals, and row-type ids in
//! `build()` so nothing downstream ever sees a half-populated catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{GroupId, IndexId, RowTypeId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Date,
    Time,
    DateTime,
    Timestamp,
    Year,
    Guid,
    Char(u32),
    Varchar(u32),
    Binary(u32),
    Varbinary(u32),
    Text,
    Blob,
}

impl DataType {
    /// Serialized size for types whose encoding never varies.
    pub fn fixed_size(&self) -> Option<u32> {
        use DataType::*;
        match self {
            Boolean | TinyInt | Year => Some(1),
            SmallInt => Some(2),
            MediumInt | Date | Time => Some(3),
            Int | Float | Timestamp => Some(4),
            BigInt | Double | DateTime => Some(8),
            Guid => Some(16),
            Decimal { .. } | Char(_) | Varchar(_) | Binary(_) | Varbinary(_) | Text | Blob => None,
        }
    }

    /// The integer family whose calibrated width is pinned regardless of
    /// declared size.
    pub fn is_legacy_numeric(&self) -> bool {
        matches!(
            self,
            DataType::TinyInt
                | DataType::SmallInt
                | DataType::MediumInt
                | DataType::Int
                | DataType::BigInt
        )
    }

    /// Character and binary strings.
    pub fn is_variable_length(&self) -> bool {
        matches!(
            self,
            DataType::Char(_)
                | DataType::Varchar(_)
                | DataType::Binary(_)
                | DataType::Varbinary(_)
                | DataType::Text
                | DataType::Blob
        )
    }

    /// Blob-like strings with no useful declared length.
    pub fn is_unbounded(&self) -> bool {
        matches!(self, DataType::Text | DataType::Blob)
    }

    /// Average storage size the catalog reports when the column does not
    /// override it.
    pub fn default_average_storage_size(&self) -> u32 {
        use DataType::*;
        if let Some(n) = self.fixed_size() {
            return n;
        }
        match self {
            Decimal { precision, .. } => u32::from(*precision) / 2 + 1,
            Char(n) | Binary(n) => *n,
            Varchar(n) | Varbinary(n) => n + if *n < 256 { 1 } else { 2 },
            Text | Blob => 65_535 + 2,
            _ => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DataType::*;
        match self {
            Boolean => write!(f, "boolean"),
            TinyInt => write!(f, "tinyint"),
            SmallInt => write!(f, "smallint"),
            MediumInt => write!(f, "mediumint"),
            Int => write!(f, "int"),
            BigInt => write!(f, "bigint"),
            Float => write!(f, "float"),
            Double => write!(f, "double"),
            Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Date => write!(f, "date"),
            Time => write!(f, "time"),
            DateTime => write!(f, "datetime"),
            Timestamp => write!(f, "timestamp"),
            Year => write!(f, "year"),
            Guid => write!(f, "guid"),
            Char(n) => write!(f, "char({n})"),
            Varchar(n) => write!(f, "varchar({n})"),
            Binary(n) => write!(f, "binary({n})"),
            Varbinary(n) => write!(f, "varbinary({n})"),
            Text => write!(f, "text"),
            Blob => write!(f, "blob"),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    /// Parses DDL-ish type names: `int`, `varchar(32)`, `decimal(10,2)`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (name, args) = match s.find('(') {
            Some(open) => {
                let close = s
                    .rfind(')')
                    .ok_or_else(|| Error::Catalog(format!("unbalanced type '{s}'")))?;
                (s[..open].trim(), Some(&s[open + 1..close]))
            }
            None => (s.as_str(), None),
        };
        let params: Vec<u32> = match args {
            Some(a) => a
                .split(',')
                .map(|p| {
                    p.trim()
                        .parse::<u32>()
                        .map_err(|_| Error::Catalog(format!("bad type parameter in '{s}'")))
                })
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };
        let len = |default: u32| params.first().copied().unwrap_or(default);
        let dt = match name {
            "boolean" | "bool" => DataType::Boolean,
            "tinyint" => DataType::TinyInt,
            "smallint" => DataType::SmallInt,
            "mediumint" => DataType::MediumInt,
            "int" | "integer" => DataType::Int,
            "bigint" => DataType::BigInt,
            "float" | "real" => DataType::Float,
            "double" => DataType::Double,
            "decimal" | "numeric" => DataType::Decimal {
                precision: u8::try_from(len(10))
                    .map_err(|_| Error::Catalog(format!("precision too large in '{s}'")))?,
                scale: u8::try_from(params.get(1).copied().unwrap_or(0))
                    .map_err(|_| Error::Catalog(format!("scale too large in '{s}'")))?,
            },
            "date" => DataType::Date,
            "time" => DataType::Time,
            "datetime" => DataType::DateTime,
            "timestamp" => DataType::Timestamp,
            "year" => DataType::Year,
            "guid" | "uuid" => DataType::Guid,
            "char" => DataType::Char(len(1)),
            "varchar" => DataType::Varchar(len(255)),
            "binary" => DataType::Binary(len(1)),
            "varbinary" => DataType::Varbinary(len(255)),
            "text" => DataType::Text,
            "blob" => DataType::Blob,
            other => return Err(Error::Catalog(format!("unknown type '{other}'"))),
        };
        Ok(dt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub average_storage_size: u32,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            average_storage_size: data_type.default_average_storage_size(),
        }
    }

    pub fn with_average_storage_size(mut self, size: u32) -> Self {
        self.average_storage_size = size;
        self
    }
}

/// A column of some table, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: TableId,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub group: GroupId,
    pub parent: Option<TableId>,
    /// Storage order: depth-first within the group, parents before children.
    pub ordinal: u32,
    pub depth: u32,
    pub columns: Vec<Column>,
    /// Positions of the primary key columns.
    pub primary_key: Vec<usize>,
    pub row_type: RowTypeId,
}

impl Table {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.primary_key.iter().filter_map(|&p| self.columns.get(p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub root: TableId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Columns all come from one table.
    Table { table: TableId },
    /// Columns span a branch of the group; cardinality follows the leaf-most table.
    Group {
        group: GroupId,
        root_most: TableId,
        leaf_most: TableId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub id: IndexId,
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<ColumnRef>,
    pub unique: bool,
    /// Lat/lon columns are stored as one z-value key column.
    pub spatial: bool,
    pub row_type: RowTypeId,
}

impl Index {
    /// The table whose row count determines the index's cardinality.
    pub fn leaf_most_table(&self) -> TableId {
        match self.kind {
            IndexKind::Table { table } => table,
            IndexKind::Group { leaf_most, .. } => leaf_most,
        }
    }

    pub fn is_group_index(&self) -> bool {
        matches!(self.kind, IndexKind::Group { .. })
    }
}

/// Fully built catalog. Ids index directly into the backing vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    groups: Vec<Group>,
    tables: Vec<Table>,
    indexes: Vec<Index>,
}

impl Schema {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn group(&self, id: GroupId) -> Result<&Group> {
        self.groups
            .get(id.index())
            .ok_or_else(|| Error::Catalog(format!("unknown group {id}")))
    }

    pub fn table(&self, id: TableId) -> Result<&Table> {
        self.tables
            .get(id.index())
            .ok_or_else(|| Error::Catalog(format!("unknown table {id}")))
    }

    pub fn index(&self, id: IndexId) -> Result<&Index> {
        self.indexes
            .get(id.index())
            .ok_or_else(|| Error::Catalog(format!("unknown index {id}")))
    }

    pub fn table_named(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn index_named(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn column(&self, column: ColumnRef) -> Result<&Column> {
        let table = self.table(column.table)?;
        table.columns.get(column.position).ok_or_else(|| {
            Error::Catalog(format!(
                "column {} out of range for table {}",
                column.position, table.name
            ))
        })
    }

    pub fn parent(&self, table: &Table) -> Option<&Table> {
        table.parent.and_then(|p| self.tables.get(p.index()))
    }

    pub fn children<'a>(&'a self, table: &'a Table) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables.iter().filter(move |t| t.parent == Some(table.id))
    }

    /// The table and all its descendants, in storage order.
    pub fn subtree<'a>(&'a self, root: &'a Table) -> Vec<&'a Table> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(t) = stack.pop() {
            out.push(t);
            let mut kids: Vec<&Table> = self.children(t).collect();
            kids.sort_by_key(|k| std::cmp::Reverse(k.ordinal));
            stack.extend(kids);
        }
        out
    }

    pub fn group_tables<'a>(&'a self, group: GroupId) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables.iter().filter(move |t| t.group == group)
    }

    /// Tables on the path from the group root down to `table`, root first.
    /// Each contributes one segment to the table's hkey.
    pub fn hkey_path<'a>(&'a self, table: &'a Table) -> Vec<&'a Table> {
        let mut path = vec![table];
        let mut cur = table;
        while let Some(parent) = self.parent(cur) {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Human-readable name for a row-type id, for diagnostics.
    pub fn row_type_name(&self, row_type: RowTypeId) -> String {
        if let Some(t) = self.tables.iter().find(|t| t.row_type == row_type) {
            return format!("table {}", t.name);
        }
        if let Some(i) = self.indexes.iter().find(|i| i.row_type == row_type) {
            return format!("index {}", i.name);
        }
        "unknown row type".to_string()
    }
}

#[derive(Debug, Clone)]
struct TableDef {
    name: String,
    parent: Option<String>,
    columns: Vec<Column>,
    primary_key: Vec<String>,
}

#[derive(Debug, Clone)]
enum IndexTarget {
    Table(String),
    Group,
}

#[derive(Debug, Clone)]
struct IndexDef {
    target: IndexTarget,
    name: String,
    columns: Vec<(String, String)>,
    unique: bool,
    spatial: bool,
}

/// Collects table and index definitions, then builds a consistent `Schema`.
///
/// Parents must be declared before their children.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
    indexes: Vec<IndexDef>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(
        &mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        columns: Vec<Column>,
        primary_key: &[&str],
    ) -> &mut Self {
        self.tables.push(TableDef {
            name: name.into(),
            parent: parent.map(str::to_string),
            columns,
            primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn table_index(
        &mut self,
        table: &str,
        name: impl Into<String>,
        columns: &[&str],
        unique: bool,
    ) -> &mut Self {
        self.indexes.push(IndexDef {
            target: IndexTarget::Table(table.to_string()),
            name: name.into(),
            columns: columns
                .iter()
                .map(|c| (table.to_string(), c.to_string()))
                .collect(),
            unique,
            spatial: false,
        });
        self
    }

    /// Index over `(lat, lon)` columns of one table, stored as z-values.
    pub fn spatial_index(
        &mut self,
        table: &str,
        name: impl Into<String>,
        columns: &[&str],
    ) -> &mut Self {
        self.table_index(table, name, columns, false);
        if let Some(last) = self.indexes.last_mut() {
            last.spatial = true;
        }
        self
    }

    /// Index over columns from several tables of one group, given as
    /// `(table, column)` pairs.
    pub fn group_index(
        &mut self,
        name: impl Into<String>,
        columns: &[(&str, &str)],
        unique: bool,
    ) -> &mut Self {
        self.indexes.push(IndexDef {
            target: IndexTarget::Group,
            name: name.into(),
            columns: columns
                .iter()
                .map(|(t, c)| (t.to_string(), c.to_string()))
                .collect(),
            unique,
            spatial: false,
        });
        self
    }

    pub fn build(&self) -> Result<Schema> {
        let mut tables: Vec<Table> = Vec::with_capacity(self.tables.len());
        let mut groups: Vec<Group> = Vec::new();

        for (i, def) in self.tables.iter().enumerate() {
            if tables.iter().any(|t| t.name == def.name) {
                return Err(Error::Catalog(format!("duplicate table '{}'", def.name)));
            }
            let id = TableId::new(i as u32);
            let (group, parent, depth) = match &def.parent {
                None => {
                    let gid = GroupId::new(groups.len() as u32);
                    groups.push(Group {
                        id: gid,
                        name: def.name.clone(),
                        root: id,
                    });
                    (gid, None, 0)
                }
                Some(pname) => {
                    let p = tables.iter().find(|t| &t.name == pname).ok_or_else(|| {
                        Error::Catalog(format!(
                            "parent '{}' of '{}' must be declared first",
                            pname, def.name
                        ))
                    })?;
                    (p.group, Some(p.id), p.depth + 1)
                }
            };
            let primary_key = def
                .primary_key
                .iter()
                .map(|k| {
                    def.columns.iter().position(|c| &c.name == k).ok_or_else(|| {
                        Error::Catalog(format!("unknown key column '{}.{}'", def.name, k))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            tables.push(Table {
                id,
                name: def.name.clone(),
                group,
                parent,
                ordinal: 0,
                depth,
                columns: def.columns.clone(),
                primary_key,
                row_type: RowTypeId::new(i as u32),
            });
        }

        let mut schema = Schema {
            groups,
            tables,
            indexes: Vec::new(),
        };
        assign_ordinals(&mut schema);

        let first_index_row_type = schema.tables.len() as u32;
        for (i, def) in self.indexes.iter().enumerate() {
            let index = build_index(
                &schema,
                def,
                IndexId::new(i as u32),
                RowTypeId::new(first_index_row_type + i as u32),
            )?;
            schema.indexes.push(index);
        }
        Ok(schema)
    }
}

fn assign_ordinals(schema: &mut Schema) {
    let mut order: Vec<TableId> = Vec::with_capacity(schema.tables.len());
    for group in &schema.groups {
        let root = &schema.tables[group.root.index()];
        order.extend(preorder_by_declaration(schema, root));
    }
    for (ordinal, id) in order.into_iter().enumerate() {
        schema.tables[id.index()].ordinal = ordinal as u32;
    }
}

// Siblings keep declaration order; ordinals are not assigned yet.
fn preorder_by_declaration(schema: &Schema, root: &Table) -> Vec<TableId> {
    let mut out = Vec::new();
    let mut stack = vec![root.id];
    while let Some(id) = stack.pop() {
        out.push(id);
        let kids: Vec<TableId> = schema
            .tables
            .iter()
            .filter(|t| t.parent == Some(id))
            .map(|t| t.id)
            .collect();
        stack.extend(kids.into_iter().rev());
    }
    out
}

fn build_index(schema: &Schema, def: &IndexDef, id: IndexId, row_type: RowTypeId) -> Result<Index> {
    if def.columns.is_empty() {
        return Err(Error::Catalog(format!("index '{}' has no columns", def.name)));
    }
    let mut columns = Vec::with_capacity(def.columns.len());
    for (tname, cname) in &def.columns {
        let table = schema
            .table_named(tname)
            .ok_or_else(|| Error::Catalog(format!("unknown table '{tname}' in index '{}'", def.name)))?;
        let position = table
            .columns
            .iter()
            .position(|c| &c.name == cname)
            .ok_or_else(|| Error::Catalog(format!("unknown column '{tname}.{cname}'")))?;
        columns.push(ColumnRef {
            table: table.id,
            position,
        });
    }
    let kind = match &def.target {
        IndexTarget::Table(tname) => {
            let table = schema
                .table_named(tname)
                .ok_or_else(|| Error::Catalog(format!("unknown table '{tname}'")))?;
            IndexKind::Table { table: table.id }
        }
        IndexTarget::Group => {
            let mut involved = Vec::with_capacity(columns.len());
            for c in &columns {
                involved.push(schema.table(c.table)?);
            }
            let group = involved[0].group;
            if involved.iter().any(|t| t.group != group) {
                return Err(Error::Catalog(format!(
                    "group index '{}' spans more than one group",
                    def.name
                )));
            }
            let root_most = involved
                .iter()
                .min_by_key(|t| t.depth)
                .map(|t| t.id)
                .unwrap_or(involved[0].id);
            let leaf_most = involved
                .iter()
                .max_by_key(|t| t.depth)
                .map(|t| t.id)
                .unwrap_or(involved[0].id);
            IndexKind::Group {
                group,
                root_most,
                leaf_most,
            }
        }
    };
    Ok(Index {
        id,
        name: def.name.clone(),
        kind,
        columns,
        unique: def.unique,
        spatial: def.spatial,
        row_type,
    })
}
