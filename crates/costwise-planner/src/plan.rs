//! Plan-shape descriptors: the parts of a physical plan the estimator reads.
//!
//! These are deliberately thin. The optimizer owns the real plan nodes; here we
//! only keep which index and comparands a scan uses, which tables of a group
//! a join tree covers, and how many predicate tests a select performs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use costwise_core::error::{Error, Result};
use costwise_core::id::{GroupId, IndexId, TableId};
use costwise_core::schema::{ColumnRef, Schema};

/// Tables whose columns the query needs, by id.
pub type RequiredTables = BTreeSet<TableId>;

/// Comparand and operand expressions, as far as costing cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    /// Exact integer literal, e.g. a z-order cell bound.
    Integer(i64),
    Text(String),
    Null,
    /// Bound at execution time.
    Parameter(u32),
    Column(ColumnRef),
    Cast(Box<Expr>),
    Function { name: String, operands: Vec<Expr> },
}

impl Expr {
    pub fn number(v: impl Into<f64>) -> Self {
        Expr::Number(v.into())
    }

    pub fn function(name: impl Into<String>, operands: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            operands,
        }
    }

    /// Numeric value of a literal, looking through casts.
    pub fn numeric_constant(&self) -> Option<f64> {
        let mut expr = self;
        while let Expr::Cast(inner) = expr {
            expr = inner;
        }
        match expr {
            Expr::Number(v) => Some(*v),
            Expr::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn integer_constant(&self) -> Option<i64> {
        let mut expr = self;
        while let Expr::Cast(inner) = expr {
            expr = inner;
        }
        match expr {
            Expr::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Integer(v) => write!(f, "{v}"),
            Expr::Text(s) => write!(f, "'{s}'"),
            Expr::Null => write!(f, "NULL"),
            Expr::Parameter(n) => write!(f, "${n}"),
            Expr::Column(c) => write!(f, "{}#{}", c.table, c.position),
            Expr::Cast(inner) => write!(f, "CAST({inner})"),
            Expr::Function { name, operands } => {
                write!(f, "{name}(")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: Expr,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: Expr) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: Expr) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

/// One disjunct of a range condition (`a < x OR x > b` has two).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSegment {
    pub start: Option<Bound>,
    pub end: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleIndexScan {
    pub index: IndexId,
    /// Values for a prefix of the index columns.
    pub equality: Vec<Expr>,
    /// Range on the column after the equality prefix.
    pub low: Option<Bound>,
    pub high: Option<Bound>,
    /// A union of ranges instead of `low`/`high`.
    pub condition_range: Option<Vec<RangeSegment>>,
}

impl SingleIndexScan {
    /// Unrestricted scan, used for ordering only.
    pub fn full(index: IndexId) -> Self {
        Self {
            index,
            equality: Vec::new(),
            low: None,
            high: None,
            condition_range: None,
        }
    }

    pub fn with_equality(mut self, equality: Vec<Expr>) -> Self {
        self.equality = equality;
        self
    }

    pub fn with_range(mut self, low: Option<Bound>, high: Option<Bound>) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    pub fn with_condition_range(mut self, segments: Vec<RangeSegment>) -> Self {
        self.condition_range = Some(segments);
        self
    }
}

/// Left-deep intersection of index scans over the same rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiIndexIntersectScan {
    pub output: Box<IndexScan>,
    pub selector: Box<IndexScan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexScan {
    Single(SingleIndexScan),
    Intersection(MultiIndexIntersectScan),
    /// Z-order scan driven by a spatial function; costed by its own estimator.
    Spatial(SingleIndexScan),
}

impl IndexScan {
    pub fn intersect(output: IndexScan, selector: IndexScan) -> Self {
        IndexScan::Intersection(MultiIndexIntersectScan {
            output: Box::new(output),
            selector: Box::new(selector),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            IndexScan::Single(s) => format!("single scan of {}", s.index),
            IndexScan::Intersection(m) => {
                format!("intersect({}, {})", m.output.describe(), m.selector.describe())
            }
            IndexScan::Spatial(s) => format!("spatial scan of {}", s.index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScan {
    pub group: GroupId,
}

/// Nested loop inside one group: for each `outside` row, look up `inside`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLoopScan {
    pub outside: TableId,
    pub inside: TableId,
    pub inside_is_parent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextScan {
    /// Declared result limit of the full-text query; zero for none.
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Comparison {
        left: Expr,
        right: Expr,
    },
    InList {
        operand: Expr,
        values: Vec<Expr>,
    },
    Other(Expr),
}

impl Condition {
    /// Predicate tests evaluated per row.
    pub fn test_count(&self) -> usize {
        match self {
            Condition::InList { values, .. } => values.len(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JoinNode {
    table: TableId,
    parent: Option<usize>,
}

/// The tables of one group that take part in a join, as a tree.
///
/// Nodes are kept in storage order, which is a preorder walk: a node's parent
/// always comes before it and its descendants follow it contiguously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGroupJoinTree {
    group: GroupId,
    nodes: Vec<JoinNode>,
}

impl TableGroupJoinTree {
    /// Every table of the group.
    pub fn for_group(schema: &Schema, group: GroupId) -> Result<Self> {
        let tables: Vec<TableId> = schema.group_tables(group).map(|t| t.id).collect();
        Self::new(schema, &tables)
    }

    /// The given tables, which must be from one group and share a single
    /// top-most table. A table's parent in the tree is its nearest ancestor
    /// that is also in the set.
    pub fn new(schema: &Schema, tables: &[TableId]) -> Result<Self> {
        let mut members = Vec::with_capacity(tables.len());
        for id in tables {
            members.push(schema.table(*id)?);
        }
        members.sort_by_key(|t| t.ordinal);
        members.dedup_by_key(|t| t.id);
        let first = members
            .first()
            .ok_or_else(|| Error::Catalog("join tree needs at least one table".into()))?;
        let group = first.group;

        let mut nodes: Vec<JoinNode> = Vec::with_capacity(members.len());
        for (i, table) in members.iter().enumerate() {
            if table.group != group {
                return Err(Error::Catalog(format!(
                    "table {} is not in the group of {}",
                    table.name, first.name
                )));
            }
            let mut parent = None;
            let mut cur = schema.parent(table);
            while let Some(anc) = cur {
                if let Some(pos) = nodes.iter().position(|n| n.table == anc.id) {
                    parent = Some(pos);
                    break;
                }
                cur = schema.parent(anc);
            }
            if parent.is_none() && i > 0 {
                return Err(Error::Catalog(format!(
                    "table {} is not below {} in the join tree",
                    table.name, first.name
                )));
            }
            nodes.push(JoinNode {
                table: table.id,
                parent,
            });
        }
        Ok(Self { group, nodes })
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn table(&self, node: usize) -> TableId {
        self.nodes[node].table
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    pub fn find(&self, table: TableId) -> Option<usize> {
        self.nodes.iter().position(|n| n.table == table)
    }

    pub fn contains(&self, table: TableId) -> bool {
        self.find(table).is_some()
    }

    /// Node positions in preorder.
    pub fn nodes(&self) -> std::ops::Range<usize> {
        0..self.nodes.len()
    }

    pub fn tables(&self) -> impl Iterator<Item = TableId> + '_ {
        self.nodes.iter().map(|n| n.table)
    }

    /// Strict descendants of `node`.
    pub fn descendants(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (node + 1..self.nodes.len())
            .take_while(move |&d| self.is_ancestor_of(node, d))
    }

    fn is_ancestor_of(&self, ancestor: usize, mut node: usize) -> bool {
        while let Some(p) = self.nodes[node].parent {
            if p == ancestor {
                return true;
            }
            node = p;
        }
        false
    }
}
