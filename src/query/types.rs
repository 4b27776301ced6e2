//! Query description types

use crate::stream::Field;
use crate::types::{FieldType, JsonValue};

/// Abstract shape of a SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuerySpec {
    /// Select list
    pub select: SelectNode,
    /// Source relation
    pub from: FromNode,
    /// Row filter; `None` selects every row
    pub where_clause: Option<WhereClauseNode>,
    /// Ordering columns, ascending
    pub order_by: Vec<Field>,
    /// Row limit
    pub limit: Option<u64>,
}

impl SelectQuerySpec {
    /// Select columns from a relation, no filter, no ordering
    pub fn new(select: SelectNode, from: FromNode) -> Self {
        Self {
            select,
            from,
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Set the where clause
    #[must_use]
    pub fn with_where(mut self, where_clause: Option<WhereClauseNode>) -> Self {
        self.where_clause = where_clause;
        self
    }

    /// Set the ordering columns
    #[must_use]
    pub fn with_order_by(mut self, columns: Vec<Field>) -> Self {
        self.order_by = columns;
        self
    }

    /// Set the row limit
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Simplify the query: de-duplicate selected columns and flatten the
    /// where tree.
    #[must_use]
    pub fn optimize(self) -> Self {
        let select = match self.select {
            SelectNode::Columns(columns) => {
                let mut distinct: Vec<Field> = Vec::with_capacity(columns.len());
                for column in columns {
                    if !distinct.iter().any(|c| c.id == column.id) {
                        distinct.push(column);
                    }
                }
                SelectNode::Columns(distinct)
            }
            other => other,
        };
        Self {
            select,
            where_clause: self.where_clause.and_then(WhereClauseNode::optimize),
            ..self
        }
    }
}

/// Select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectNode {
    /// Plain column list
    Columns(Vec<Field>),
    /// `MAX(column)`, a single-row aggregate
    MaxValue(Field),
}

impl SelectNode {
    /// Columns of each result row, in order
    pub fn columns(&self) -> Vec<Field> {
        match self {
            Self::Columns(columns) => columns.clone(),
            Self::MaxValue(column) => vec![column.clone()],
        }
    }
}

/// Source relation
#[derive(Debug, Clone, PartialEq)]
pub enum FromNode {
    /// The whole table
    Table {
        name: String,
        namespace: Option<String>,
    },
    /// A Bernoulli sample of the table keeping about one row in
    /// `2^sample_rate_inv_pow2`
    Sample {
        name: String,
        namespace: Option<String>,
        sample_rate_inv_pow2: u32,
        sample_size: u64,
    },
}

/// Row filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClauseNode {
    And(Vec<WhereClauseNode>),
    Or(Vec<WhereClauseNode>),
    Equal(Field, JsonValue),
    Greater(Field, JsonValue),
    GreaterOrEqual(Field, JsonValue),
    Lesser(Field, JsonValue),
    LesserOrEqual(Field, JsonValue),
}

impl WhereClauseNode {
    /// Flatten nested conjunctions and disjunctions, unwrap single-child
    /// nodes, and drop empty ones.
    ///
    /// Returns `None` when nothing is left to filter on.
    pub fn optimize(self) -> Option<Self> {
        match self {
            Self::And(children) => Self::flatten(children, true),
            Self::Or(children) => Self::flatten(children, false),
            leaf => Some(leaf),
        }
    }

    fn flatten(children: Vec<Self>, conjunction: bool) -> Option<Self> {
        let mut flat = Vec::with_capacity(children.len());
        for child in children.into_iter().filter_map(Self::optimize) {
            match child {
                Self::And(grand) if conjunction => flat.extend(grand),
                Self::Or(grand) if !conjunction => flat.extend(grand),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ if conjunction => Some(Self::And(flat)),
            _ => Some(Self::Or(flat)),
        }
    }
}

/// A parameter value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The value, as read from a checkpoint or a row
    pub value: JsonValue,
    /// Type of the column it is compared against
    pub field_type: FieldType,
}

/// An executable query
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// SQL text with `?` placeholders
    pub sql: String,
    /// Columns of each result row, in order
    pub columns: Vec<Field>,
    /// Placeholder values, in order
    pub bindings: Vec<Binding>,
}
