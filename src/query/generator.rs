//! SQL generation from query specs

use super::types::{Binding, FromNode, SelectNode, SelectQuery, SelectQuerySpec, WhereClauseNode};
use crate::stream::Field;
use crate::types::JsonValue;
use std::fmt::Debug;

/// Turns an abstract query description into an executable query
pub trait SelectQueryGenerator: Send + Sync + Debug {
    /// Generate the query for an (optimized) spec
    fn generate(&self, spec: &SelectQuerySpec) -> SelectQuery;
}

/// ANSI SQL generator with DuckDB sampling syntax
///
/// Tables attached to DuckDB through an extension live under a catalog
/// (`source_db`), native tables do not.
#[derive(Debug, Clone, Default)]
pub struct AnsiQueryGenerator {
    catalog: Option<String>,
}

impl AnsiQueryGenerator {
    /// Generator for native (unqualified) tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator qualifying every table with a catalog name
    pub fn with_catalog(catalog: impl Into<String>) -> Self {
        Self {
            catalog: Some(catalog.into()),
        }
    }

    fn table(&self, name: &str, namespace: Option<&str>) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = &self.catalog {
            parts.push(quote(catalog));
        }
        if let Some(ns) = namespace {
            parts.push(quote(ns));
        }
        parts.push(quote(name));
        parts.join(".")
    }

    fn from_clause(&self, from: &FromNode) -> String {
        match from {
            FromNode::Table { name, namespace } => self.table(name, namespace.as_deref()),
            FromNode::Sample {
                name,
                namespace,
                sample_rate_inv_pow2,
                ..
            } => {
                let table = self.table(name, namespace.as_deref());
                if *sample_rate_inv_pow2 == 0 {
                    table
                } else {
                    let percent = 100.0 / f64::from(1u32 << (*sample_rate_inv_pow2).min(31));
                    format!(
                        "(SELECT * FROM {table} USING SAMPLE {percent} PERCENT (bernoulli)) AS \"sampled\""
                    )
                }
            }
        }
    }

    fn where_clause(node: &WhereClauseNode, bindings: &mut Vec<Binding>) -> String {
        match node {
            WhereClauseNode::Equal(f, v) => Self::leaf(f, "=", v, bindings),
            WhereClauseNode::Greater(f, v) => Self::leaf(f, ">", v, bindings),
            WhereClauseNode::GreaterOrEqual(f, v) => Self::leaf(f, ">=", v, bindings),
            WhereClauseNode::Lesser(f, v) => Self::leaf(f, "<", v, bindings),
            WhereClauseNode::LesserOrEqual(f, v) => Self::leaf(f, "<=", v, bindings),
            WhereClauseNode::And(children) => Self::join(children, " AND ", bindings),
            WhereClauseNode::Or(children) => Self::join(children, " OR ", bindings),
        }
    }

    fn leaf(field: &Field, op: &str, value: &JsonValue, bindings: &mut Vec<Binding>) -> String {
        bindings.push(Binding {
            value: value.clone(),
            field_type: field.field_type,
        });
        let placeholder = match field.field_type.cast_type() {
            Some(cast) => format!("CAST(? AS {cast})"),
            None => "?".to_string(),
        };
        format!("{} {op} {placeholder}", quote(&field.id))
    }

    fn join(children: &[WhereClauseNode], separator: &str, bindings: &mut Vec<Binding>) -> String {
        let parts: Vec<String> = children
            .iter()
            .map(|child| Self::where_clause(child, bindings))
            .collect();
        format!("({})", parts.join(separator))
    }
}

impl SelectQueryGenerator for AnsiQueryGenerator {
    fn generate(&self, spec: &SelectQuerySpec) -> SelectQuery {
        let mut bindings = Vec::new();

        let select_list = match &spec.select {
            SelectNode::Columns(columns) => columns
                .iter()
                .map(|c| quote(&c.id))
                .collect::<Vec<_>>()
                .join(", "),
            SelectNode::MaxValue(column) => {
                format!("MAX({id}) AS {id}", id = quote(&column.id))
            }
        };

        let mut sql = format!("SELECT {select_list} FROM {}", self.from_clause(&spec.from));

        if let Some(node) = &spec.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&Self::where_clause(node, &mut bindings));
        }

        if !spec.order_by.is_empty() {
            let order: Vec<String> = spec.order_by.iter().map(|c| quote(&c.id)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = spec.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        SelectQuery {
            sql,
            columns: spec.select.columns(),
            bindings,
        }
    }
}

/// Quote an identifier, doubling embedded quotes
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
