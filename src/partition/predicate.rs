//! Key ranges and their row predicates

use crate::query::{FromNode, SelectNode, SelectQuerySpec, WhereClauseNode};
use crate::stream::{Field, Stream};
use crate::types::JsonValue;

/// Predicate selecting the rows strictly after `lower` (or from `lower` on,
/// when `lower_inclusive`) and up to and including `upper`, in
/// lexicographic order over `columns`.
///
/// Each bound becomes a disjunction with one term per column:
/// `c1 > l1 OR (c1 = l1 AND c2 > l2) OR ...`. Bounds shorter than `columns`
/// only constrain the leading columns. Returns `None` when nothing is
/// constrained.
pub fn bound_predicate(
    columns: &[Field],
    lower: Option<&[JsonValue]>,
    upper: Option<&[JsonValue]>,
    lower_inclusive: bool,
) -> Option<WhereClauseNode> {
    if columns.is_empty() {
        return None;
    }

    let lower_terms = lower
        .map(|bound| {
            disjunction(columns, bound, |field, value, last| {
                if last && lower_inclusive {
                    WhereClauseNode::GreaterOrEqual(field, value)
                } else {
                    WhereClauseNode::Greater(field, value)
                }
            })
        })
        .unwrap_or_default();

    let upper_terms = upper
        .map(|bound| {
            disjunction(columns, bound, |field, value, last| {
                if last {
                    WhereClauseNode::LesserOrEqual(field, value)
                } else {
                    WhereClauseNode::Lesser(field, value)
                }
            })
        })
        .unwrap_or_default();

    WhereClauseNode::And(vec![
        WhereClauseNode::Or(lower_terms),
        WhereClauseNode::Or(upper_terms),
    ])
    .optimize()
}

fn disjunction(
    columns: &[Field],
    bound: &[JsonValue],
    last_leaf: impl Fn(Field, JsonValue, bool) -> WhereClauseNode,
) -> Vec<WhereClauseNode> {
    let zipped: Vec<(&Field, &JsonValue)> = columns.iter().zip(bound).collect();
    let n = zipped.len();
    (0..n)
        .map(|idx| {
            let mut terms: Vec<WhereClauseNode> = zipped[..idx]
                .iter()
                .map(|(f, v)| WhereClauseNode::Equal((*f).clone(), (*v).clone()))
                .collect();
            let (f, v) = zipped[idx];
            terms.push(last_leaf(f.clone(), v.clone(), idx == n - 1));
            WhereClauseNode::And(terms)
        })
        .collect()
}

/// A range over ordered checkpoint columns.
///
/// `lower` is exclusive unless `lower_inclusive`, `upper` is inclusive,
/// and a missing bound is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    pub columns: Vec<Field>,
    pub lower: Option<Vec<JsonValue>>,
    pub upper: Option<Vec<JsonValue>>,
    pub lower_inclusive: bool,
}

impl KeyRange {
    /// Row predicate for this range
    pub fn predicate(&self) -> Option<WhereClauseNode> {
        bound_predicate(
            &self.columns,
            self.lower.as_deref(),
            self.upper.as_deref(),
            self.lower_inclusive,
        )
    }

    /// Every row of the range, unordered
    pub fn non_resumable_query_spec(&self, stream: &Stream) -> SelectQuerySpec {
        SelectQuerySpec::new(SelectNode::Columns(stream.fields.clone()), table(stream))
            .with_where(self.predicate())
    }

    /// The first `limit` rows of the range in checkpoint order
    pub fn resumable_query_spec(&self, stream: &Stream, limit: u64) -> SelectQuerySpec {
        SelectQuerySpec::new(SelectNode::Columns(self.selected(stream)), table(stream))
            .with_where(self.predicate())
            .with_order_by(self.columns.clone())
            .with_limit(limit)
    }

    /// Up to `sample_size` rows of a Bernoulli sample of the range, in
    /// checkpoint order
    pub fn sampling_query_spec(
        &self,
        stream: &Stream,
        sample_rate_inv_pow2: u32,
        sample_size: u64,
    ) -> SelectQuerySpec {
        let from = FromNode::Sample {
            name: stream.name.clone(),
            namespace: stream.namespace.clone(),
            sample_rate_inv_pow2,
            sample_size,
        };
        SelectQuerySpec::new(SelectNode::Columns(self.selected(stream)), from)
            .with_where(self.predicate())
            .with_order_by(self.columns.clone())
            .with_limit(sample_size)
    }

    fn selected(&self, stream: &Stream) -> Vec<Field> {
        let mut columns = stream.fields.clone();
        columns.extend(self.columns.iter().cloned());
        columns
    }
}

/// The stream's table
pub(crate) fn table(stream: &Stream) -> FromNode {
    FromNode::Table {
        name: stream.name.clone(),
        namespace: stream.namespace.clone(),
    }
}
