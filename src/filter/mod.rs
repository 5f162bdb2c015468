pub mod compile;
mod condition;
mod node;
pub mod pattern;
pub mod sort;
pub mod text;

pub use compile::{FilterCompiler, OperatorEvaluator, Predicate};
pub use condition::{Arity, Condition, Operand, Operator};
pub use node::FilterNode;
pub use sort::{NullOrdering, RowComparator, SortDirection, SortField, resolve_sort};
pub use text::{
    EncodedFilterParser, FilterParser, JsonFilterParser, ParsedQuery, parse_query_string,
};

use crate::core::{Result, Row, TableSchema};
use crate::entity::Entity;
use std::fmt;

/// Which rows an operation applies to.
///
/// The three forms are interchangeable: each lowers to a [`FilterNode`] and is
/// compiled by the same evaluators, so `Conditions(c)` and
/// `Tree(FilterNode::all(c))` select exactly the same rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Equality on every column of the row.
    Example(Row),
    /// Conditions ANDed in order.
    Conditions(Vec<Condition>),
    Tree(FilterNode),
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::Tree(FilterNode::default())
    }

    /// Equality on every column of `exemplar` that differs from `E::default()`.
    pub fn by_example<E: Entity>(exemplar: &E) -> Self {
        let zero = E::default().to_row();
        let row = exemplar
            .to_row()
            .into_iter()
            .filter(|(column, value)| zero.get(column) != Some(value))
            .collect();
        Self::Example(row)
    }

    pub fn to_node(&self) -> FilterNode {
        match self {
            Self::Example(row) => FilterNode::all(
                row.iter()
                    .map(|(column, value)| Condition::eq(column.clone(), value.clone())),
            ),
            Self::Conditions(conditions) => FilterNode::all(conditions.iter().cloned()),
            Self::Tree(node) => node.clone(),
        }
    }

    /// Validates against `schema` and builds the row predicate.
    pub fn compile(&self, schema: &TableSchema) -> Result<Predicate> {
        compile::compile(&self.to_node(), schema)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Vec<Condition>> for Filter {
    fn from(conditions: Vec<Condition>) -> Self {
        Self::Conditions(conditions)
    }
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Self::Conditions(vec![condition])
    }
}

impl From<FilterNode> for Filter {
    fn from(node: FilterNode) -> Self {
        Self::Tree(node)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_node())
    }
}
