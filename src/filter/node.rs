use super::Condition;
use std::fmt;

/// Boolean condition tree.
///
/// An `And` or `Or` with no children constrains nothing and matches every row.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf(Condition),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    /// Flat conjunction of the given conditions.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(conditions.into_iter().map(Self::Leaf).collect())
    }

    /// Flat disjunction of the given conditions.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(conditions.into_iter().map(Self::Leaf).collect())
    }

    pub fn negate(node: FilterNode) -> Self {
        Self::Not(Box::new(node))
    }

    pub fn is_unconstrained(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }
}

impl Default for FilterNode {
    fn default() -> Self {
        Self::And(Vec::new())
    }
}

impl From<Condition> for FilterNode {
    fn from(condition: Condition) -> Self {
        Self::Leaf(condition)
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(condition) => write!(f, "{}", condition),
            Self::And(children) => write_group(f, " AND ", children),
            Self::Or(children) => write_group(f, " OR ", children),
            Self::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, sep: &str, children: &[FilterNode]) -> fmt::Result {
    if children.is_empty() {
        return write!(f, "TRUE");
    }
    let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
    write!(f, "({})", parts.join(sep))
}
