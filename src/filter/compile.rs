//! Turns a [`FilterNode`] into a row predicate.
//!
//! Field names and operand shapes are checked against the table schema and
//! literals are coerced to the column type before any row is looked at, so a
//! malformed filter never reaches the store. Each operator family is handled by
//! an [`OperatorEvaluator`] plugin looked up in a [`FilterCompiler`].

use super::pattern::{TextMatch, check_like, eval_like, matches_ignore_case};
use super::{FilterNode, Operand, Operator};
use crate::core::{
    Column, DataType, RegistryError, Result, Row, TableSchema, Value, parse_date,
};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

pub type Predicate = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

lazy_static::lazy_static! {
    static ref DEFAULT_COMPILER: FilterCompiler = FilterCompiler::with_default_evaluators();
}

/// Compiles with the built-in operator evaluators.
pub fn compile(node: &FilterNode, schema: &TableSchema) -> Result<Predicate> {
    DEFAULT_COMPILER.compile(node, schema)
}

pub fn always() -> Predicate {
    Arc::new(|_| true)
}

/// Compiles one operator family into a predicate.
pub trait OperatorEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_evaluate(&self, op: Operator) -> bool;

    /// The operand shape has already been checked against `op`.
    fn compile(&self, column: &Column, op: Operator, operand: Operand) -> Result<Predicate>;
}

pub struct FilterCompiler {
    evaluators: Vec<Box<dyn OperatorEvaluator>>,
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    pub fn register(&mut self, evaluator: Box<dyn OperatorEvaluator>) {
        tracing::trace!(evaluator = evaluator.name(), "registered filter evaluator");
        self.evaluators.push(evaluator);
    }

    pub fn with_default_evaluators() -> Self {
        let mut compiler = Self::new();
        compiler.register(Box::new(ComparisonEvaluator));
        compiler.register(Box::new(MembershipEvaluator));
        compiler.register(Box::new(RangeEvaluator));
        compiler.register(Box::new(PatternEvaluator));
        compiler.register(Box::new(EmptinessEvaluator));
        compiler
    }

    fn find_evaluator(&self, op: Operator) -> Option<&dyn OperatorEvaluator> {
        self.evaluators
            .iter()
            .find(|ev| ev.can_evaluate(op))
            .map(|boxed| &**boxed)
    }

    pub fn compile(&self, node: &FilterNode, schema: &TableSchema) -> Result<Predicate> {
        match node {
            FilterNode::Leaf(condition) => {
                if condition.field.contains('.') {
                    return Err(RegistryError::Validation(format!(
                        "Nested field '{}' is not supported on '{}'",
                        condition.field,
                        schema.name()
                    )));
                }
                let column = schema.require_column(&condition.field)?;
                if condition.op.arity() != condition.operand.arity() {
                    return Err(RegistryError::Validation(format!(
                        "Operator '{}' on '{}' expects a {:?} operand, got {:?}",
                        condition.op,
                        condition.field,
                        condition.op.arity(),
                        condition.operand.arity()
                    )));
                }
                let evaluator = self.find_evaluator(condition.op).ok_or_else(|| {
                    RegistryError::Validation(format!(
                        "No evaluator for operator '{}'",
                        condition.op
                    ))
                })?;
                evaluator.compile(column, condition.op, condition.operand.clone())
            }
            FilterNode::And(children) => {
                let parts = self.compile_all(children, schema)?;
                if parts.is_empty() {
                    return Ok(always());
                }
                Ok(Arc::new(move |row| parts.iter().all(|p| p(row))))
            }
            FilterNode::Or(children) => {
                let parts = self.compile_all(children, schema)?;
                if parts.is_empty() {
                    return Ok(always());
                }
                Ok(Arc::new(move |row| parts.iter().any(|p| p(row))))
            }
            FilterNode::Not(inner) => {
                let inner = self.compile(inner, schema)?;
                Ok(Arc::new(move |row| !inner(row)))
            }
        }
    }

    fn compile_all(&self, nodes: &[FilterNode], schema: &TableSchema) -> Result<Vec<Predicate>> {
        nodes.iter().map(|n| self.compile(n, schema)).collect()
    }
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::with_default_evaluators()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `[start, end)` of the day named by a bare date literal on a timestamp column.
fn whole_day(column: &Column, literal: &Value) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if column.data_type != DataType::Timestamp {
        return None;
    }
    let text = literal.as_str()?;
    if DateTime::parse_from_rfc3339(text.trim()).is_ok() {
        return None;
    }
    let start = parse_date(text)?.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, start + Duration::days(1)))
}

fn coerce(column: &Column, value: Value) -> Result<Value> {
    column.data_type.coerce(value).map_err(|err| match err {
        RegistryError::Validation(msg) => {
            RegistryError::Validation(format!("Field '{}': {}", column.name, msg))
        }
        other => other,
    })
}

fn non_null(column: &Column, op: Operator, value: Value) -> Result<Value> {
    let value = coerce(column, value)?;
    if value.is_null() {
        return Err(RegistryError::Validation(format!(
            "Operator '{}' on '{}' needs a non-null value",
            op, column.name
        )));
    }
    Ok(value)
}

fn timestamp_at(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    row.value(column).as_timestamp()
}

// ============================================================================
// Evaluators
// ============================================================================

pub struct ComparisonEvaluator;

impl OperatorEvaluator for ComparisonEvaluator {
    fn name(&self) -> &'static str {
        "comparison"
    }

    fn can_evaluate(&self, op: Operator) -> bool {
        matches!(
            op,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    fn compile(&self, column: &Column, op: Operator, operand: Operand) -> Result<Predicate> {
        let Operand::Single(literal) = operand else {
            return Err(RegistryError::Validation(format!(
                "Operator '{}' expects a single value",
                op
            )));
        };
        let field = column.name.clone();

        if let Some((start, end)) = whole_day(column, &literal) {
            return Ok(Arc::new(move |row| match timestamp_at(row, &field) {
                Some(ts) => match op {
                    Operator::Eq => ts >= start && ts < end,
                    Operator::Ne => ts < start || ts >= end,
                    Operator::Lt => ts < start,
                    Operator::Le => ts < end,
                    Operator::Gt => ts >= end,
                    _ => ts >= start,
                },
                None => op == Operator::Ne,
            }));
        }

        let literal = coerce(column, literal)?;
        if literal.is_null() {
            return match op {
                Operator::Eq => Ok(Arc::new(move |row| row.value(&field).is_null())),
                Operator::Ne => Ok(Arc::new(move |row| !row.value(&field).is_null())),
                _ => Err(RegistryError::Validation(format!(
                    "Operator '{}' on '{}' cannot compare against NULL",
                    op, field
                ))),
            };
        }

        Ok(Arc::new(move |row| {
            let value = row.value(&field);
            if value.is_null() {
                return op == Operator::Ne;
            }
            let Ok(ordering) = value.compare(&literal) else {
                return false;
            };
            match op {
                Operator::Eq => ordering == Ordering::Equal,
                Operator::Ne => ordering != Ordering::Equal,
                Operator::Lt => ordering == Ordering::Less,
                Operator::Le => ordering != Ordering::Greater,
                Operator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }))
    }
}

pub struct MembershipEvaluator;

impl OperatorEvaluator for MembershipEvaluator {
    fn name(&self) -> &'static str {
        "in_list"
    }

    fn can_evaluate(&self, op: Operator) -> bool {
        matches!(op, Operator::In | Operator::NotIn)
    }

    fn compile(&self, column: &Column, op: Operator, operand: Operand) -> Result<Predicate> {
        let Operand::List(values) = operand else {
            return Err(RegistryError::Validation(format!(
                "Operator '{}' expects a list",
                op
            )));
        };
        let values = values
            .into_iter()
            .map(|v| coerce(column, v))
            .collect::<Result<Vec<_>>>()?;
        let field = column.name.clone();
        let negated = op == Operator::NotIn;

        Ok(Arc::new(move |row| {
            let value = row.value(&field);
            let found = values.iter().any(|candidate| candidate == value);
            if negated {
                !value.is_null() && !found
            } else {
                found
            }
        }))
    }
}

pub struct RangeEvaluator;

impl OperatorEvaluator for RangeEvaluator {
    fn name(&self) -> &'static str {
        "between"
    }

    fn can_evaluate(&self, op: Operator) -> bool {
        op == Operator::Between
    }

    fn compile(&self, column: &Column, op: Operator, operand: Operand) -> Result<Predicate> {
        let Operand::Range(low, high) = operand else {
            return Err(RegistryError::Validation(format!(
                "Operator '{}' expects a range",
                op
            )));
        };
        let field = column.name.clone();

        // Bare dates widen to the start of the first day and the end of the last.
        let low_day = whole_day(column, &low);
        let high_day = whole_day(column, &high);
        if low_day.is_some() || high_day.is_some() {
            let start = match low_day {
                Some((start, _)) => start,
                None => non_null(column, op, low)?
                    .as_timestamp()
                    .ok_or_else(|| RegistryError::Validation("Invalid range start".into()))?,
            };
            let (end, inclusive) = match high_day {
                Some((_, end)) => (end, false),
                None => (
                    non_null(column, op, high)?
                        .as_timestamp()
                        .ok_or_else(|| RegistryError::Validation("Invalid range end".into()))?,
                    true,
                ),
            };
            return Ok(Arc::new(move |row| match timestamp_at(row, &field) {
                Some(ts) => ts >= start && (ts < end || (inclusive && ts == end)),
                None => false,
            }));
        }

        let low = non_null(column, op, low)?;
        let high = non_null(column, op, high)?;
        Ok(Arc::new(move |row| {
            let value = row.value(&field);
            if value.is_null() {
                return false;
            }
            matches!(value.compare(&low), Ok(Ordering::Greater | Ordering::Equal))
                && matches!(value.compare(&high), Ok(Ordering::Less | Ordering::Equal))
        }))
    }
}

pub struct PatternEvaluator;

impl OperatorEvaluator for PatternEvaluator {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn can_evaluate(&self, op: Operator) -> bool {
        matches!(
            op,
            Operator::Like
                | Operator::Contains
                | Operator::NotContains
                | Operator::StartsWith
                | Operator::EndsWith
        )
    }

    fn compile(&self, column: &Column, op: Operator, operand: Operand) -> Result<Predicate> {
        if column.data_type != DataType::Text {
            return Err(RegistryError::Validation(format!(
                "Operator '{}' needs a text field, '{}' is {}",
                op, column.name, column.data_type
            )));
        }
        let pattern = match operand {
            Operand::Single(Value::Text(pattern)) => pattern,
            other => {
                return Err(RegistryError::Validation(format!(
                    "Operator '{}' on '{}' expects a text value, got {:?}",
                    op, column.name, other
                )));
            }
        };
        let field = column.name.clone();

        if op == Operator::Like {
            check_like(&pattern)?;
            return Ok(Arc::new(move |row| match row.value(&field).as_str() {
                Some(text) => eval_like(text, &pattern).unwrap_or(false),
                None => false,
            }));
        }

        let (mode, negated) = match op {
            Operator::StartsWith => (TextMatch::StartsWith, false),
            Operator::EndsWith => (TextMatch::EndsWith, false),
            Operator::NotContains => (TextMatch::Contains, true),
            _ => (TextMatch::Contains, false),
        };
        Ok(Arc::new(move |row| match row.value(&field).as_str() {
            Some(text) => matches_ignore_case(text, &pattern, mode) != negated,
            None => false,
        }))
    }
}

pub struct EmptinessEvaluator;

impl OperatorEvaluator for EmptinessEvaluator {
    fn name(&self) -> &'static str {
        "is_empty"
    }

    fn can_evaluate(&self, op: Operator) -> bool {
        matches!(op, Operator::IsEmpty | Operator::IsNotEmpty)
    }

    fn compile(&self, column: &Column, op: Operator, _operand: Operand) -> Result<Predicate> {
        let field = column.name.clone();
        let want_empty = op == Operator::IsEmpty;
        Ok(Arc::new(move |row| row.value(&field).is_empty() == want_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use chrono::TimeZone;

    fn schema() -> TableSchema {
        TableSchema::new("banks")
            .column(Column::new("name", DataType::Text))
            .column(Column::new("rate", DataType::Float))
            .column(Column::new("opened_at", DataType::Timestamp))
    }

    fn row(name: Option<&str>, rate: f64, day: u32, hour: u32) -> Row {
        Row::new()
            .with("name", name)
            .with("rate", rate)
            .with(
                "opened_at",
                Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap(),
            )
    }

    fn matches(condition: Condition, row: &Row) -> bool {
        compile(&FilterNode::Leaf(condition), &schema()).unwrap()(row)
    }

    #[test]
    fn test_comparison_null_semantics() {
        let nameless = row(None, 1.0, 1, 0);
        assert!(!matches(Condition::eq("name", "x"), &nameless));
        assert!(matches(Condition::ne("name", "x"), &nameless));
        assert!(matches(Condition::eq("name", Value::Null), &nameless));
        assert!(!matches(Condition::lt("name", "x"), &nameless));
        assert!(compile(
            &FilterNode::Leaf(Condition::lt("name", Value::Null)),
            &schema()
        )
        .is_err());
    }

    #[test]
    fn test_integer_literal_widens_for_float_column() {
        let r = row(Some("a"), 2.0, 1, 0);
        assert!(matches(Condition::eq("rate", 2i64), &r));
        assert!(matches(Condition::between("rate", 1i64, 2i64), &r));
        assert!(!matches(Condition::gt("rate", 2i64), &r));
    }

    #[test]
    fn test_date_only_literal_uses_whole_day() {
        let late = row(Some("a"), 1.0, 10, 23);
        assert!(matches(Condition::eq("opened_at", "2025-01-10"), &late));
        assert!(matches(Condition::le("opened_at", "2025-01-10"), &late));
        assert!(!matches(Condition::gt("opened_at", "2025-01-10"), &late));
        assert!(!matches(Condition::lt("opened_at", "2025-01-10"), &late));
        assert!(matches(Condition::ge("opened_at", "2025-01-10"), &late));
        assert!(!matches(Condition::ne("opened_at", "2025-01-10"), &late));
        assert!(matches(
            Condition::between("opened_at", "2025-01-09", "2025-01-10"),
            &late
        ));
        assert!(!matches(
            Condition::eq("opened_at", "2025-01-10T00:00:00Z"),
            &late
        ));
    }

    #[test]
    fn test_text_operators() {
        let r = row(Some("Main Branch"), 1.0, 1, 0);
        assert!(matches(Condition::contains("name", "BRANCH"), &r));
        assert!(matches(Condition::starts_with("name", "main"), &r));
        assert!(matches(Condition::like("name", "Main%"), &r));
        assert!(!matches(Condition::like("name", "main%"), &r));
        assert!(matches(Condition::is_not_empty("name"), &r));
        assert!(matches(
            Condition::new("name", Operator::NotContains, Operand::Single("x".into())),
            &r
        ));
        assert!(matches(Condition::is_empty("name"), &row(Some(""), 1.0, 1, 0)));
    }

    #[test]
    fn test_membership() {
        let r = row(Some("b"), 1.0, 1, 0);
        assert!(matches(Condition::is_in("name", ["a", "b"]), &r));
        assert!(!matches(Condition::not_in("name", ["a", "b"]), &r));
        assert!(!matches(Condition::is_in("name", Vec::<&str>::new()), &r));
        assert!(!matches(Condition::not_in("name", ["a"]), &row(None, 1.0, 1, 0)));
    }

    #[test]
    fn test_validation_failures() {
        let bad = [
            Condition::eq("missing", 1i64),
            Condition::eq("bank.name", "x"),
            Condition::contains("rate", "1"),
            Condition::eq("rate", "not-a-number"),
            Condition::new("name", Operator::In, Operand::Single("a".into())),
            Condition::new("name", Operator::Between, Operand::List(vec![])),
        ];
        for condition in bad {
            assert!(
                compile(&FilterNode::Leaf(condition.clone()), &schema()).is_err(),
                "{} should be rejected",
                condition
            );
        }
    }

    #[test]
    fn test_groups() {
        let r = row(Some("a"), 1.0, 1, 0);
        let empty_or = FilterNode::Or(vec![]);
        assert!(compile(&empty_or, &schema()).unwrap()(&r));

        let tree = FilterNode::And(vec![
            FilterNode::Leaf(Condition::eq("name", "a")),
            FilterNode::any([Condition::eq("rate", 5.0), Condition::eq("rate", 1.0)]),
            FilterNode::negate(FilterNode::Leaf(Condition::is_empty("name"))),
        ]);
        assert!(compile(&tree, &schema()).unwrap()(&r));
    }
}
