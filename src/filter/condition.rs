use crate::core::{RegistryError, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
    Between,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "equal",
            Self::Ne => "nequal",
            Self::Lt => "lt",
            Self::Le => "lte",
            Self::Gt => "gt",
            Self::Ge => "gte",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Like => "like",
            Self::Between => "range",
            Self::Contains => "contains",
            Self::NotContains => "ncontains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::IsEmpty => "isempty",
            Self::IsNotEmpty => "isnotempty",
        }
    }

    /// Operand shape the operator expects.
    pub fn arity(&self) -> Arity {
        match self {
            Self::IsEmpty | Self::IsNotEmpty => Arity::None,
            Self::In | Self::NotIn => Arity::List,
            Self::Between => Arity::Range,
            _ => Arity::Single,
        }
    }
}

impl FromStr for Operator {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "equal" | "eq" | "=" | "==" => Self::Eq,
            "nequal" | "ne" | "neq" | "!=" | "<>" => Self::Ne,
            "lt" | "<" | "before" => Self::Lt,
            "lte" | "le" | "<=" => Self::Le,
            "gt" | ">" | "after" => Self::Gt,
            "gte" | "ge" | ">=" => Self::Ge,
            "in" => Self::In,
            "nin" | "notin" => Self::NotIn,
            "like" => Self::Like,
            "range" | "between" | "inside" => Self::Between,
            "contains" => Self::Contains,
            "ncontains" | "notcontains" => Self::NotContains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "isempty" => Self::IsEmpty,
            "isnotempty" => Self::IsNotEmpty,
            other => {
                return Err(RegistryError::Validation(format!(
                    "Unknown filter operator '{}'",
                    other
                )));
            }
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Single,
    List,
    Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Single(Value),
    List(Vec<Value>),
    Range(Value, Value),
}

impl Operand {
    pub fn arity(&self) -> Arity {
        match self {
            Self::None => Arity::None,
            Self::Single(_) => Arity::Single,
            Self::List(_) => Arity::List,
            Self::Range(..) => Arity::Range,
        }
    }
}

/// One `(field, operator, operand)` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            op,
            operand,
        }
    }

    fn single(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::new(field, op, Operand::Single(value.into()))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Ge, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(field, Operator::Like, pattern.into())
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::single(field, Operator::Contains, text.into())
    }

    pub fn starts_with(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::single(field, Operator::StartsWith, text.into())
    }

    pub fn ends_with(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::single(field, Operator::EndsWith, text.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            field,
            Operator::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            field,
            Operator::NotIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(field, Operator::Between, Operand::Range(low.into(), high.into()))
    }

    pub fn is_empty(field: impl Into<String>) -> Self {
        Self::new(field, Operator::IsEmpty, Operand::None)
    }

    pub fn is_not_empty(field: impl Into<String>) -> Self {
        Self::new(field, Operator::IsNotEmpty, Operand::None)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{} {}", self.field, self.op),
            Operand::Single(v) => write!(f, "{} {} {}", self.field, self.op, v),
            Operand::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} {} [{}]", self.field, self.op, parts.join(", "))
            }
            Operand::Range(low, high) => {
                write!(f, "{} {} [{}, {}]", self.field, self.op, low, high)
            }
        }
    }
}
