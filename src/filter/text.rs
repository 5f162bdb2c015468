//! Textual filter encodings accepted from callers.
//!
//! The wire form is JSON of the shape
//! `{"logic":"and","filters":[{"field":"name","mode":"contains","value":"x"}]}`.
//! Entries of `filters` may themselves be groups (`{"logic":..,"filters":[..]}`)
//! or negations (`{"not":{..}}`). Clients transport it URL-escaped and base64
//! encoded; [`EncodedFilterParser`] undoes both layers.

use super::{Condition, FilterNode, Operand, Operator, SortDirection, SortField, condition::Arity};
use crate::core::{RegistryError, Result, Value};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// Parses caller-supplied text into a filter tree.
pub trait FilterParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<FilterNode>;
}

/// Accepts the JSON wire form directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFilterParser;

/// Accepts URL-escaped, base64-encoded JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodedFilterParser;

impl FilterParser for JsonFilterParser {
    fn parse(&self, text: &str) -> Result<FilterNode> {
        if text.trim().is_empty() {
            return Ok(FilterNode::default());
        }
        Ok(parse_root(text.as_bytes())?.0)
    }
}

impl FilterParser for EncodedFilterParser {
    fn parse(&self, text: &str) -> Result<FilterNode> {
        if text.trim().is_empty() {
            return Ok(FilterNode::default());
        }
        Ok(parse_root(&decode_layers(text)?)?.0)
    }
}

/// Everything carried by the pipe-separated `filter|sort|pageIndex|pageSize` form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub filter: FilterNode,
    pub sort: Vec<SortField>,
    /// Relation names listed under the filter's `preload` key.
    pub preloads: Option<Vec<String>>,
    pub page_index: Option<usize>,
    pub page_size: Option<usize>,
}

/// Decodes `filter|sort|pageIndex|pageSize`; missing or empty parts take defaults.
pub fn parse_query_string(text: &str) -> Result<ParsedQuery> {
    let mut parts = text.split('|');
    let filter_part = parts.next().unwrap_or_default();
    let sort_part = parts.next().unwrap_or_default();
    let index_part = parts.next().unwrap_or_default();
    let size_part = parts.next().unwrap_or_default();

    let mut query = ParsedQuery::default();
    if !filter_part.trim().is_empty() {
        let (filter, preloads) = parse_root(&decode_layers(filter_part)?)?;
        query.filter = filter;
        query.preloads = preloads;
    }
    query.sort = parse_sort(sort_part)?;
    query.page_index = parse_number(index_part, "pageIndex")?;
    query.page_size = parse_number(size_part, "pageSize")?;
    Ok(query)
}

/// Decodes an encoded `[{"field":..,"order":"asc"|"desc"}]` list. Unknown orders read as ascending.
pub fn parse_sort(text: &str) -> Result<Vec<SortField>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let wire: Vec<WireSort> = serde_json::from_slice(&decode_layers(text)?)?;
    Ok(wire
        .into_iter()
        .map(|s| SortField {
            field: s.field,
            direction: s
                .order
                .as_deref()
                .map(SortDirection::parse_lenient)
                .unwrap_or_default(),
        })
        .collect())
}

/// Produces the transport form of a JSON document.
pub fn encode(json: &str) -> String {
    urlencoding::encode(&STANDARD.encode(json)).into_owned()
}

fn parse_number(text: &str, name: &str) -> Result<Option<usize>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<usize>()
        .map(Some)
        .map_err(|e| RegistryError::Validation(format!("Invalid {} '{}': {}", name, text, e)))
}

fn decode_layers(text: &str) -> Result<Vec<u8>> {
    let unescaped = urlencoding::decode(text.trim())
        .map_err(|e| RegistryError::Validation(format!("Unescaping failed: {}", e)))?;
    STANDARD
        .decode(unescaped.as_bytes())
        .map_err(|e| RegistryError::Validation(format!("Base64 decoding failed: {}", e)))
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireRoot {
    #[serde(default)]
    logic: Option<String>,
    #[serde(default)]
    filters: Vec<WireNode>,
    #[serde(default)]
    preload: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNode {
    Not {
        not: Box<WireNode>,
    },
    Leaf {
        field: String,
        mode: String,
        #[serde(default)]
        value: serde_json::Value,
    },
    Group {
        #[serde(default)]
        logic: Option<String>,
        filters: Vec<WireNode>,
    },
}

#[derive(Debug, Deserialize)]
struct WireSort {
    field: String,
    #[serde(default)]
    order: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRange {
    Object { from: serde_json::Value, to: serde_json::Value },
    Pair(serde_json::Value, serde_json::Value),
}

fn parse_root(json: &[u8]) -> Result<(FilterNode, Option<Vec<String>>)> {
    let root: WireRoot = serde_json::from_slice(json)?;
    let node = group(root.logic.as_deref(), root.filters)?;
    Ok((node, root.preload))
}

fn group(logic: Option<&str>, filters: Vec<WireNode>) -> Result<FilterNode> {
    let children = filters
        .into_iter()
        .map(into_node)
        .collect::<Result<Vec<_>>>()?;
    match logic.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("and") => Ok(FilterNode::And(children)),
        Some("or") => Ok(FilterNode::Or(children)),
        Some(other) => Err(RegistryError::Validation(format!(
            "Unknown filter logic '{}'",
            other
        ))),
    }
}

fn into_node(wire: WireNode) -> Result<FilterNode> {
    match wire {
        WireNode::Not { not } => Ok(FilterNode::negate(into_node(*not)?)),
        WireNode::Group { logic, filters } => group(logic.as_deref(), filters),
        WireNode::Leaf { field, mode, value } => {
            let op: Operator = mode.parse()?;
            let operand = operand_for(op, value)?;
            Ok(FilterNode::Leaf(Condition::new(field, op, operand)))
        }
    }
}

fn operand_for(op: Operator, value: serde_json::Value) -> Result<Operand> {
    match op.arity() {
        Arity::None => Ok(Operand::None),
        Arity::Single => Ok(Operand::Single(Value::from_json(&value)?)),
        Arity::List => match value {
            serde_json::Value::Array(items) => Ok(Operand::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            )),
            scalar => Ok(Operand::List(vec![Value::from_json(&scalar)?])),
        },
        Arity::Range => {
            let (from, to) = match serde_json::from_value::<WireRange>(value)? {
                WireRange::Object { from, to } | WireRange::Pair(from, to) => (from, to),
            };
            Ok(Operand::Range(Value::from_json(&from)?, Value::from_json(&to)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_unconstrained() {
        assert!(EncodedFilterParser.parse("").unwrap().is_unconstrained());
        assert!(JsonFilterParser.parse("{}").unwrap().is_unconstrained());
    }

    #[test]
    fn test_flat_structured_filter() {
        let json = r#"{"logic":"OR","filters":[
            {"field":"name","mode":"contains","value":"acme","dataType":"text"},
            {"field":"rate","mode":"range","value":{"from":1,"to":2},"dataType":"number"},
            {"field":"status","mode":"in","value":["a","b"]},
            {"field":"note","mode":"isEmpty"}
        ]}"#;
        let node = JsonFilterParser.parse(json).unwrap();
        assert_eq!(
            node,
            FilterNode::Or(vec![
                Condition::contains("name", "acme").into(),
                Condition::between("rate", 1i64, 2i64).into(),
                Condition::is_in("status", ["a", "b"]).into(),
                Condition::is_empty("note").into(),
            ])
        );
    }

    #[test]
    fn test_nested_groups_and_negation() {
        let json = r#"{"filters":[
            {"field":"branch_id","mode":"equal","value":"b"},
            {"logic":"or","filters":[
                {"field":"status","mode":"equal","value":"active"},
                {"not":{"field":"status","mode":"equal","value":"closed"}}
            ]}
        ]}"#;
        let encoded = encode(json);
        let node = EncodedFilterParser.parse(&encoded).unwrap();
        assert_eq!(
            node,
            FilterNode::And(vec![
                Condition::eq("branch_id", "b").into(),
                FilterNode::Or(vec![
                    Condition::eq("status", "active").into(),
                    FilterNode::negate(Condition::eq("status", "closed").into()),
                ]),
            ])
        );
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(EncodedFilterParser.parse("%%%").is_err());
        assert!(EncodedFilterParser.parse("bm90IGpzb24=").is_err());
        assert!(JsonFilterParser
            .parse(r#"{"filters":[{"field":"a","mode":"sounds_like","value":1}]}"#)
            .is_err());
        assert!(JsonFilterParser.parse(r#"{"logic":"xor","filters":[]}"#).is_err());
        assert!(JsonFilterParser
            .parse(r#"{"filters":[{"field":"a","mode":"equal","value":[1]}]}"#)
            .is_err());
    }

    #[test]
    fn test_query_string_parts() {
        let filter = encode(
            r#"{"filters":[{"field":"name","mode":"equal","value":"x"}],"preload":["branch"]}"#,
        );
        let sort = encode(r#"[{"field":"name","order":"DESC"},{"field":"id","order":"sideways"}]"#);
        let query = parse_query_string(&format!("{}|{}|2|25", filter, sort)).unwrap();

        assert_eq!(query.filter, FilterNode::And(vec![Condition::eq("name", "x").into()]));
        assert_eq!(query.sort, vec![SortField::desc("name"), SortField::asc("id")]);
        assert_eq!(query.preloads, Some(vec!["branch".to_string()]));
        assert_eq!(query.page_index, Some(2));
        assert_eq!(query.page_size, Some(25));

        let bare = parse_query_string("").unwrap();
        assert_eq!(bare, ParsedQuery::default());
        assert!(parse_query_string("||x").is_err());
    }
}
