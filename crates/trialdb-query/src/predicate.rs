use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use trialdb_types::Entity;

use crate::error::{QueryError, QueryResult};

/// A single test against one entity attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The attribute must equal the value.
    Eq(Value),
    /// The attribute must be a member of the set.
    In(Vec<Value>),
}

/// An ordered conjunction of (attribute, condition) pairs.
///
/// Order is caller-controlled on purpose: evaluation runs the pairs in
/// sequence and short-circuits on the first failure, so putting the
/// cheapest or most selective condition first cuts the work per entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate(Vec<(String, Condition)>);

impl Predicate {
    /// The empty predicate; matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an equality condition.
    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((attribute.into(), Condition::Eq(value.into())));
        self
    }

    /// Append a set-membership condition.
    pub fn is_in(mut self, attribute: impl Into<String>, values: Vec<Value>) -> Self {
        self.0.push((attribute.into(), Condition::In(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.0
    }

    /// Parse the JSON document form.
    ///
    /// Two shapes are accepted: an object `{attr: condition, ...}` and an
    /// array of `[attr, condition]` pairs. The array form preserves the
    /// caller's evaluation order; the object form follows the document's
    /// key order. A condition is either a literal (equality) or a
    /// single-key operator object; `$in` is the only operator. Multi-key
    /// operator objects and unknown operators are malformed and fail the
    /// call.
    pub fn from_json(document: &Value) -> QueryResult<Self> {
        let mut pairs = Vec::new();
        match document {
            Value::Object(map) => {
                for (attr, cond) in map {
                    pairs.push((attr.clone(), parse_condition(attr, cond)?));
                }
            }
            Value::Array(items) => {
                for item in items {
                    let pair = item.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
                        QueryError::Malformed("array form expects [attribute, condition] pairs".into())
                    })?;
                    let attr = pair[0]
                        .as_str()
                        .ok_or_else(|| QueryError::Malformed("attribute must be a string".into()))?;
                    pairs.push((attr.to_string(), parse_condition(attr, &pair[1])?));
                }
            }
            other => {
                return Err(QueryError::Malformed(format!(
                    "expected object or array, got {other}"
                )));
            }
        }
        Ok(Self(pairs))
    }
}

fn parse_condition(attribute: &str, condition: &Value) -> QueryResult<Condition> {
    match condition {
        Value::Object(op) => {
            if op.len() != 1 {
                return Err(QueryError::MultiKeyCondition {
                    attribute: attribute.to_string(),
                });
            }
            let (name, args) = op.iter().next().expect("len checked above");
            match name.as_str() {
                "$in" => {
                    let choices = args
                        .as_array()
                        .cloned()
                        .ok_or_else(|| QueryError::Malformed("$in expects an array".into()))?;
                    Ok(Condition::In(choices))
                }
                other => Err(QueryError::UnknownOperator {
                    attribute: attribute.to_string(),
                    operator: other.to_string(),
                }),
            }
        }
        literal => Ok(Condition::Eq(literal.clone())),
    }
}

/// Look up a queryable attribute on an entity.
///
/// Only the typed top-level attributes are addressable; `None` means the
/// entity kind does not expose the attribute at all.
pub fn attribute_of(entity: &Entity, attribute: &str) -> Option<Value> {
    match attribute {
        "uid" | "id" => return Some(Value::String(entity.id().to_hex())),
        "kind" => return Some(Value::String(entity.kind().as_str().to_string())),
        _ => {}
    }
    match entity {
        Entity::Project(p) => match attribute {
            "name" => Some(Value::String(p.name.clone())),
            "description" => Some(opt_string(&p.description)),
            _ => None,
        },
        Entity::Group(g) => match attribute {
            "name" => Some(Value::String(g.name.clone())),
            "description" => Some(opt_string(&g.description)),
            "project_id" => Some(opt_id(&g.project_id)),
            _ => None,
        },
        Entity::Trial(t) => match attribute {
            "fingerprint" => Some(Value::String(t.fingerprint.to_hex())),
            "revision" => Some(Value::from(t.revision)),
            "status" => Some(Value::String(t.status.as_str().to_string())),
            "project_id" => Some(opt_id(&t.project_id)),
            "group_id" => Some(opt_id(&t.group_id)),
            _ => None,
        },
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn opt_id(value: &Option<trialdb_types::EntityId>) -> Value {
    value
        .map(|id| Value::String(id.to_hex()))
        .unwrap_or(Value::Null)
}

/// Evaluate a predicate against one entity.
///
/// Conditions run in predicate order and the first failure ends the call.
/// An attribute the entity does not expose is logged and treated as
/// vacuously true for that pair — lenient on purpose, so one filter can be
/// applied across mixed entity kinds.
pub fn matches(entity: &Entity, predicate: &Predicate) -> bool {
    for (attribute, condition) in predicate.conditions() {
        let Some(actual) = attribute_of(entity, attribute) else {
            warn!(
                kind = entity.kind().as_str(),
                attribute = %attribute,
                "entity has no such attribute; condition skipped"
            );
            continue;
        };
        let selected = match condition {
            Condition::Eq(expected) => actual == *expected,
            Condition::In(choices) => choices.contains(&actual),
        };
        if !selected {
            return false;
        }
    }
    true
}
