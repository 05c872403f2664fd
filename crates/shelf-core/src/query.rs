//! Match specifications and the query matcher
//!
//! A match specification is a slice of [`QueryOptions`]. Each options object
//! ANDs its field conditions, where a condition is either an exact value or
//! an any-of list. The slice ORs its objects together. Only the last object
//! supplies sort, direction, limit and offset.
//!
//! ```text
//! [{ unread: true, favorite: true }, { status: [2, 3] }]
//!   => (unread = true AND favorite = true) OR status IN (2, 3)
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Field, FieldKind, FieldValue, ItemFields};

/// Reserved control keys accepted by [`QueryOptions::from_json`]
pub const RESERVED_KEYS: [&str; 4] = ["sort", "descending", "limit", "offset"];

/// Condition on a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The field equals this value
    Eq(FieldValue),
    /// The field equals any of these values
    AnyOf(Vec<FieldValue>),
}

impl Condition {
    pub fn matches(&self, value: &FieldValue) -> bool {
        match self {
            Condition::Eq(expected) => expected == value,
            Condition::AnyOf(options) => options.iter().any(|option| option == value),
        }
    }

    fn values(&self) -> &[FieldValue] {
        match self {
            Condition::Eq(value) => std::slice::from_ref(value),
            Condition::AnyOf(values) => values,
        }
    }
}

/// One options object of a match specification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    conditions: BTreeMap<Field, Condition>,
    /// Field to sort by; storage order when unset
    pub sort: Option<Field>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`
    pub fn eq(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.conditions.insert(field, Condition::Eq(value.into()));
        self
    }

    /// Require `field` to equal one of `values`
    pub fn any_of<V: Into<FieldValue>>(
        mut self,
        field: Field,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.insert(field, Condition::AnyOf(values));
        self
    }

    pub fn sort_by(mut self, field: Field) -> Self {
        self.sort = Some(field);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Field conditions in field order
    pub fn conditions(&self) -> impl Iterator<Item = (Field, &Condition)> {
        self.conditions.iter().map(|(field, cond)| (*field, cond))
    }

    /// Whether this object places no condition on any field
    pub fn is_unfiltered(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether a record satisfies every condition of this object
    pub fn matches(&self, fields: &ItemFields) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(&fields.get(*field)))
    }

    /// Check every condition value against its field's type
    pub fn validate(&self) -> Result<()> {
        for (field, condition) in &self.conditions {
            for value in condition.values() {
                match value.kind() {
                    None if field.is_nullable() => {}
                    None => {
                        return Err(Error::Validation(format!(
                            "field '{}' cannot be null",
                            field
                        )))
                    }
                    Some(kind) if kind == field.kind() => {}
                    Some(kind) => {
                        return Err(Error::Validation(format!(
                            "field '{}' expects {:?}, got {:?}",
                            field,
                            field.kind(),
                            kind
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Build an options object from a JSON object
    ///
    /// Keys are field names or one of [`RESERVED_KEYS`]. Unknown keys and
    /// values that do not fit their field are rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::Validation("query options must be a JSON object".into()))?;

        let mut options = QueryOptions::new();
        for (key, value) in object {
            match key.as_str() {
                "sort" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| Error::Validation("'sort' must be a field name".into()))?;
                    options.sort = Some(name.parse().map_err(Error::Validation)?);
                }
                "descending" => {
                    options.descending = value
                        .as_bool()
                        .ok_or_else(|| Error::Validation("'descending' must be a boolean".into()))?;
                }
                "limit" => options.limit = Some(json_count(key, value)?),
                "offset" => options.offset = Some(json_count(key, value)?),
                name => {
                    let field: Field = name.parse().map_err(|e| {
                        Error::Validation(format!(
                            "{} (reserved keys: {})",
                            e,
                            RESERVED_KEYS.join(", ")
                        ))
                    })?;
                    let condition = match value {
                        Value::Array(values) => Condition::AnyOf(
                            values
                                .iter()
                                .map(|v| json_value(field, v))
                                .collect::<Result<_>>()?,
                        ),
                        scalar => Condition::Eq(json_value(field, scalar)?),
                    };
                    options.conditions.insert(field, condition);
                }
            }
        }

        options.validate()?;
        Ok(options)
    }

    /// Build a whole match specification from a JSON object or array of objects
    pub fn list_from_json(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::Array(objects) => objects.iter().map(Self::from_json).collect(),
            object => Ok(vec![Self::from_json(object)?]),
        }
    }
}

fn json_count(key: &str, value: &Value) -> Result<usize> {
    let invalid = || Error::Validation(format!("'{}' must be a non-negative integer", key));
    let n = value.as_u64().ok_or_else(invalid)?;
    usize::try_from(n).map_err(|_| invalid())
}

fn json_value(field: Field, value: &Value) -> Result<FieldValue> {
    let invalid = || {
        Error::Validation(format!(
            "invalid value {} for field '{}' ({:?})",
            value,
            field,
            field.kind()
        ))
    };

    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match field.kind() {
        FieldKind::Text => value
            .as_str()
            .map(|s| FieldValue::Text(s.to_string()))
            .ok_or_else(invalid),
        FieldKind::Int => value.as_i64().map(FieldValue::Int).ok_or_else(invalid),
        FieldKind::Bool => value.as_bool().map(FieldValue::Bool).ok_or_else(invalid),
        FieldKind::Time => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| FieldValue::Time(t.with_timezone(&Utc)))
                .map_err(|_| invalid()),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(FieldValue::Time)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
    }
}

/// Whether a record matches a match specification
///
/// An empty specification matches every record.
pub fn matches(fields: &ItemFields, specs: &[QueryOptions]) -> bool {
    specs.is_empty() || specs.iter().any(|options| options.matches(fields))
}

/// Validate every options object of a specification
pub fn validate(specs: &[QueryOptions]) -> Result<()> {
    specs.iter().try_for_each(QueryOptions::validate)
}

/// The options object that supplies sort and paging
pub fn trailing(specs: &[QueryOptions]) -> Option<&QueryOptions> {
    specs.last()
}

/// Total order used for in-memory sorting
///
/// Null sorts before booleans, then integers, text and timestamps.
pub fn compare_for_sort(a: &FieldValue, b: &FieldValue) -> Ordering {
    fn rank(value: &FieldValue) -> u8 {
        match value {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) => 2,
            FieldValue::Text(_) => 3,
            FieldValue::Time(_) => 4,
        }
    }

    match (a, b) {
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Int(x), FieldValue::Int(y)) => x.cmp(y),
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        (FieldValue::Time(x), FieldValue::Time(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
