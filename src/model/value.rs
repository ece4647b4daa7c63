//! Property values carried on nodes and relationships.

use serde::{Deserialize, Serialize};

use crate::size::{Size, SizeOf};

/// A property value.
///
/// The engine never interprets properties; they ride along on payloads and
/// count toward the memory footprint of the path tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl SizeOf for Value {
    fn size_of(&self) -> Size {
        let inline = Size::of::<Value>();

        match self {
            Value::String(text) => inline + Size(text.capacity() as u64),
            // Spare capacity is allocated but holds no heap of its own.
            Value::List(items) => {
                inline
                    + Size::of_slots::<Value>(items.capacity() - items.len())
                    + items.iter().map(SizeOf::size_of).sum()
            }
            _ => inline,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
