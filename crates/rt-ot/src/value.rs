//! Id-addressed value snapshots.
//!
//! A [`DataValue`] is what operations carry when they introduce new content
//! (array inserts, object sets, whole-value replacements). Every value and
//! every nested child has an id assigned once at creation; the id is the
//! addressing key for all later operations on that value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The kind tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Null,
    Array,
    Object,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Null => "null",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`DataValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueData {
    String { value: String },
    Number { value: f64 },
    Boolean { value: bool },
    Null,
    Array { children: Vec<DataValue> },
    Object { children: IndexMap<String, DataValue> },
}

/// A value with a stable, process-unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub id: String,
    #[serde(flatten)]
    pub data: ValueData,
}

impl DataValue {
    pub fn new(id: impl Into<String>, data: ValueData) -> Self {
        Self { id: id.into(), data }
    }

    pub fn kind(&self) -> ValueKind {
        match &self.data {
            ValueData::String { .. } => ValueKind::String,
            ValueData::Number { .. } => ValueKind::Number,
            ValueData::Boolean { .. } => ValueKind::Boolean,
            ValueData::Null => ValueKind::Null,
            ValueData::Array { .. } => ValueKind::Array,
            ValueData::Object { .. } => ValueKind::Object,
        }
    }

    /// Visit this value and every nested child, parents before children.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a DataValue)) {
        f(self);
        match &self.data {
            ValueData::Array { children } => {
                for child in children {
                    child.walk(f);
                }
            }
            ValueData::Object { children } => {
                for child in children.values() {
                    child.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Returns the first NaN-valued number found in this value tree, by id.
    pub fn find_nan<'a>(&'a self) -> Option<&'a str> {
        let mut found = None;
        self.walk(&mut |v: &'a DataValue| {
            if found.is_none() {
                if let ValueData::Number { value } = &v.data {
                    if value.is_nan() {
                        found = Some(v.id.as_str());
                    }
                }
            }
        });
        found
    }

    /// Build a value tree from plain JSON, assigning fresh ids.
    pub fn from_json(ids: &mut IdGenerator, json: &Value) -> Self {
        let data = match json {
            Value::Null => ValueData::Null,
            Value::Bool(b) => ValueData::Boolean { value: *b },
            Value::Number(n) => ValueData::Number {
                value: n.as_f64().unwrap_or(f64::NAN),
            },
            Value::String(s) => ValueData::String { value: s.clone() },
            Value::Array(items) => ValueData::Array {
                children: items.iter().map(|item| Self::from_json(ids, item)).collect(),
            },
            Value::Object(map) => ValueData::Object {
                children: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(ids, v)))
                    .collect(),
            },
        };
        Self::new(ids.next_id(), data)
    }

    /// The plain JSON view of this value (ids dropped).
    pub fn to_json(&self) -> Value {
        match &self.data {
            ValueData::String { value } => Value::String(value.clone()),
            ValueData::Number { value } => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueData::Boolean { value } => Value::Bool(*value),
            ValueData::Null => Value::Null,
            ValueData::Array { children } => {
                Value::Array(children.iter().map(DataValue::to_json).collect())
            }
            ValueData::Object { children } => {
                let mut map = Map::new();
                for (k, v) in children {
                    map.insert(k.clone(), v.to_json());
                }
                Value::Object(map)
            }
        }
    }
}

/// Allocates ids of the form `"{prefix}:{counter}"`.
///
/// The prefix is the session id, so ids from different sessions never
/// collide and ids from one session are never reused.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    next: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}:{}", self.prefix, self.next);
        self.next += 1;
        id
    }

    pub fn string(&mut self, value: impl Into<String>) -> DataValue {
        DataValue::new(self.next_id(), ValueData::String { value: value.into() })
    }

    pub fn number(&mut self, value: f64) -> DataValue {
        DataValue::new(self.next_id(), ValueData::Number { value })
    }

    pub fn boolean(&mut self, value: bool) -> DataValue {
        DataValue::new(self.next_id(), ValueData::Boolean { value })
    }

    pub fn null(&mut self) -> DataValue {
        DataValue::new(self.next_id(), ValueData::Null)
    }

    pub fn array(&mut self, children: Vec<DataValue>) -> DataValue {
        DataValue::new(self.next_id(), ValueData::Array { children })
    }

    pub fn object(&mut self, children: IndexMap<String, DataValue>) -> DataValue {
        DataValue::new(self.next_id(), ValueData::Object { children })
    }

    pub fn json(&mut self, json: &Value) -> DataValue {
        DataValue::from_json(self, json)
    }
}
