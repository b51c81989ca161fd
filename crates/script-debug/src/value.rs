use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A script value as seen by the debugger.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Display form used in variable views: `5 (int)` for simple values, a
    /// size summary for containers.
    pub fn value_string(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::List(items) => format!("list[{}]", items.len()),
            Value::Map(entries) => format!("map{{{}}}", entries.len()),
            simple => format!("{simple} ({})", simple.type_name()),
        }
    }

    pub fn has_children(&self) -> bool {
        match self {
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            _ => false,
        }
    }

    pub fn children(&self) -> Vec<Variable> {
        match self {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| Variable::new(format!("[{index}]"), value.clone()))
                .collect(),
            Value::Map(entries) => entries
                .iter()
                .map(|(key, value)| Variable::new(key.clone(), value.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Char(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
            Value::List(_) | Value::Map(_) => f.write_str(&self.value_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// A named value shown in a frame's variable view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn value_string(&self) -> String {
        self.value.value_string()
    }

    pub fn children(&self) -> Vec<Variable> {
        self.value.children()
    }
}
