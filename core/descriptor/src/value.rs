// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::model::ScalarKind;

/// Language-agnostic example value tree. 64-bit integers are carried as
/// strings to avoid precision loss, mirroring the JSON mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Message fields in declaration order.
    Message(Vec<(String, Value)>),
    /// Map entries as (key, value) pairs; keys are scalar leaves.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Bytes(_)
        )
    }

    /// Visit every scalar leaf with its dotted/indexed field path
    /// (`customer.id`, `users[0].name`, `attrs["key"]`). Map keys are
    /// part of the path, not leaves of their own.
    pub fn walk_leaves<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&str, &'a Value),
    {
        self.walk("", f);
    }

    fn walk<'a, F>(&'a self, path: &str, f: &mut F)
    where
        F: FnMut(&str, &'a Value),
    {
        match self {
            Value::Null => {}
            Value::Message(fields) => {
                for (name, value) in fields {
                    let child = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    value.walk(&child, f);
                }
            }
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.walk(&format!("{path}[{i}]"), f);
                }
            }
            Value::Map(entries) => {
                for (key, value) in entries {
                    value.walk(&format!("{path}[{}]", render_key(key)), f);
                }
            }
            leaf => f(path, leaf),
        }
    }

    /// Local name of the last path segment, with any index stripped:
    /// `users[0].name` -> `name`, `ids[3]` -> `ids`.
    pub fn local_field_name(path: &str) -> &str {
        let last = path.rsplit('.').next().unwrap_or(path);
        match last.find('[') {
            Some(idx) => &last[..idx],
            None => last,
        }
    }
}

fn render_key(key: &Value) -> String {
    match key {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Value::String(s) => format!("{s:?}"),
        other => format!("{other:?}"),
    }
}

/// Coarse classification shared by capture (which only sees a leaf value)
/// and synthesis (which sees the field's wire kind). The two sides must
/// agree so the cross-type scalar memory round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarClass {
    Bool,
    Number,
    String,
    Bytes,
}

impl ScalarClass {
    pub fn of_kind(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Bool => ScalarClass::Bool,
            ScalarKind::Bytes => ScalarClass::Bytes,
            ScalarKind::String => ScalarClass::String,
            // 64-bit integers travel string-encoded.
            k if k.is_64bit_int() => ScalarClass::String,
            _ => ScalarClass::Number,
        }
    }

    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(ScalarClass::Bool),
            Value::Number(_) => Some(ScalarClass::Number),
            Value::String(_) => Some(ScalarClass::String),
            Value::Bytes(_) => Some(ScalarClass::Bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarClass::Bool => "bool",
            ScalarClass::Number => "number",
            ScalarClass::String => "string",
            ScalarClass::Bytes => "bytes",
        }
    }
}
