// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::time::{SystemTime, UNIX_EPOCH};

// Third-party crates
use tracing::trace;

use probe_descriptor::{
    DescriptorRegistry, FieldKind, MessageDescriptor, ScalarClass, ScalarKind, Value,
};
use probe_memory::AdaptiveMemory;

use crate::errors::SynthError;

/// Build a structurally valid example value for `message`, biased toward
/// previously observed values from `memory`. Pure apart from memory
/// reads and the timestamp special case.
pub fn synthesize(
    registry: &DescriptorRegistry,
    message: &MessageDescriptor,
    memory: &AdaptiveMemory,
) -> Result<Value, SynthError> {
    let mut ctx = Context {
        registry,
        memory,
        root_type: &message.type_name,
        stack: Vec::new(),
    };
    ctx.message(message, "")
}

struct Context<'a> {
    registry: &'a DescriptorRegistry,
    memory: &'a AdaptiveMemory,
    /// Memory is keyed by the type the capture was rooted at, so lookups
    /// use the root type plus the full path from it.
    root_type: &'a str,
    /// Message types on the active recursion path; a re-entered type
    /// synthesizes to Null instead of recursing forever.
    stack: Vec<String>,
}

impl Context<'_> {
    fn message(&mut self, message: &MessageDescriptor, path: &str) -> Result<Value, SynthError> {
        self.stack.push(message.type_name.clone());
        let mut fields = Vec::with_capacity(message.fields.len());
        for field in &message.fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{path}.{}", field.name)
            };
            let value = if field.repeated {
                // Exactly one element: structurally exercised, no noise.
                let element = self.field_value(&field.kind, &format!("{field_path}[0]"))?;
                Value::List(vec![element])
            } else {
                self.field_value(&field.kind, &field_path)?
            };
            fields.push((field.name.clone(), value));
        }
        self.stack.pop();
        Ok(Value::Message(fields))
    }

    fn field_value(&mut self, kind: &FieldKind, path: &str) -> Result<Value, SynthError> {
        match kind {
            FieldKind::Scalar(scalar) => Ok(self.scalar(*scalar, path)),
            FieldKind::Enum(type_name) => self.enumeration(type_name),
            FieldKind::Message(type_name) => self.nested(type_name, path),
            FieldKind::Map { key, value } => {
                let entry_key = map_key_default(*key);
                let entry_path = format!("{path}[\"key\"]");
                let entry_value = self.field_value(value, &entry_path)?;
                Ok(Value::Map(vec![(entry_key, entry_value)]))
            }
        }
    }

    fn scalar(&self, kind: ScalarKind, path: &str) -> Value {
        if let Some(value) = self.memory.best_for_field(self.root_type, path) {
            trace!(%path, "synthesized from typed memory");
            return value;
        }
        let local_name = Value::local_field_name(path);
        if let Some(value) = self
            .memory
            .best_for_scalar(ScalarClass::of_kind(kind), local_name)
        {
            trace!(%path, field = local_name, "synthesized from scalar memory");
            return value;
        }
        scalar_default(kind)
    }

    fn enumeration(&self, type_name: &str) -> Result<Value, SynthError> {
        let decl = self.registry.enum_type(type_name)?;
        // The first value is conventionally an "unspecified" sentinel a
        // real server is likely to reject; prefer the second.
        let chosen = match decl.values.len() {
            0 => return Err(SynthError::EmptyEnum(type_name.to_string())),
            1 => &decl.values[0],
            _ => &decl.values[1],
        };
        Ok(Value::String(chosen.clone()))
    }

    fn nested(&mut self, type_name: &str, path: &str) -> Result<Value, SynthError> {
        if self.registry.is_timestamp(type_name) {
            return Ok(current_timestamp());
        }
        let message = self.registry.message(type_name)?;
        if self.stack.contains(&message.type_name) {
            return Ok(Value::Null);
        }
        self.message(message, path)
    }
}

fn scalar_default(kind: ScalarKind) -> Value {
    if kind.is_64bit_int() {
        // String-encoded to avoid precision loss.
        return Value::String("0".to_string());
    }
    if kind.is_32bit_numeric() {
        return Value::Number(0.0);
    }
    match kind {
        // True so the toggle is visibly present, not silently absent.
        ScalarKind::Bool => Value::Bool(true),
        ScalarKind::Bytes => Value::Bytes(Vec::new()),
        _ => Value::String(String::new()),
    }
}

fn map_key_default(kind: ScalarKind) -> Value {
    if !kind.is_map_key_eligible() || kind == ScalarKind::Bool {
        return Value::Bool(true);
    }
    if kind.is_64bit_int() {
        return Value::String("0".to_string());
    }
    if kind.is_32bit_numeric() {
        return Value::Number(0.0);
    }
    // No numeric/boolean convention applies; placeholder text.
    Value::String("key".to_string())
}

/// A zero timestamp is rarely a meaningful example; default to now.
fn current_timestamp() -> Value {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Value::Message(vec![
        ("seconds".to_string(), Value::String(now.as_secs().to_string())),
        ("nanos".to_string(), Value::Number(now.subsec_nanos() as f64)),
    ])
}
