// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::collections::HashMap;

// Third-party crates
use prost::Message as _;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorSet};
use tracing::debug;

use crate::errors::DescriptorError;
use crate::model::{
    EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, MethodDescriptor, ScalarKind,
    ServiceDescriptor, StreamingMode,
};

const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Registry mapping fully-qualified type names to descriptors, built once
/// per successful compilation from the compiler's stub artifact (an
/// encoded `FileDescriptorSet`). All lazy type references in field
/// descriptors resolve through this registry.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    messages: HashMap<String, MessageDescriptor>,
    enums: HashMap<String, EnumDescriptor>,
    services: Vec<ServiceDescriptor>,
}

impl DescriptorRegistry {
    pub fn from_stub(stub: &[u8]) -> Result<Self, DescriptorError> {
        let set = FileDescriptorSet::decode(stub)?;
        Self::from_descriptor_set(&set)
    }

    pub fn from_descriptor_set(set: &FileDescriptorSet) -> Result<Self, DescriptorError> {
        // First pass: index every message (including nested ones) by its
        // fully-qualified name so map entries and cross-file references
        // resolve regardless of declaration order.
        let mut raw_messages: HashMap<String, &DescriptorProto> = HashMap::new();
        let mut registry = DescriptorRegistry::default();

        for file in &set.file {
            let package = file.package();
            for message in &file.message_type {
                collect_messages(package, message, &mut raw_messages);
            }
            for enumeration in &file.enum_type {
                let type_name = qualify(package, enumeration.name());
                registry.enums.insert(
                    type_name.clone(),
                    EnumDescriptor {
                        type_name,
                        values: enumeration.value.iter().map(|v| v.name().to_string()).collect(),
                    },
                );
            }
        }

        // Nested enums live inside their parent message scope.
        for (scope, message) in &raw_messages {
            for enumeration in &message.enum_type {
                let type_name = qualify(scope, enumeration.name());
                registry.enums.insert(
                    type_name.clone(),
                    EnumDescriptor {
                        type_name,
                        values: enumeration.value.iter().map(|v| v.name().to_string()).collect(),
                    },
                );
            }
        }

        for (type_name, message) in &raw_messages {
            if is_map_entry(message) {
                continue;
            }
            let fields = message
                .field
                .iter()
                .map(|f| convert_field(f, &raw_messages))
                .collect::<Result<Vec<_>, _>>()?;
            registry.messages.insert(
                type_name.clone(),
                MessageDescriptor {
                    type_name: type_name.clone(),
                    fields,
                },
            );
        }

        for file in &set.file {
            let package = file.package();
            for service in &file.service {
                let service_name = qualify(package, service.name());
                let methods = service
                    .method
                    .iter()
                    .map(|m| MethodDescriptor {
                        service: service_name.clone(),
                        name: m.name().to_string(),
                        input_type: strip_dot(m.input_type()).to_string(),
                        output_type: strip_dot(m.output_type()).to_string(),
                        mode: match (m.client_streaming(), m.server_streaming()) {
                            (false, false) => StreamingMode::Unary,
                            (false, true) => StreamingMode::ServerStreaming,
                            (true, false) => StreamingMode::ClientStreaming,
                            (true, true) => StreamingMode::BidiStreaming,
                        },
                    })
                    .collect();
                registry.services.push(ServiceDescriptor {
                    name: service_name,
                    methods,
                });
            }
        }

        debug!(
            messages = registry.messages.len(),
            enums = registry.enums.len(),
            services = registry.services.len(),
            "descriptor registry loaded"
        );

        Ok(registry)
    }

    pub fn message(&self, type_name: &str) -> Result<&MessageDescriptor, DescriptorError> {
        self.messages
            .get(strip_dot(type_name))
            .ok_or_else(|| DescriptorError::UnresolvedType(type_name.to_string()))
    }

    pub fn enum_type(&self, type_name: &str) -> Result<&EnumDescriptor, DescriptorError> {
        self.enums
            .get(strip_dot(type_name))
            .ok_or_else(|| DescriptorError::UnresolvedType(type_name.to_string()))
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn is_timestamp(&self, type_name: &str) -> bool {
        strip_dot(type_name) == TIMESTAMP_TYPE
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn strip_dot(type_name: &str) -> &str {
    type_name.strip_prefix('.').unwrap_or(type_name)
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .and_then(|o| o.map_entry)
        .unwrap_or(false)
}

fn collect_messages<'a>(
    scope: &str,
    message: &'a DescriptorProto,
    out: &mut HashMap<String, &'a DescriptorProto>,
) {
    let type_name = qualify(scope, message.name());
    for nested in &message.nested_type {
        collect_messages(&type_name, nested, out);
    }
    out.insert(type_name, message);
}

fn convert_field(
    field: &FieldDescriptorProto,
    raw_messages: &HashMap<String, &DescriptorProto>,
) -> Result<FieldDescriptor, DescriptorError> {
    let kind = convert_kind(field, raw_messages)?;
    let repeated =
        field.label() == Label::Repeated && !matches!(kind, FieldKind::Map { .. });
    Ok(FieldDescriptor {
        name: field.name().to_string(),
        kind,
        repeated,
    })
}

fn convert_kind(
    field: &FieldDescriptorProto,
    raw_messages: &HashMap<String, &DescriptorProto>,
) -> Result<FieldKind, DescriptorError> {
    let kind = match field.r#type() {
        Type::Double => FieldKind::Scalar(ScalarKind::Double),
        Type::Float => FieldKind::Scalar(ScalarKind::Float),
        Type::Int64 => FieldKind::Scalar(ScalarKind::Int64),
        Type::Uint64 => FieldKind::Scalar(ScalarKind::Uint64),
        Type::Int32 => FieldKind::Scalar(ScalarKind::Int32),
        Type::Fixed64 => FieldKind::Scalar(ScalarKind::Fixed64),
        Type::Fixed32 => FieldKind::Scalar(ScalarKind::Fixed32),
        Type::Bool => FieldKind::Scalar(ScalarKind::Bool),
        Type::String => FieldKind::Scalar(ScalarKind::String),
        Type::Bytes => FieldKind::Scalar(ScalarKind::Bytes),
        Type::Uint32 => FieldKind::Scalar(ScalarKind::Uint32),
        Type::Sfixed32 => FieldKind::Scalar(ScalarKind::Sfixed32),
        Type::Sfixed64 => FieldKind::Scalar(ScalarKind::Sfixed64),
        Type::Sint32 => FieldKind::Scalar(ScalarKind::Sint32),
        Type::Sint64 => FieldKind::Scalar(ScalarKind::Sint64),
        Type::Enum => {
            let name = nonempty_type_name(field)?;
            FieldKind::Enum(name.to_string())
        }
        Type::Message | Type::Group => {
            let name = nonempty_type_name(field)?;
            match raw_messages.get(name) {
                Some(entry) if is_map_entry(entry) => map_kind(name, entry, raw_messages)?,
                _ => FieldKind::Message(name.to_string()),
            }
        }
    };
    Ok(kind)
}

fn nonempty_type_name(field: &FieldDescriptorProto) -> Result<&str, DescriptorError> {
    let name = strip_dot(field.type_name());
    if name.is_empty() {
        return Err(DescriptorError::MissingTypeName(field.name().to_string()));
    }
    Ok(name)
}

fn map_kind(
    entry_name: &str,
    entry: &DescriptorProto,
    raw_messages: &HashMap<String, &DescriptorProto>,
) -> Result<FieldKind, DescriptorError> {
    let key_field = entry
        .field
        .iter()
        .find(|f| f.number() == 1)
        .ok_or_else(|| DescriptorError::MalformedMapEntry(entry_name.to_string()))?;
    let value_field = entry
        .field
        .iter()
        .find(|f| f.number() == 2)
        .ok_or_else(|| DescriptorError::MalformedMapEntry(entry_name.to_string()))?;

    let key = match convert_kind(key_field, raw_messages)? {
        FieldKind::Scalar(kind) => kind,
        _ => return Err(DescriptorError::MalformedMapEntry(entry_name.to_string())),
    };
    let value = convert_kind(value_field, raw_messages)?;

    Ok(FieldKind::Map {
        key,
        value: Box::new(value),
    })
}
