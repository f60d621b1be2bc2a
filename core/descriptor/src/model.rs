// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

/// Primitive wire types a field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    /// 64-bit integer kinds are string-encoded in value trees to avoid
    /// precision loss.
    pub fn is_64bit_int(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int64
                | ScalarKind::Uint64
                | ScalarKind::Sint64
                | ScalarKind::Fixed64
                | ScalarKind::Sfixed64
        )
    }

    pub fn is_32bit_numeric(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int32
                | ScalarKind::Uint32
                | ScalarKind::Sint32
                | ScalarKind::Fixed32
                | ScalarKind::Sfixed32
                | ScalarKind::Float
                | ScalarKind::Double
        )
    }

    /// Proto map keys may be any integral or string kind.
    pub fn is_map_key_eligible(&self) -> bool {
        !matches!(self, ScalarKind::Float | ScalarKind::Double | ScalarKind::Bytes)
    }
}

/// Kind of one field. Enum/message references carry the fully-qualified
/// type name; the concrete descriptor is resolved lazily through the
/// registry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Enum(String),
    Message(String),
    Map {
        key: ScalarKind,
        value: Box<FieldKind>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Map fields are never marked repeated even though they are
    /// repeated entries on the wire.
    pub repeated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    /// Fully-qualified type name, without a leading dot.
    pub type_name: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Enum declaration with its value names in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub type_name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub service: String,
    pub name: String,
    /// Fully-qualified input/output message type names.
    pub input_type: String,
    pub output_type: String,
    pub mode: StreamingMode,
}

impl MethodDescriptor {
    /// gRPC request path, e.g. `/pkg.Service/Method`.
    pub fn grpc_path(&self) -> String {
        format!("/{}/{}", self.service, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}
