// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod errors;
pub mod model;
pub mod registry;
pub mod value;

pub use errors::DescriptorError;
pub use model::{
    EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, MethodDescriptor, ScalarKind,
    ServiceDescriptor, StreamingMode,
};
pub use registry::DescriptorRegistry;
pub use value::{ScalarClass, Value};
