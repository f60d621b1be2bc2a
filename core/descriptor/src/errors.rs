// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("invalid stub artifact: {0}")]
    InvalidStub(#[from] prost::DecodeError),
    #[error("unresolved type reference: {0}")]
    UnresolvedType(String),
    #[error("field {0} has no type name")]
    MissingTypeName(String),
    #[error("malformed map entry: {0}")]
    MalformedMapEntry(String),
}
