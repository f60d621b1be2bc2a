// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

use probe_descriptor::{MessageDescriptor, Value};

use crate::errors::DispatchError;

/// Message wire encoding is an external capability: the dispatcher only
/// needs a way to turn a value tree into payload bytes and back for a
/// given message descriptor.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &MessageDescriptor, value: &Value) -> Result<Bytes, DispatchError>;
    fn decode(&self, message: &MessageDescriptor, payload: &[u8]) -> Result<Value, DispatchError>;
}
