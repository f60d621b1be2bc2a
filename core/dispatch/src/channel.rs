// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::pin::Pin;

// Third-party crates
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use probe_descriptor::{MethodDescriptor, StreamingMode};

use crate::errors::DispatchError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DispatchError>> + Send>>;

/// Normalized unary result: response payload plus response metadata.
#[derive(Debug, Clone, Default)]
pub struct UnaryReply {
    pub payload: Bytes,
    pub metadata: Vec<(String, String)>,
}

/// A transport backend capable of executing one call. The dispatcher
/// normalizes the result shape across backends.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel identity used when wrapping transport errors.
    fn id(&self) -> &'static str;

    fn supports(&self, mode: StreamingMode) -> bool;

    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError>;

    /// Open a server-streaming exchange. The token lets backends with an
    /// explicit cancel command (the host bridge) propagate aborts.
    async fn server_stream(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
        token: CancellationToken,
    ) -> Result<ByteStream, DispatchError>;
}
