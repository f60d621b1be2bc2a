// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::sync::Arc;

// Third-party crates
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use probe_descriptor::{DescriptorRegistry, MessageDescriptor, MethodDescriptor, StreamingMode, Value};
use probe_memory::AdaptiveMemory;

use crate::call::{CallHandle, CallStatus, MethodCall};
use crate::channel::Channel;
use crate::codec::MessageCodec;
use crate::errors::DispatchError;

/// Executes calls against a channel backend and keeps the observed
/// request/response values flowing back into the adaptive memory.
pub struct Dispatcher {
    registry: Arc<DescriptorRegistry>,
    codec: Arc<dyn MessageCodec>,
    memory: Arc<AdaptiveMemory>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        codec: Arc<dyn MessageCodec>,
        memory: Arc<AdaptiveMemory>,
    ) -> Self {
        Dispatcher {
            registry,
            codec,
            memory,
        }
    }

    /// Start one call. Unsupported streaming modes fail synchronously,
    /// before any channel activity. The returned handle exposes the
    /// eventual response, status and metadata, and cancellation.
    pub fn dispatch(
        &self,
        method: &MethodDescriptor,
        input: Value,
        channel: Arc<dyn Channel>,
        request_metadata: Vec<(String, String)>,
        target_url: Option<String>,
    ) -> Result<CallHandle, DispatchError> {
        if matches!(
            method.mode,
            StreamingMode::ClientStreaming | StreamingMode::BidiStreaming
        ) {
            return Err(DispatchError::Unsupported(format!(
                "{:?} calls are not supported",
                method.mode
            )));
        }
        if !channel.supports(method.mode) {
            return Err(DispatchError::Unsupported(format!(
                "{:?} calls are not supported on the {} channel",
                method.mode,
                channel.id()
            )));
        }

        let input_desc = self.message(&method.input_type)?;
        let output_desc = self.message(&method.output_type)?;

        let handle = CallHandle::new(MethodCall {
            service: method.service.clone(),
            method: method.name.clone(),
            input: input.clone(),
            output: None,
            error: None,
            request_metadata: request_metadata.clone(),
            response_metadata: vec![],
            target_url,
            status: CallStatus::Pending,
        });

        debug!(call = %handle.id(), method = %method.grpc_path(), "dispatching");

        let task = CallTask {
            method: method.clone(),
            input_desc,
            output_desc,
            input,
            metadata: request_metadata,
            channel,
            codec: self.codec.clone(),
            memory: self.memory.clone(),
            handle: handle.clone(),
        };
        tokio::spawn(task.run());

        Ok(handle)
    }

    fn message(&self, type_name: &str) -> Result<MessageDescriptor, DispatchError> {
        self.registry
            .message(type_name)
            .map(|m| m.clone())
            .map_err(|e| DispatchError::Descriptor(e.to_string()))
    }
}

struct CallTask {
    method: MethodDescriptor,
    input_desc: MessageDescriptor,
    output_desc: MessageDescriptor,
    input: Value,
    metadata: Vec<(String, String)>,
    channel: Arc<dyn Channel>,
    codec: Arc<dyn MessageCodec>,
    memory: Arc<AdaptiveMemory>,
    handle: CallHandle,
}

impl CallTask {
    async fn run(self) {
        let token = self.handle.cancellation();

        let request = match self.codec.encode(&self.input_desc, &self.input) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.handle.finish(CallStatus::Failed, Some(e));
                return;
            }
        };
        // The dispatched request is an observed value: remember it.
        self.memory.capture(&self.input_desc.type_name, &self.input);

        if self.method.mode == StreamingMode::Unary {
            self.run_unary(request, token).await;
        } else {
            self.run_server_stream(request, token).await;
        }
    }

    async fn run_unary(&self, request: Bytes, token: CancellationToken) {
        let result = tokio::select! {
            _ = token.cancelled() => {
                self.handle.finish(CallStatus::Cancelled, None);
                return;
            }
            r = self.channel.unary(&self.method, request, &self.metadata) => r,
        };

        match result {
            Ok(reply) => match self.codec.decode(&self.output_desc, &reply.payload) {
                Ok(value) => {
                    self.memory.capture(&self.output_desc.type_name, &value);
                    self.handle.update(|call| {
                        call.output = Some(value);
                        call.response_metadata = reply.metadata;
                    });
                    self.handle.finish(CallStatus::Complete, None);
                }
                Err(e) => self.handle.finish(CallStatus::Failed, Some(e)),
            },
            Err(e) => self.handle.finish(CallStatus::Failed, Some(e)),
        }
    }

    async fn run_server_stream(
        &self,
        request: Bytes,
        token: CancellationToken,
    ) {
        // The channel holds the token while opening so it can release
        // its transport resources before reporting cancellation.
        let opened = self
            .channel
            .server_stream(&self.method, request, &self.metadata, token.clone())
            .await;

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(DispatchError::Cancelled) => {
                self.handle.finish(CallStatus::Cancelled, None);
                return;
            }
            Err(e) => {
                self.handle.finish(CallStatus::Failed, Some(e));
                return;
            }
        };

        loop {
            let item = tokio::select! {
                _ = token.cancelled() => {
                    self.handle.finish(CallStatus::Cancelled, None);
                    return;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(payload)) => match self.codec.decode(&self.output_desc, &payload) {
                    Ok(value) => {
                        self.memory.capture(&self.output_desc.type_name, &value);
                        // Each arriving message replaces the call's
                        // output in place.
                        self.handle.update(|call| call.output = Some(value));
                    }
                    Err(e) => {
                        self.handle.finish(CallStatus::Failed, Some(e));
                        return;
                    }
                },
                Some(Err(e)) => {
                    self.handle.finish(CallStatus::Failed, Some(e));
                    return;
                }
                None => {
                    self.handle.finish(CallStatus::Complete, None);
                    return;
                }
            }
        }
    }
}
