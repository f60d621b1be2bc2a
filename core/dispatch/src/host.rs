// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::sync::Arc;

// Third-party crates
use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use probe_descriptor::{MethodDescriptor, StreamingMode};

use crate::channel::{ByteStream, Channel, UnaryReply};
use crate::errors::DispatchError;

const CHANNEL_ID: &str = "host";
/// Error reported when the bridge drops a stream topic without an
/// explicit end or error event.
const BUS_CLOSED: &str = "host event bus closed";

/// Event topic carrying one base64-encoded message per event.
pub fn message_topic(stream_id: &str) -> String {
    format!("stream:{stream_id}")
}

/// Event topic signalling successful stream completion, no payload.
pub fn end_topic(stream_id: &str) -> String {
    format!("stream:{stream_id}:end")
}

/// Event topic signalling stream failure, with the error message.
pub fn error_topic(stream_id: &str) -> String {
    format!("stream:{stream_id}:error")
}

/// Bridge into the embedding host: a named synchronous call boundary, a
/// topic-keyed event bus, and an explicit stream cancel command.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Unary exchange: the bridge returns the encoded response over its
    /// call boundary.
    async fn call(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError>;

    /// Open a logical server stream identified by `stream_id`; messages
    /// arrive on the stream's event topics.
    async fn open_stream(
        &self,
        method: &str,
        stream_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), DispatchError>;

    async fn cancel_stream(&self, stream_id: &str) -> Result<(), DispatchError>;

    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<String>;

    fn unsubscribe(&self, topic: &str);
}

/// Embedded-host channel. Client- and bidirectional-streaming are not
/// expressible over the bridge's call boundary and fail fast.
pub struct HostChannel {
    bridge: Arc<dyn HostBridge>,
}

impl HostChannel {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        HostChannel { bridge }
    }
}

#[async_trait]
impl Channel for HostChannel {
    fn id(&self) -> &'static str {
        CHANNEL_ID
    }

    fn supports(&self, mode: StreamingMode) -> bool {
        matches!(mode, StreamingMode::Unary | StreamingMode::ServerStreaming)
    }

    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        _metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError> {
        let payload = self
            .bridge
            .call(&method.grpc_path(), request.to_vec())
            .await?;
        Ok(UnaryReply {
            payload: Bytes::from(payload),
            metadata: vec![],
        })
    }

    async fn server_stream(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        _metadata: &[(String, String)],
        token: CancellationToken,
    ) -> Result<ByteStream, DispatchError> {
        let stream_id = Uuid::new_v4().to_string();
        let topics = [
            message_topic(&stream_id),
            end_topic(&stream_id),
            error_topic(&stream_id),
        ];

        // Subscribe before opening so no early event is lost.
        let mut messages = self.bridge.subscribe(&topics[0]);
        let mut ended = self.bridge.subscribe(&topics[1]);
        let mut errored = self.bridge.subscribe(&topics[2]);

        let grpc_path = method.grpc_path();
        let opened = tokio::select! {
            _ = token.cancelled() => {
                // The host may already have opened the stream; the cancel
                // command covers that case and is a no-op otherwise.
                if let Err(e) = self.bridge.cancel_stream(&stream_id).await {
                    warn!(stream = %stream_id, error = %e, "host stream cancel failed");
                }
                Err(DispatchError::Cancelled)
            }
            r = self.bridge.open_stream(&grpc_path, &stream_id, request.to_vec()) => r,
        };
        if let Err(e) = opened {
            for topic in &topics {
                self.bridge.unsubscribe(topic);
            }
            return Err(e);
        }

        debug!(stream = %stream_id, method = %method.name, "host stream opened");

        let (tx, rx) = mpsc::channel::<Result<Bytes, DispatchError>>(32);
        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        // The cancel command goes out exactly once; the
                        // pump terminates, so later cancels are no-ops.
                        if let Err(e) = bridge.cancel_stream(&stream_id).await {
                            warn!(stream = %stream_id, error = %e, "host stream cancel failed");
                        }
                        break;
                    }
                    event = messages.recv() => match event {
                        Some(encoded) => {
                            let item = BASE64_STANDARD
                                .decode(&encoded)
                                .map(Bytes::from)
                                .map_err(|e| {
                                    DispatchError::transport(CHANNEL_ID, e.to_string())
                                });
                            let failed = item.is_err();
                            if tx.send(item).await.is_err() || failed {
                                break;
                            }
                        }
                        // A dropped topic is a detached host, not an end.
                        None => {
                            let _ = tx
                                .send(Err(DispatchError::transport(CHANNEL_ID, BUS_CLOSED)))
                                .await;
                            break;
                        }
                    },
                    event = ended.recv() => match event {
                        Some(_) => break,
                        None => {
                            let _ = tx
                                .send(Err(DispatchError::transport(CHANNEL_ID, BUS_CLOSED)))
                                .await;
                            break;
                        }
                    },
                    event = errored.recv() => {
                        let message = event.unwrap_or_else(|| BUS_CLOSED.to_string());
                        let _ = tx
                            .send(Err(DispatchError::transport(CHANNEL_ID, message)))
                            .await;
                        break;
                    }
                }
            }
            for topic in &[
                message_topic(&stream_id),
                end_topic(&stream_id),
                error_topic(&stream_id),
            ] {
                bridge.unsubscribe(topic);
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
