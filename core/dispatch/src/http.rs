// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Third-party crates
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use futures::StreamExt;
use http::uri::PathAndQuery;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{KeyAndValueRef, MetadataKey, MetadataValue};
use tonic::transport::Endpoint;
use tracing::warn;

use probe_compile::Protocol;
use probe_descriptor::{MethodDescriptor, StreamingMode};

use crate::channel::{ByteStream, Channel, UnaryReply};
use crate::errors::DispatchError;

const CHANNEL_ID: &str = "http";

/// HTTP-based channel: Twirp over plain POST exchanges, gRPC through a
/// raw-bytes tonic client. Payload encoding is the codec's business;
/// this channel moves opaque bytes.
pub struct HttpChannel {
    protocol: Protocol,
    base_url: String,
    client: reqwest::Client,
    grpc: Option<tonic::transport::Channel>,
}

impl HttpChannel {
    pub fn new(protocol: Protocol, base_url: impl Into<String>) -> Result<Self, DispatchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let grpc = match protocol {
            Protocol::Grpc => Some(
                Endpoint::from_shared(base_url.clone())
                    .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?
                    .connect_lazy(),
            ),
            Protocol::Twirp => None,
        };
        Ok(HttpChannel {
            protocol,
            base_url,
            client: reqwest::Client::new(),
            grpc,
        })
    }

    fn twirp_url(&self, method: &MethodDescriptor) -> String {
        format!("{}/twirp/{}/{}", self.base_url, method.service, method.name)
    }

    async fn twirp_unary(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError> {
        let mut builder = self
            .client
            .post(self.twirp_url(method))
            .header(http::header::CONTENT_TYPE, "application/protobuf")
            .body(request.to_vec());
        for (name, value) in metadata {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;

        let status = response.status();
        let reply_metadata = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;

        if !status.is_success() {
            return Err(DispatchError::Protocol {
                code: status.as_u16().to_string(),
                message: http_error_message(status, &body),
            });
        }

        Ok(UnaryReply {
            payload: body,
            metadata: reply_metadata,
        })
    }

    fn grpc_client(&self) -> Result<tonic::client::Grpc<tonic::transport::Channel>, DispatchError> {
        match &self.grpc {
            Some(channel) => Ok(tonic::client::Grpc::new(channel.clone())),
            None => Err(DispatchError::Unsupported(
                "gRPC exchange on a twirp channel".to_string(),
            )),
        }
    }

    async fn grpc_unary(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError> {
        let mut grpc = self.grpc_client()?;
        grpc.ready()
            .await
            .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;

        let path = method.grpc_path();
        let path = PathAndQuery::try_from(path.as_str())
            .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;

        let response = grpc
            .unary(grpc_request(request, metadata), path, RawCodec)
            .await
            .map_err(status_to_error)?;

        let reply_metadata = grpc_metadata(response.metadata());
        Ok(UnaryReply {
            payload: response.into_inner(),
            metadata: reply_metadata,
        })
    }

    async fn grpc_server_stream(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
        token: CancellationToken,
    ) -> Result<ByteStream, DispatchError> {
        let mut grpc = self.grpc_client()?;
        let path = method.grpc_path();
        let path = PathAndQuery::try_from(path.as_str())
            .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;

        let exchange = async {
            grpc.ready()
                .await
                .map_err(|e| DispatchError::transport(CHANNEL_ID, e.to_string()))?;
            grpc.server_streaming(grpc_request(request, metadata), path, RawCodec)
                .await
                .map_err(status_to_error)
        };
        // Dropping the exchange aborts it; no explicit cancel command
        // exists on this path.
        let response = tokio::select! {
            _ = token.cancelled() => return Err(DispatchError::Cancelled),
            r = exchange => r?,
        };

        let stream = response
            .into_inner()
            .map(|item| item.map_err(status_to_error));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl Channel for HttpChannel {
    fn id(&self) -> &'static str {
        CHANNEL_ID
    }

    fn supports(&self, mode: StreamingMode) -> bool {
        match self.protocol {
            Protocol::Twirp => mode == StreamingMode::Unary,
            Protocol::Grpc => {
                matches!(mode, StreamingMode::Unary | StreamingMode::ServerStreaming)
            }
        }
    }

    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
    ) -> Result<UnaryReply, DispatchError> {
        match self.protocol {
            Protocol::Twirp => self.twirp_unary(method, request, metadata).await,
            Protocol::Grpc => self.grpc_unary(method, request, metadata).await,
        }
    }

    async fn server_stream(
        &self,
        method: &MethodDescriptor,
        request: Bytes,
        metadata: &[(String, String)],
        token: CancellationToken,
    ) -> Result<ByteStream, DispatchError> {
        match self.protocol {
            Protocol::Twirp => Err(DispatchError::Unsupported(
                "server streaming on a twirp channel".to_string(),
            )),
            Protocol::Grpc => {
                self.grpc_server_stream(method, request, metadata, token)
                    .await
            }
        }
    }
}

fn grpc_request(request: Bytes, metadata: &[(String, String)]) -> tonic::Request<Bytes> {
    let mut req = tonic::Request::new(request);
    for (name, value) in metadata {
        match (
            MetadataKey::from_bytes(name.as_bytes()),
            MetadataValue::try_from(value.as_str()),
        ) {
            (Ok(key), Ok(value)) => {
                req.metadata_mut().insert(key, value);
            }
            _ => warn!(header = %name, "skipping invalid request metadata entry"),
        }
    }
    req
}

fn grpc_metadata(metadata: &tonic::metadata::MetadataMap) -> Vec<(String, String)> {
    metadata
        .iter()
        .filter_map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => Some((
                key.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )),
            KeyAndValueRef::Binary(..) => None,
        })
        .collect()
}

fn status_to_error(status: Status) -> DispatchError {
    DispatchError::Protocol {
        code: format!("{:?}", status.code()),
        message: status.message().to_string(),
    }
}

/// HTTP error bodies are JSON even when the channel is otherwise binary:
/// `{ "msg" | "message": string }`, with a generic fallback when no body
/// parses.
fn http_error_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    extract_error_message(body).unwrap_or_else(|| {
        format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
    })
}

fn extract_error_message(body: &[u8]) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_slice(body).ok()?;
    parsed
        .get("msg")
        .or_else(|| parsed.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

/// Pass-through tonic codec: payload bytes go on the wire untouched in
/// both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Status> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}
