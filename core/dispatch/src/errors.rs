// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Call-level error taxonomy. Cancellation is a terminal no-op state,
/// deliberately distinct from failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Connection or decode failure, wrapped with the channel identity.
    #[error("transport error on {channel} channel: {message}")]
    Transport { channel: String, message: String },
    /// Non-success RPC status with the extracted code and message.
    #[error("rpc error {code}: {message}")]
    Protocol { code: String, message: String },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("descriptor error: {0}")]
    Descriptor(String),
    /// Unsupported streaming mode; fails fast, never silently degrades.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("call cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn transport(channel: &str, message: impl Into<String>) -> Self {
        DispatchError::Transport {
            channel: channel.to_string(),
            message: message.into(),
        }
    }
}
