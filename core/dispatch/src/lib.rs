// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod call;
pub mod channel;
pub mod codec;
pub mod console;
pub mod dispatcher;
pub mod errors;
pub mod host;
pub mod http;

pub use call::{CallHandle, CallStatus, MethodCall};
pub use channel::{ByteStream, Channel, UnaryReply};
pub use codec::MessageCodec;
pub use console::{Console, ConsoleItem};
pub use dispatcher::Dispatcher;
pub use errors::DispatchError;
pub use host::{HostBridge, HostChannel};
pub use http::HttpChannel;
