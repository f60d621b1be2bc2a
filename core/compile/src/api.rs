// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Third-party crates
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CompileError;

/// Status reported by the compiler service on each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompileStatus {
    Unknown,
    Ready,
    Error,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub index: u64,
    pub level: LogLevel,
}

/// One compilation poll. `log_offset` is the number of log entries the
/// caller has already consumed; the compiler returns only newer entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub log_offset: usize,
    pub force: bool,
    pub project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proto_dir: Option<String>,
}

/// Reflection-based discovery supplies the target URL instead of a proto
/// source location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectRequest {
    pub project_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub status: CompileStatus,
    pub logs: Vec<LogEntry>,
    /// Generated source texts, complete on a terminal status.
    pub sources: Vec<String>,
    /// Loadable stub artifact: an encoded `FileDescriptorSet`.
    pub stub: Vec<u8>,
}

/// The proto-to-stub compiler is a separate service; the orchestrator
/// only consumes its status/log stream and output artifacts.
#[async_trait]
pub trait CompilerClient: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileResponse, CompileError>;
    async fn reflect(&self, request: &ReflectRequest) -> Result<CompileResponse, CompileError>;
}
