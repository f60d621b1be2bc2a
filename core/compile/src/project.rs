// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Third-party crates
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use probe_descriptor::DescriptorRegistry;

use crate::api::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Twirp,
    Grpc,
}

/// One configured RPC target.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub protocol: Protocol,
    pub url: String,
    pub proto_dir: Option<String>,
    /// Reflection-based discovery runs a reflect step before compiling.
    pub reflect: bool,
    pub compilation: Compilation,
}

impl Project {
    pub fn new(name: impl Into<String>, protocol: Protocol, url: impl Into<String>) -> Self {
        Project {
            name: name.into(),
            protocol,
            url: url.into(),
            proto_dir: None,
            reflect: false,
            compilation: Compilation::Pending,
        }
    }

    pub fn with_proto_dir(mut self, proto_dir: impl Into<String>) -> Self {
        self.proto_dir = Some(proto_dir.into());
        self
    }

    pub fn with_reflection(mut self) -> Self {
        self.reflect = true;
        self
    }
}

/// Per-project compilation state machine:
/// pending -> running -> success | error.
#[derive(Debug, Clone, Default)]
pub enum Compilation {
    #[default]
    Pending,
    Running {
        logs: Vec<LogEntry>,
        /// Number of log entries already consumed, monotonic.
        log_offset: usize,
        started_at: Instant,
    },
    Success {
        registry: Arc<DescriptorRegistry>,
        sources: Vec<String>,
        logs: Vec<LogEntry>,
        duration: Duration,
    },
    Error {
        logs: Vec<LogEntry>,
        duration: Duration,
    },
}

impl Compilation {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Compilation::Success { .. } | Compilation::Error { .. })
    }

    pub fn logs(&self) -> &[LogEntry] {
        match self {
            Compilation::Pending => &[],
            Compilation::Running { logs, .. }
            | Compilation::Success { logs, .. }
            | Compilation::Error { logs, .. } => logs,
        }
    }

    pub fn registry(&self) -> Option<Arc<DescriptorRegistry>> {
        match self {
            Compilation::Success { registry, .. } => Some(registry.clone()),
            _ => None,
        }
    }
}
