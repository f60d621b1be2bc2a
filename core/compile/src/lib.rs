// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod api;
pub mod errors;
pub mod orchestrator;
pub mod project;

pub use api::{
    CompileRequest, CompileResponse, CompileStatus, CompilerClient, LogEntry, LogLevel,
    ReflectRequest,
};
pub use errors::CompileError;
pub use orchestrator::Orchestrator;
pub use project::{Compilation, Project, Protocol};
