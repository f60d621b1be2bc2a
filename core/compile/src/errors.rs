// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use probe_descriptor::DescriptorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("reflection failed: {0}")]
    Reflect(String),
    #[error("compiler request failed: {0}")]
    Request(String),
    #[error("compilation failed")]
    Failed,
    #[error("descriptor loading failed: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
}
