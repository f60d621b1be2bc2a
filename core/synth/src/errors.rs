// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use probe_descriptor::DescriptorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    /// An enum or message reference could not be resolved against the
    /// loaded descriptor set. Fatal for the whole synthesis.
    #[error("descriptor resolution error: {0}")]
    DescriptorResolution(#[from] DescriptorError),
    #[error("enum {0} declares no values")]
    EmptyEnum(String),
}
