// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod errors;
pub mod synthesizer;

pub use errors::SynthError;
pub use synthesizer::synthesize;
