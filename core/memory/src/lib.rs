// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod errors;
pub mod memory;
pub mod snapshot;
pub mod storage;

pub use errors::MemoryError;
pub use memory::AdaptiveMemory;
pub use snapshot::{FieldMemory, MemorizedValue, MemorySnapshot};
pub use storage::{InMemoryStorage, Storage};
