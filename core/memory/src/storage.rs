// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::collections::HashMap;

// Third-party crates
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::MemoryError;

/// Durable key/value backend for the memory snapshot. Durability
/// guarantees are the backend's business; callers only rely on the
/// get/set/delete contract.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError>;
    async fn set(&self, key: &str, value: String) -> Result<(), MemoryError>;
    async fn delete(&self, key: &str) -> Result<(), MemoryError>;
}

/// Process-local storage backend. The default when no durable backend is
/// wired in, and the workhorse of the tests.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), MemoryError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
