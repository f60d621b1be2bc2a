// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::collections::HashMap;

// Third-party crates
use serde::{Deserialize, Serialize};

use probe_descriptor::{ScalarClass, Value};

/// Maximum number of remembered values per (key, field).
pub const MAX_VALUES_PER_FIELD: usize = 10;
/// Maximum number of distinct message types tracked before the least
/// recently captured types are evicted wholesale.
pub const MAX_TRACKED_TYPES: usize = 500;
/// Window over which the recency bonus decays linearly from 1 to 0.
pub const RECENCY_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Persisted layout version; older layouts are discarded on load.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One remembered scalar leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorizedValue {
    pub value: Value,
    pub count: u32,
    /// Epoch milliseconds of the last capture of this value.
    pub last_used: u64,
}

impl MemorizedValue {
    /// Combined score: observation count plus a recency bonus decaying
    /// linearly from 1 to 0 over the 7-day window.
    pub fn score(&self, now: u64) -> f64 {
        let age = now.saturating_sub(self.last_used);
        let bonus = 1.0 - (age as f64 / RECENCY_WINDOW_MS as f64);
        self.count as f64 + bonus.clamp(0.0, 1.0)
    }
}

/// Bounded, score-ordered set of remembered values for one field key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMemory {
    pub values: Vec<MemorizedValue>,
}

impl FieldMemory {
    fn record(&mut self, value: &Value, now: u64) {
        match self.values.iter_mut().find(|m| &m.value == value) {
            Some(existing) => {
                existing.count += 1;
                existing.last_used = now;
            }
            None => self.values.push(MemorizedValue {
                value: value.clone(),
                count: 1,
                last_used: now,
            }),
        }
        self.values
            .sort_by(|a, b| b.score(now).total_cmp(&a.score(now)));
        self.values.truncate(MAX_VALUES_PER_FIELD);
    }

    fn best(&self, now: u64) -> Option<&Value> {
        self.values
            .iter()
            .max_by(|a, b| a.score(now).total_cmp(&b.score(now)))
            .map(|m| &m.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TypeEntry {
    fields: HashMap<String, FieldMemory>,
    /// Most recent capture for this type, used for whole-type eviction.
    last_capture: u64,
}

/// In-memory view of the whole value memory. Pure data plus the scoring,
/// capping and eviction rules; locking and persistence live in
/// [`crate::memory::AdaptiveMemory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub version: u32,
    types: HashMap<String, TypeEntry>,
    scalars: HashMap<String, FieldMemory>,
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        MemorySnapshot {
            version: SNAPSHOT_VERSION,
            types: HashMap::new(),
            scalars: HashMap::new(),
        }
    }
}

fn scalar_key(class: ScalarClass, field_name: &str) -> String {
    format!("{}/{}", class.as_str(), field_name)
}

impl MemorySnapshot {
    /// Record every scalar leaf of `value` under both the typed key
    /// (message type + field path) and the cross-type scalar key
    /// (scalar class + local field name).
    pub fn capture_at(&mut self, type_name: &str, value: &Value, now: u64) {
        let entry = self.types.entry(type_name.to_string()).or_default();
        entry.last_capture = now;

        let mut scalar_updates: Vec<(String, Value)> = Vec::new();
        value.walk_leaves(&mut |path, leaf| {
            entry
                .fields
                .entry(path.to_string())
                .or_default()
                .record(leaf, now);
            if let Some(class) = ScalarClass::of_value(leaf) {
                scalar_updates.push((
                    scalar_key(class, Value::local_field_name(path)),
                    leaf.clone(),
                ));
            }
        });
        for (key, leaf) in scalar_updates {
            self.scalars.entry(key).or_default().record(&leaf, now);
        }

        self.evict_excess_types();
    }

    fn evict_excess_types(&mut self) {
        if self.types.len() <= MAX_TRACKED_TYPES {
            return;
        }
        let mut by_age: Vec<(String, u64)> = self
            .types
            .iter()
            .map(|(name, entry)| (name.clone(), entry.last_capture))
            .collect();
        by_age.sort_by_key(|(_, last)| *last);
        let excess = self.types.len() - MAX_TRACKED_TYPES;
        for (name, _) in by_age.into_iter().take(excess) {
            self.types.remove(&name);
        }
    }

    pub fn best_for_field_at(&self, type_name: &str, path: &str, now: u64) -> Option<&Value> {
        self.types
            .get(type_name)
            .and_then(|entry| entry.fields.get(path))
            .and_then(|field| field.best(now))
    }

    pub fn best_for_scalar_at(
        &self,
        class: ScalarClass,
        field_name: &str,
        now: u64,
    ) -> Option<&Value> {
        self.scalars
            .get(&scalar_key(class, field_name))
            .and_then(|field| field.best(now))
    }

    pub fn tracked_types(&self) -> usize {
        self.types.len()
    }
}
