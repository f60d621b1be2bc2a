// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use probe_compile::LogEntry;

use crate::call::CallHandle;

/// One console history entry, pattern-matched exhaustively by consumers.
pub enum ConsoleItem {
    /// A batch of compilation log entries.
    Logs(Vec<LogEntry>),
    /// A call record; updated in place while the call is in flight.
    Call(CallHandle),
}

/// Ordered console history. Items keep their emission order; pushing a
/// call that is already present replaces it in place instead of
/// duplicating it.
#[derive(Default)]
pub struct Console {
    items: Vec<ConsoleItem>,
}

impl Console {
    pub fn new() -> Self {
        Console::default()
    }

    pub fn push_logs(&mut self, logs: Vec<LogEntry>) {
        self.items.push(ConsoleItem::Logs(logs));
    }

    pub fn push_call(&mut self, call: CallHandle) {
        let existing = self.items.iter_mut().find(|item| match item {
            ConsoleItem::Call(present) => present.id() == call.id(),
            ConsoleItem::Logs(_) => false,
        });
        match existing {
            Some(slot) => *slot = ConsoleItem::Call(call),
            None => self.items.push(ConsoleItem::Call(call)),
        }
    }

    pub fn items(&self) -> &[ConsoleItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
