// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::sync::Arc;

// Third-party crates
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use probe_descriptor::Value;

use crate::errors::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Pending,
    Complete,
    Failed,
    Cancelled,
}

/// One invocation attempt, mutated in place as the response or error
/// arrives and retained for console history.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub service: String,
    pub method: String,
    pub input: Value,
    /// Latest decoded response message; replaced per message on a
    /// server-streaming call.
    pub output: Option<Value>,
    pub error: Option<DispatchError>,
    pub request_metadata: Vec<(String, String)>,
    pub response_metadata: Vec<(String, String)>,
    pub target_url: Option<String>,
    pub status: CallStatus,
}

/// Shared handle to an in-flight call. Identity is by reference: every
/// clone observes updates made through any other clone.
#[derive(Clone, Debug)]
pub struct CallHandle {
    id: Uuid,
    state: Arc<RwLock<MethodCall>>,
    token: CancellationToken,
    done: Arc<watch::Sender<bool>>,
}

impl CallHandle {
    pub(crate) fn new(call: MethodCall) -> Self {
        let (done, _) = watch::channel(false);
        CallHandle {
            id: Uuid::new_v4(),
            state: Arc::new(RwLock::new(call)),
            token: CancellationToken::new(),
            done: Arc::new(done),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> MethodCall {
        self.state.read().clone()
    }

    pub fn status(&self) -> CallStatus {
        self.state.read().status
    }

    /// Request cancellation. Idempotent; a no-op after natural
    /// completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait until the call reaches a terminal state.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut MethodCall)) {
        f(&mut self.state.write());
    }

    pub(crate) fn finish(&self, status: CallStatus, error: Option<DispatchError>) {
        {
            let mut call = self.state.write();
            call.status = status;
            call.error = error;
        }
        self.done.send_replace(true);
    }
}
