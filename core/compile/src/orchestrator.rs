// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

// Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Third-party crates
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use probe_descriptor::DescriptorRegistry;

use crate::api::{CompileRequest, CompileStatus, CompilerClient, LogEntry, LogLevel, ReflectRequest};
use crate::errors::CompileError;
use crate::project::{Compilation, Project};

/// Fixed delay between two compilation polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drives every project's compilation state machine. Each project has at
/// most one active compilation, bounded by its own cancellation token;
/// the shared project map is always updated read-modify-write against
/// the latest state so concurrent compilations never lose updates.
pub struct Orchestrator {
    projects: Arc<RwLock<HashMap<String, Project>>>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
    compiler: Arc<dyn CompilerClient>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(compiler: Arc<dyn CompilerClient>) -> Self {
        Orchestrator {
            projects: Arc::new(RwLock::new(HashMap::new())),
            tokens: Mutex::new(HashMap::new()),
            compiler,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn add_project(&self, project: Project) {
        self.projects.write().insert(project.name.clone(), project);
    }

    pub fn remove_project(&self, name: &str) {
        if let Some(token) = self.tokens.lock().remove(name) {
            token.cancel();
        }
        self.projects.write().remove(name);
    }

    pub fn project(&self, name: &str) -> Option<Project> {
        self.projects.read().get(name).cloned()
    }

    /// Descriptors of the last successful compilation, if any.
    pub fn registry(&self, name: &str) -> Option<Arc<DescriptorRegistry>> {
        self.projects
            .read()
            .get(name)
            .and_then(|p| p.compilation.registry())
    }

    /// Start (or restart) the compilation of one project. Any in-flight
    /// compilation for the same project is cancelled first.
    pub fn start_compilation(
        &self,
        name: &str,
        force: bool,
    ) -> Result<JoinHandle<()>, CompileError> {
        let project = self
            .project(name)
            .ok_or_else(|| CompileError::ProjectNotFound(name.to_string()))?;

        let token = CancellationToken::new();
        if let Some(previous) = self
            .tokens
            .lock()
            .insert(name.to_string(), token.clone())
        {
            previous.cancel();
        }

        // Entering running resets the log offset.
        let started_at = Instant::now();
        update_state(
            &self.projects,
            name,
            Compilation::Running {
                logs: Vec::new(),
                log_offset: 0,
                started_at,
            },
        );

        let task = CompileTask {
            name: name.to_string(),
            force,
            reflect_url: project.reflect.then(|| project.url.clone()),
            proto_dir: project.proto_dir.clone(),
            logs: Vec::new(),
            offset: 0,
            started_at,
            token,
            poll_interval: self.poll_interval,
        };

        info!(project = %name, %force, "starting compilation");
        Ok(tokio::spawn(task.run(
            self.compiler.clone(),
            self.projects.clone(),
        )))
    }

    /// Abort every outstanding poll. No state is updated after this.
    pub fn shutdown(&self) {
        for (name, token) in self.tokens.lock().drain() {
            debug!(project = %name, "aborting compilation poll");
            token.cancel();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Explicit per-project state machine advanced by [`CompileTask::run`];
/// owns its cancellation token so no continuation runs on stale state.
struct CompileTask {
    name: String,
    force: bool,
    reflect_url: Option<String>,
    proto_dir: Option<String>,
    logs: Vec<LogEntry>,
    offset: usize,
    started_at: Instant,
    token: CancellationToken,
    poll_interval: Duration,
}

impl CompileTask {
    async fn run(
        mut self,
        compiler: Arc<dyn CompilerClient>,
        projects: Arc<RwLock<HashMap<String, Project>>>,
    ) {
        if let Some(url) = self.reflect_url.take() {
            let request = ReflectRequest {
                project_name: self.name.clone(),
                url,
            };
            let result = tokio::select! {
                _ = self.token.cancelled() => return,
                r = compiler.reflect(&request) => r,
            };
            // The response may have raced a shutdown or restart; never
            // write state for a cancelled run.
            if self.token.is_cancelled() {
                return;
            }
            match result {
                Ok(response) if response.status != CompileStatus::Error => {
                    // Reflect logs precede the compile stream and do not
                    // count toward its offset.
                    self.logs.extend(response.logs);
                }
                Ok(response) => {
                    self.logs.extend(response.logs);
                    warn!(project = %self.name, "reflection reported an error");
                    self.fail(&projects);
                    return;
                }
                Err(e) => {
                    warn!(project = %self.name, error = %e, "reflection failed");
                    self.push_error_log(e.to_string());
                    self.fail(&projects);
                    return;
                }
            }
        }

        loop {
            if self.token.is_cancelled() {
                return;
            }

            let request = CompileRequest {
                log_offset: self.offset,
                force: self.force,
                project_name: self.name.clone(),
                proto_dir: self.proto_dir.clone(),
            };
            // A forced recompilation is only requested once per run.
            self.force = false;

            let result = tokio::select! {
                _ = self.token.cancelled() => return,
                r = compiler.compile(&request) => r,
            };
            // Same race as above: a poll that resolved together with a
            // cancellation must not reach update_state.
            if self.token.is_cancelled() {
                return;
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(project = %self.name, error = %e, "compiler request failed");
                    self.push_error_log(e.to_string());
                    self.fail(&projects);
                    return;
                }
            };

            self.offset += response.logs.len();
            self.logs.extend(response.logs);

            match response.status {
                CompileStatus::Running | CompileStatus::Unknown => {
                    update_state(
                        &projects,
                        &self.name,
                        Compilation::Running {
                            logs: self.logs.clone(),
                            log_offset: self.offset,
                            started_at: self.started_at,
                        },
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => return,
                        _ = time::sleep(self.poll_interval) => {}
                    }
                }
                CompileStatus::Ready => {
                    // Descriptors load exactly once, on the terminal poll.
                    match DescriptorRegistry::from_stub(&response.stub) {
                        Ok(registry) => {
                            info!(
                                project = %self.name,
                                services = registry.services().len(),
                                "compilation succeeded"
                            );
                            update_state(
                                &projects,
                                &self.name,
                                Compilation::Success {
                                    registry: Arc::new(registry),
                                    sources: response.sources,
                                    logs: std::mem::take(&mut self.logs),
                                    duration: self.started_at.elapsed(),
                                },
                            );
                        }
                        Err(e) => {
                            warn!(project = %self.name, error = %e, "stub loading failed");
                            self.push_error_log(e.to_string());
                            self.fail(&projects);
                        }
                    }
                    return;
                }
                CompileStatus::Error => {
                    self.fail(&projects);
                    return;
                }
            }
        }
    }

    fn push_error_log(&mut self, message: String) {
        let index = self.logs.len() as u64;
        self.logs.push(LogEntry {
            message,
            index,
            level: LogLevel::Error,
        });
    }

    fn fail(&mut self, projects: &Arc<RwLock<HashMap<String, Project>>>) {
        update_state(
            projects,
            &self.name,
            Compilation::Error {
                logs: std::mem::take(&mut self.logs),
                duration: self.started_at.elapsed(),
            },
        );
    }
}

fn update_state(
    projects: &Arc<RwLock<HashMap<String, Project>>>,
    name: &str,
    compilation: Compilation,
) {
    let mut projects = projects.write();
    match projects.get_mut(name) {
        Some(project) => project.compilation = compilation,
        // Deleted while compiling; nothing to update.
        None => debug!(project = %name, "skipping state update for removed project"),
    }
}
