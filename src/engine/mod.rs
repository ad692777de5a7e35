// src/engine/mod.rs

//! Execution core facade.
//!
//! [`Engine`] owns the three process-wide stores (variables, named locks,
//! running processes) and the [`CommandBuilder`], and exposes the
//! operations request handlers and the supervisor call into:
//! - [`Engine::execute`] / [`Engine::execute_locked`] / [`Engine::execute_to`]
//! - [`Engine::acquire_and_execute`]
//! - [`Engine::expand`]
//! - [`Engine::set_variable`], [`Engine::get_variable`],
//!   [`Engine::write_variable`]
//!
//! Callers are expected to have authenticated and authorized the request
//! before calling in; nothing here checks permissions.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, info_span, warn, Instrument};

use crate::config::{CommandSpec, ConfigFile, LockSpec};
use crate::errors::{ExecError, VarError};
use crate::exec::command::CommandBuilder;
use crate::exec::pipeline::{self, InputStream};
use crate::lock::LockManager;
use crate::supervisor::ProcessRegistry;
use crate::vars::{expand, Lookup, ParamResolver, RequestParams, VariableStore};

#[derive(Debug)]
pub struct Engine {
    vars: Arc<VariableStore>,
    locks: Arc<LockManager>,
    processes: Arc<ProcessRegistry>,
    builder: CommandBuilder,
    next_invocation: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(CommandBuilder::default())
    }
}

impl Engine {
    /// An engine with fresh, empty stores.
    pub fn new(builder: CommandBuilder) -> Self {
        Self::with_parts(
            Arc::new(VariableStore::new()),
            Arc::new(LockManager::new()),
            Arc::new(ProcessRegistry::new()),
            builder,
        )
    }

    pub fn with_parts(
        vars: Arc<VariableStore>,
        locks: Arc<LockManager>,
        processes: Arc<ProcessRegistry>,
        builder: CommandBuilder,
    ) -> Self {
        Self {
            vars,
            locks,
            processes,
            builder,
            next_invocation: AtomicU64::new(0),
        }
    }

    /// Build an engine for `cfg`, declaring its variables.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let builder = CommandBuilder::new(
            cfg.server.effective_shell(),
            cfg.server.effective_work_dir(),
        );
        let engine = Self::new(builder);
        for (key, decl) in cfg.vars.iter() {
            engine
                .vars
                .declare(key.clone(), decl.value.clone(), decl.expandable, decl.policy.clone());
        }
        engine
    }

    pub fn vars(&self) -> &Arc<VariableStore> {
        &self.vars
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn processes(&self) -> &Arc<ProcessRegistry> {
        &self.processes
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    /// Resolver for one invocation: variables first, then `request`.
    pub fn resolver<'a>(&'a self, request: Option<&'a RequestParams>) -> ParamResolver<'a> {
        ParamResolver::new(&self.vars, request)
    }

    /// Build and run `spec`, ignoring its lock.
    ///
    /// Foreground commands return their captured stdout. Background
    /// commands return an empty buffer as soon as they are spawned.
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        lookup: &dyn Lookup,
        input: Option<InputStream>,
    ) -> Result<Vec<u8>, ExecError> {
        let id = self.next_invocation.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("exec", id, lang = %spec.language, background = spec.background);

        async move {
            let built = self.builder.build(spec, lookup).inspect_err(|e| {
                warn!(error = %e, "build failed");
            })?;
            info!(argv = ?built.argv(), "command");

            if built.background {
                pipeline::spawn_background(&built, Arc::clone(&self.processes))?;
                return Ok(Vec::new());
            }

            let result = pipeline::run_foreground(&built, input, spec.timeout).await;
            match &result {
                Ok(_) => info!("execution done"),
                Err(e) => warn!(error = %e, "execution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// [`Engine::execute`] under the command's configured lock, if any.
    pub async fn execute_locked(
        &self,
        spec: &CommandSpec,
        lookup: &dyn Lookup,
        input: Option<InputStream>,
    ) -> Result<Vec<u8>, ExecError> {
        match &spec.lock {
            Some(lock) => {
                self.acquire_and_execute(lock, || self.execute(spec, lookup, input))
                    .await
            }
            None => self.execute(spec, lookup, input).await,
        }
    }

    /// [`Engine::execute_locked`], then write the output to `out`.
    ///
    /// Write failures are reported as [`ExecError::IoFailed`].
    pub async fn execute_to<W>(
        &self,
        spec: &CommandSpec,
        lookup: &dyn Lookup,
        input: Option<InputStream>,
        out: &mut W,
    ) -> Result<(), ExecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let output = self.execute_locked(spec, lookup, input).await?;
        out.write_all(&output)
            .await
            .map_err(|e| ExecError::IoFailed(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| ExecError::IoFailed(e.to_string()))
    }

    /// Run `body` while holding the named lock described by `lock`.
    pub async fn acquire_and_execute<F, Fut, T>(
        &self,
        lock: &LockSpec,
        body: F,
    ) -> Result<T, ExecError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ExecError>>,
    {
        self.locks.acquire(lock, body).await?
    }

    /// Expand `template` against `lookup`; see [`crate::vars::expand()`].
    pub fn expand<P>(&self, template: &str, lookup: &dyn Lookup, post: P) -> Option<String>
    where
        P: Fn(&str) -> String,
    {
        expand(template, lookup, post)
    }

    pub fn set_variable(&self, key: &str, value: &str, expandable: bool) {
        self.vars.set(key, value, expandable);
    }

    pub fn get_variable(&self, key: &str) -> Option<String> {
        self.vars.get(key)
    }

    /// Policy-checked write of the config-declared variable `group.name`.
    pub fn write_variable(&self, group: &str, name: &str, value: &str) -> Result<(), VarError> {
        let key = format!("{group}.{name}");
        self.vars.write_checked(&key, value)?;
        info!(var = %key, "variable written");
        Ok(())
    }
}
