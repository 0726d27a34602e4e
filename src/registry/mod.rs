// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lazy, load-once resource machinery
//!
//! Heavyweight model handles are materialized on first use, exactly once,
//! and shared for the rest of the process lifetime. A failed load is just
//! as terminal as a successful one: the error is cached and replayed to
//! every subsequent caller, so a broken checkpoint is reported instead of
//! being expensively re-attempted on every request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

/// A cached resource-load failure
///
/// Cloneable so the single recorded failure can be handed to every caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("resource '{resource}' failed to load: {message}")]
pub struct LoadError {
    /// Name of the resource that failed
    pub resource: String,
    /// Rendered cause chain of the original error
    pub message: String,
}

/// Observable lifecycle state of a resource
///
/// Transitions are monotonic: once a resource is `Ready` or `Failed` it
/// never leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Not loaded yet (or a load is currently in flight)
    Pending,
    /// Loaded; the handle is immutable and shared
    Ready,
    /// Load failed; the error is cached
    Failed,
}

/// A named, lazily-materialized handle to a heavyweight object
///
/// The fast path is lock-free: once the slot holds a terminal outcome,
/// callers clone it without touching the init mutex. Otherwise callers
/// serialize on the per-resource mutex and re-check the slot after
/// acquiring it, so the loader runs at most once no matter how many tasks
/// race on first use.
pub struct LazyResource<T: ?Sized> {
    name: String,
    slot: OnceLock<Result<Arc<T>, LoadError>>,
    init: Mutex<()>,
}

impl<T: ?Sized> LazyResource<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ResourceStatus {
        match self.slot.get() {
            None => ResourceStatus::Pending,
            Some(Ok(_)) => ResourceStatus::Ready,
            Some(Err(_)) => ResourceStatus::Failed,
        }
    }

    /// Return the handle, invoking `loader` if this is the first use
    ///
    /// Concurrent first-time callers block until the single in-flight load
    /// finishes and then all observe the same terminal outcome. The loader
    /// passed by callers that lose the race is dropped unused.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Result<Arc<T>, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<T>>>,
    {
        if let Some(outcome) = self.slot.get() {
            return outcome.clone();
        }

        let _guard = self.init.lock().await;
        // Another caller may have completed the load while we waited.
        if let Some(outcome) = self.slot.get() {
            return outcome.clone();
        }

        info!("Loading resource '{}'... this may take a moment", self.name);
        let started = Instant::now();
        let outcome = match loader().await {
            Ok(handle) => {
                info!(
                    "Resource '{}' ready in {:.4}s",
                    self.name,
                    started.elapsed().as_secs_f64()
                );
                Ok(handle)
            }
            Err(e) => {
                error!("Resource '{}' failed to load: {:#}", self.name, e);
                Err(LoadError {
                    resource: self.name.clone(),
                    message: format!("{:#}", e),
                })
            }
        };

        // We hold the init lock, so the slot is still empty.
        let _ = self.slot.set(outcome.clone());
        outcome
    }
}

impl<T: ?Sized> std::fmt::Debug for LazyResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyResource")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Errors from registry-level lookups
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown resource '{0}'")]
    Unknown(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A fixed set of named [`LazyResource`] entries
///
/// Each entry carries its own initialization lock; loads of different
/// resources never serialize against each other.
pub struct ResourceRegistry<T: ?Sized> {
    entries: HashMap<String, Arc<LazyResource<T>>>,
}

impl<T: ?Sized> ResourceRegistry<T> {
    /// Create a registry over a fixed set of resource names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let resource = Arc::new(LazyResource::new(name.clone()));
                (name, resource)
            })
            .collect();
        Self { entries }
    }

    pub fn entry(&self, name: &str) -> Option<&Arc<LazyResource<T>>> {
        self.entries.get(name)
    }

    /// Get-or-load on a named entry; unknown names fail without invoking
    /// the loader
    pub async fn get_or_load<F, Fut>(&self, name: &str, loader: F) -> Result<Arc<T>, RegistryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<T>>>,
    {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        Ok(entry.get_or_load(loader).await?)
    }

    pub fn statuses(&self) -> Vec<(String, ResourceStatus)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status()))
            .collect()
    }

    /// True if at least one entry has finished loading successfully
    pub fn any_ready(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.status() == ResourceStatus::Ready)
    }
}
