//! Handle registry for live execution contexts
//!
//! The transaction executor owns a [`ContextRegistry`] and registers each
//! context for the duration of one transaction. Callers outside the
//! interpreter reach the context through its [`ServiceHandle`]; the
//! [`ContextLease`] returned by [`ContextRegistry::create`] removes the
//! entry when dropped.
//!
//! Dispatch locks the context for the duration of the host call, so it must
//! not be re-entered for the same handle from inside an interpreter. Nested
//! calls go through the `&mut ExecutionContext` the interpreter receives.

use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::host::{HostCall, HostReply};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kestrel_storage::ChangeSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque per-transaction handle
pub type ServiceHandle = u64;

type SharedContext = Arc<Mutex<ExecutionContext>>;

/// Map of live contexts keyed by handle
#[derive(Default)]
pub struct ContextRegistry {
    contexts: DashMap<ServiceHandle, SharedContext>,
    next_handle: AtomicU64,
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctx` under a fresh handle, skipping handles taken through
    /// [`register`](Self::register)
    pub fn create(&self, ctx: ExecutionContext) -> ContextLease<'_> {
        let shared: SharedContext = Arc::new(Mutex::new(ctx));
        let handle = loop {
            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
            match self.contexts.entry(handle) {
                Entry::Occupied(_) => tracing::debug!("Handle {} in use, skipping", handle),
                Entry::Vacant(slot) => {
                    slot.insert(shared);
                    break handle;
                }
            }
        };
        tracing::debug!("Registered execution context {}", handle);
        ContextLease {
            registry: self,
            handle,
            released: false,
        }
    }

    /// Register `ctx` under a caller-chosen handle
    pub fn register(&self, handle: ServiceHandle, ctx: ExecutionContext) -> VmResult<()> {
        match self.contexts.entry(handle) {
            Entry::Occupied(_) => Err(VmError::Internal(format!(
                "handle {handle} already registered"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(ctx)));
                Ok(())
            }
        }
    }

    /// Look up the context behind `handle`
    pub fn lookup(&self, handle: ServiceHandle) -> VmResult<SharedContext> {
        self.contexts
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VmError::UnknownHandle(handle))
    }

    /// Run `f` with exclusive access to the context behind `handle`
    pub fn with<T, F>(&self, handle: ServiceHandle, f: F) -> VmResult<T>
    where
        F: FnOnce(&mut ExecutionContext) -> VmResult<T>,
    {
        let ctx = self.lookup(handle)?;
        let mut guard = ctx.lock();
        f(&mut guard)
    }

    /// Run one host call against the context behind `handle`
    pub fn dispatch(&self, handle: ServiceHandle, call: HostCall) -> VmResult<HostReply> {
        self.with(handle, |ctx| ctx.dispatch(call))
    }

    /// Remove the context behind `handle` and take it back
    pub fn take(&self, handle: ServiceHandle) -> VmResult<ExecutionContext> {
        let (_, shared) = self
            .contexts
            .remove(&handle)
            .ok_or(VmError::UnknownHandle(handle))?;
        Arc::try_unwrap(shared)
            .map(Mutex::into_inner)
            .map_err(|_| VmError::Internal(format!("context {handle} still in use")))
    }

    /// Drop the context behind `handle`, rolling back its open connections
    pub fn destroy(&self, handle: ServiceHandle) -> bool {
        let removed = self.contexts.remove(&handle).is_some();
        if removed {
            tracing::debug!("Destroyed execution context {}", handle);
        }
        removed
    }

    /// Check if `handle` is registered
    pub fn contains(&self, handle: ServiceHandle) -> bool {
        self.contexts.contains_key(&handle)
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Check if no context is registered
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// Registration of one context, removed from the registry on drop
#[derive(Debug)]
pub struct ContextLease<'a> {
    registry: &'a ContextRegistry,
    handle: ServiceHandle,
    released: bool,
}

impl ContextLease<'_> {
    /// Handle of the leased context
    pub fn handle(&self) -> ServiceHandle {
        self.handle
    }

    /// Run one host call against the leased context
    pub fn dispatch(&self, call: HostCall) -> VmResult<HostReply> {
        self.registry.dispatch(self.handle, call)
    }

    /// Run `f` with exclusive access to the leased context
    pub fn with<T, F>(&self, f: F) -> VmResult<T>
    where
        F: FnOnce(&mut ExecutionContext) -> VmResult<T>,
    {
        self.registry.with(self.handle, f)
    }

    /// Unregister the context and end its transaction
    pub fn finish(mut self, success: bool) -> VmResult<ChangeSet> {
        self.released = true;
        let ctx = self.registry.take(self.handle)?;
        ctx.finish(success)
    }
}

impl Drop for ContextLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.registry.destroy(self.handle);
        }
    }
}
