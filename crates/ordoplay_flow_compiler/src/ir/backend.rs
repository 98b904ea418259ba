// SPDX-License-Identifier: MIT OR Apache-2.0
//! The code-emission backend.
//!
//! Emission is not reentrant: one module is assembled at a time, process wide.
//! [`IrBackend::lock`] hands out a guard, and modules can only be built through
//! that guard, so the lock is held for the whole of a synthesis call and
//! released on every exit path.

use super::builder::ModuleBuilder;
use parking_lot::{Mutex, MutexGuard};

/// Mutable state behind the backend lock
#[derive(Debug, Default)]
pub struct BackendState {
    pub(crate) modules_emitted: u64,
    pub(crate) functions_emitted: u64,
}

/// Exclusive IR emission backend, shared between compiler sessions
#[derive(Debug, Default)]
pub struct IrBackend {
    state: Mutex<BackendState>,
}

impl IrBackend {
    /// Create a backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive access. Blocks while another thread is emitting.
    pub fn lock(&self) -> BackendGuard<'_> {
        BackendGuard {
            state: self.state.lock(),
        }
    }

    /// Number of modules emitted so far
    pub fn modules_emitted(&self) -> u64 {
        self.state.lock().modules_emitted
    }

    /// Number of functions emitted so far
    pub fn functions_emitted(&self) -> u64 {
        self.state.lock().functions_emitted
    }
}

/// Proof of exclusive access to the backend
pub struct BackendGuard<'a> {
    state: MutexGuard<'a, BackendState>,
}

impl BackendGuard<'_> {
    /// Start a module. The builder borrows the guard.
    pub fn module(&mut self, name: impl Into<String>) -> ModuleBuilder<'_> {
        ModuleBuilder::new(&mut self.state, name)
    }
}

impl std::fmt::Debug for BackendGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendGuard")
            .field("modules_emitted", &self.state.modules_emitted)
            .finish()
    }
}
