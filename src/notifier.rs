// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Synchronous in-process publish/subscribe bus.
//!
//! Listeners register a callback; `notify` dispatches to every registered
//! listener, in registration order, under one lock. Callbacks are plain
//! function pointers rather than arbitrary closures, matching the C
//! `notifier_fn_t` the original compares for identity: `notifier_reg`
//! rejects a repeat registration of the same function with `-EPERM`
//! instead of silently duplicating delivery, and this port does the same.

use std::sync::Mutex;

use crate::error::NotifierError;

/// Events the notifier carries. Mirrors the flow lifecycle and IPCP
/// lifecycle transitions the original dispatches to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierEvent {
    FlowAlloc,
    FlowDealloc,
    FlowUp,
    FlowDown,
    IpcpShutdown,
}

type Callback = fn(NotifierEvent);

struct Listener {
    id: usize,
    callback: Callback,
}

struct Inner {
    listeners: Vec<Listener>,
    next_id: usize,
}

/// The notifier bus. One instance lives for the process's lifetime.
pub struct Notifier {
    inner: Mutex<Inner>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Notifier {
            inner: Mutex::new(Inner {
                listeners: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Registers a callback, returning a token used to unregister it.
    /// Fails if this exact function is already registered — the original
    /// `notifier_reg` compares callbacks by identity, not by the state
    /// they close over, so a second registration of the same function is
    /// rejected even if the caller meant it to track something new.
    pub fn register(&self, callback: Callback) -> Result<usize, NotifierError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .listeners
            .iter()
            .any(|l| std::ptr::fn_addr_eq(l.callback, callback))
        {
            return Err(NotifierError::AlreadyRegistered);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Listener { id, callback });
        Ok(id)
    }

    /// Removes a previously registered listener. No-op if already removed.
    pub fn unregister(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.retain(|l| l.id != id);
    }

    /// Dispatches `event` to every registered listener in registration
    /// order, synchronously and under the bus's lock — a listener that
    /// unregisters itself (or another) from within its own callback would
    /// deadlock, so callbacks must not call back into the notifier.
    pub fn notify(&self, event: NotifierEvent) {
        let inner = self.inner.lock().unwrap();
        for listener in inner.listeners.iter() {
            (listener.callback)(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }
}
