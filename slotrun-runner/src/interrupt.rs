// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation for a run.
//!
//! An [`InterruptToken`] is shared between the scheduling loop, the jobs it starts, and a
//! listener for OS signals. Once requested, the token stays requested for the rest of the run.
//! The scheduler polls it: nothing is forcibly terminated.
//!
//! Stopping after a test failure doesn't go through the token. That is tracked by the scheduler,
//! which lets running jobs finish before returning.

use crate::{
    errors::DisplayErrorChain,
    signal::{SignalHandler, SignalHandlerKind},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::warn;

/// A cancellation token for a run.
///
/// Cloning the token produces a handle to the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct InterruptToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    requested: AtomicBool,
    notify: Notify,
}

impl InterruptToken {
    /// Creates a new token that hasn't been requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an interrupt.
    ///
    /// Returns true if this call changed the state of the token.
    pub fn request(&self) -> bool {
        let changed = !self.inner.requested.swap(true, Ordering::SeqCst);
        if changed {
            self.inner.notify.notify_waiters();
        }
        changed
    }

    /// Returns true if an interrupt has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once an interrupt has been requested.
    pub async fn requested(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register for notifications before checking the flag, so a request in between isn't
            // lost.
            notified.as_mut().enable();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// The state of an [`InterruptController`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterruptState {
    /// The handler is installed and no interrupt has been requested.
    Armed,

    /// An interrupt has been requested. A second signal terminates the process.
    Requested,

    /// The handler has been removed.
    Disarmed,
}

/// Installs and removes the signal listener for a run, and answers "should we stop?".
#[derive(Debug)]
pub(crate) struct InterruptController {
    token: InterruptToken,
    listener: Option<JoinHandle<()>>,
    disarmed: bool,
}

impl InterruptController {
    /// Arms the controller. Must be called from within a Tokio runtime.
    ///
    /// If the platform's signal facility can't be set up, the controller degrades to a no-op:
    /// interrupts can then only be requested through the token.
    pub(crate) fn arm(kind: SignalHandlerKind, token: InterruptToken) -> Self {
        let listener = match kind.build() {
            Ok(handler) if handler.is_noop() => None,
            Ok(handler) => Some(tokio::spawn(listen(handler, token.clone()))),
            Err(error) => {
                warn!(
                    "{}; interrupts are disabled for this run",
                    DisplayErrorChain::new(&error)
                );
                None
            }
        };

        Self {
            token,
            listener,
            disarmed: false,
        }
    }

    pub(crate) fn state(&self) -> InterruptState {
        if self.disarmed {
            InterruptState::Disarmed
        } else if self.token.is_requested() {
            InterruptState::Requested
        } else {
            InterruptState::Armed
        }
    }

    /// Returns true if the run should stop.
    ///
    /// Pending signals get a chance to be observed before the flag is read. This never blocks.
    pub(crate) async fn is_interrupted(&self) -> bool {
        tokio::task::yield_now().await;
        self.token.is_requested()
    }

    /// Removes the signal listener. Called at the end of every run.
    pub(crate) fn disarm(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.disarmed = true;
    }
}

impl Drop for InterruptController {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn listen(mut handler: SignalHandler, token: InterruptToken) {
    let mut signaled = false;
    while let Some(event) = handler.recv().await {
        if signaled {
            // The run was already asked to stop: behave as if no handler were installed.
            warn!("received {event} again, exiting immediately");
            std::process::exit(event.exit_code());
        }
        signaled = true;
        warn!("received {event}, not starting any more tests");
        token.request();
    }
}
