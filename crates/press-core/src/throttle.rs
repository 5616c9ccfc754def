//! Rate limiting for high-frequency push events.
//!
//! [`ThrottleState`] is the timing core and is driven by explicit instants.
//! [`Throttled`] runs it on a tokio task and invokes a callback at most once
//! per window.

#![allow(missing_docs)]

use std::future::pending;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Window applied to value pushes unless configured otherwise.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(100);

/// Edge flags of a throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Fire on the first call of a quiescent period.
    pub leading: bool,
    /// Fire the latest suppressed call when the window closes.
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            leading: true,
            trailing: true,
        }
    }
}

/// Timing state of a throttle.
#[derive(Debug, Clone)]
pub struct ThrottleState<T> {
    window: Duration,
    options: ThrottleOptions,
    last_fire: Option<Instant>,
    deadline: Option<Instant>,
    pending: Option<T>,
}

impl<T> ThrottleState<T> {
    #[must_use]
    pub fn new(window: Duration, options: ThrottleOptions) -> Self {
        Self {
            window,
            options,
            last_fire: None,
            deadline: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a call at `now`. Returns the arguments to invoke immediately,
    /// if any; otherwise they are held for the trailing edge.
    pub fn call(&mut self, now: Instant, args: T) -> Option<T> {
        if self.last_fire.is_none() && !self.options.leading {
            self.last_fire = Some(now);
        }
        let elapsed = self
            .last_fire
            .map_or(self.window, |last| now.saturating_duration_since(last));
        if elapsed >= self.window {
            self.deadline = None;
            self.pending = None;
            self.last_fire = Some(now);
            return Some(args);
        }
        if self.options.trailing {
            self.pending = Some(args);
            if self.deadline.is_none() {
                self.deadline = Some(now + (self.window - elapsed));
            }
        }
        None
    }

    /// Trailing-edge deadline, when one is armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take the pending trailing call if its deadline has passed.
    pub fn fire_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => {}
            _ => return None,
        }
        self.deadline = None;
        self.last_fire = self.options.leading.then_some(now);
        self.pending.take()
    }

    /// Drop the pending trailing call and start over.
    pub fn cancel(&mut self) {
        self.last_fire = None;
        self.deadline = None;
        self.pending = None;
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

enum Command<T> {
    Call(T),
    Cancel,
}

/// Throttled callback running on its own task. Dropping the handle stops the
/// task and discards any pending trailing call.
#[derive(Debug)]
pub struct Throttled<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Throttled<T> {
    /// Spawn the throttle task. Must be called inside a tokio runtime.
    pub fn spawn<F>(window: Duration, options: ThrottleOptions, mut callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut state = ThrottleState::new(window, options);
            loop {
                let deadline = state.deadline();
                let timer = async move {
                    match deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => pending::<()>().await,
                    }
                };
                // Commands first, so a cancel already queued beats a due deadline.
                tokio::select! {
                    biased;
                    command = rx.recv() => match command {
                        Some(Command::Call(args)) => {
                            if let Some(args) = state.call(Instant::now(), args) {
                                callback(args);
                            }
                        }
                        Some(Command::Cancel) => {
                            trace!("throttle cancelled");
                            state.cancel();
                        }
                        None => break,
                    },
                    () = timer => {
                        if let Some(args) = state.fire_due(Instant::now()) {
                            callback(args);
                        }
                    }
                }
            }
        });
        Self { commands, task }
    }

    pub fn call(&self, args: T) {
        // Fails only once the task is gone, at which point there is nothing to deliver to.
        let _ = self.commands.send(Command::Call(args));
    }

    /// Discard any pending trailing call and reset timing.
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    /// Stop the task now. Pending and queued calls are never delivered.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Throttled<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
