//! Core event loop implementation
//!
//! Alternates between Waiting (blocked on the input source) and Draining
//! (dispatching every buffered event through the trigger policy, the action
//! table and the executor).

use std::future::Future;
use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, error, info, trace};

use crate::actions::{ActionTable, Executor};
use crate::hotkey::{DeviceAccess, InputSource, KeyEvent, SourceError, TriggerPolicy};

/// The two states of the event loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    /// Blocked until the input source has data
    #[default]
    Waiting,
    /// Dispatching everything the source has buffered
    Draining,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Waiting => write!(f, "Waiting"),
            LoopState::Draining => write!(f, "Draining"),
        }
    }
}

/// Counters collected while the loop runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Completed drain cycles
    pub cycles: u64,
    /// Raw events pulled from the source
    pub events: u64,
    /// Actions run (events matching the trigger policy with an action bound)
    pub fired: u64,
}

/// Routes events from an input source to the actions bound to their keys
pub struct EventLoop<'a, S, W: Write> {
    source: S,
    table: &'a ActionTable,
    executor: &'a mut Executor<W>,
    policy: TriggerPolicy,
    state: LoopState,
    stats: LoopStats,
}

impl<'a, S: InputSource, W: Write> EventLoop<'a, S, W> {
    pub fn new(
        source: S,
        table: &'a ActionTable,
        executor: &'a mut Executor<W>,
        policy: TriggerPolicy,
    ) -> Self {
        Self {
            source,
            table,
            executor,
            policy,
            state: LoopState::Waiting,
            stats: LoopStats::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Give back the input source so it can be released
    pub fn into_source(self) -> S {
        self.source
    }

    /// Run until waiting on the source fails. Interrupted waits are retried.
    pub async fn run(&mut self) -> Result<(), SourceError> {
        info!(policy = %self.policy, "event loop started");

        loop {
            self.state = LoopState::Waiting;
            match self.source.wait().await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("wait interrupted, retrying");
                    continue;
                }
                Err(e) => {
                    error!(?e, "waiting on input source failed");
                    return Err(SourceError::Io(e));
                }
            }

            self.state = LoopState::Draining;
            self.drain()?;
        }
    }

    /// Dispatch every buffered event in arrival order, then reap finished macros
    fn drain(&mut self) -> Result<(), SourceError> {
        trace!(state = %self.state, cycle = self.stats.cycles, "dispatching buffered events");
        self.source.dispatch()?;

        while let Some(raw) = self.source.next_event() {
            self.stats.events += 1;
            if let Some(event) = KeyEvent::from_input(&raw) {
                self.handle_key(event);
            }
        }

        self.executor.reap();
        self.stats.cycles += 1;
        Ok(())
    }

    /// Run the bound action if the transition matches the trigger policy
    fn handle_key(&mut self, event: KeyEvent) {
        if !self.policy.fires(event.transition) {
            trace!(?event, "transition ignored");
            return;
        }

        let action = self.table.lookup(event.code);
        if action.is_none() {
            trace!(code = event.code, "no action bound");
            return;
        }

        debug!(code = event.code, ?action, "key fired");
        self.stats.fired += 1;
        self.executor.run(action, &event);
    }
}

/// How a session ended
#[derive(Debug)]
pub enum LoopExit {
    /// The shutdown future resolved
    Shutdown,
    /// The input source failed
    SourceFailed(SourceError),
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    pub stats: LoopStats,
    pub exit: LoopExit,
}

/// Acquire the device, run the loop until it fails or `shutdown` resolves,
/// then release the device.
///
/// Only a failure to acquire the device is returned as an error.
pub async fn run_session<A, W, F>(
    access: &A,
    device: &Path,
    grab: bool,
    table: &ActionTable,
    executor: &mut Executor<W>,
    policy: TriggerPolicy,
    shutdown: F,
) -> Result<SessionReport, SourceError>
where
    A: DeviceAccess,
    W: Write,
    F: Future<Output = ()>,
{
    let source = access.acquire(device, grab)?;
    let mut event_loop = EventLoop::new(source, table, executor, policy);

    let exit = tokio::select! {
        result = event_loop.run() => match result {
            Ok(()) => LoopExit::Shutdown,
            Err(e) => LoopExit::SourceFailed(e),
        },
        _ = shutdown => {
            info!("shutdown requested");
            LoopExit::Shutdown
        }
    };

    let stats = event_loop.stats();
    access.release(event_loop.into_source());

    Ok(SessionReport { stats, exit })
}
