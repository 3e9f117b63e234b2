//! Registry of launched macro processes
//!
//! The event loop never waits on a macro. Instead every child is recorded
//! here and reaped with a non-blocking check once per drain cycle.

use std::time::Instant;

use tokio::process::Child;
use tracing::{debug, info, warn};

struct Tracked {
    child: Child,
    program: String,
    pid: Option<u32>,
    started_at: Instant,
}

/// Children that have been spawned but not yet reaped
#[derive(Default)]
pub struct ChildRegistry {
    children: Vec<Tracked>,
    spawned: usize,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly spawned child
    pub fn track(&mut self, child: Child, program: &str) {
        let pid = child.id();
        debug!(?pid, program, "tracking macro process");
        self.children.push(Tracked {
            child,
            program: program.to_string(),
            pid,
            started_at: Instant::now(),
        });
        self.spawned += 1;
    }

    /// Reap every child that has exited without blocking. Returns how many were reaped.
    pub fn reap(&mut self) -> usize {
        let before = self.children.len();

        self.children.retain_mut(|tracked| match tracked.child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    pid = ?tracked.pid,
                    program = %tracked.program,
                    %status,
                    runtime_ms = tracked.started_at.elapsed().as_millis() as u64,
                    "macro exited"
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = ?tracked.pid, ?e, "failed to poll macro process, forgetting it");
                false
            }
        });

        before - self.children.len()
    }

    /// Number of children still running (as of the last reap)
    #[cfg(test)]
    pub fn running(&self) -> usize {
        self.children.len()
    }

    /// Total number of children spawned over the registry's lifetime
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Reap finished children, then kill the rest if `kill` is set.
    ///
    /// Children left alive are detached and keep running after the daemon exits.
    pub async fn shutdown(&mut self, kill: bool) {
        self.reap();

        if self.children.is_empty() {
            return;
        }

        if !kill {
            info!(running = self.children.len(), "leaving macros running");
            self.children.clear();
            return;
        }

        for mut tracked in self.children.drain(..) {
            match tracked.child.kill().await {
                Ok(()) => debug!(pid = ?tracked.pid, program = %tracked.program, "macro killed"),
                Err(e) => warn!(pid = ?tracked.pid, ?e, "failed to kill macro"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::process::Command;

    async fn reap_until_empty(registry: &mut ChildRegistry) {
        for _ in 0..200 {
            registry.reap();
            if registry.running() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("children were never reaped");
    }

    #[tokio::test]
    async fn test_reaps_finished_children() {
        let mut registry = ChildRegistry::new();
        registry.track(Command::new("/bin/true").spawn().unwrap(), "/bin/true");
        registry.track(Command::new("/bin/true").spawn().unwrap(), "/bin/true");
        assert_eq!(registry.spawned(), 2);

        reap_until_empty(&mut registry).await;
        assert_eq!(registry.spawned(), 2);
    }

    #[tokio::test]
    async fn test_reap_does_not_block_on_running_child() {
        let mut registry = ChildRegistry::new();
        registry.track(Command::new("/bin/sleep").arg("5").spawn().unwrap(), "/bin/sleep");

        let started = Instant::now();
        assert_eq!(registry.reap(), 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(registry.running(), 1);

        registry.shutdown(true).await;
        assert_eq!(registry.running(), 0);
    }

    #[test]
    fn test_shutdown_with_nothing_running() {
        let mut registry = ChildRegistry::new();
        tokio_test::block_on(registry.shutdown(true));
        assert_eq!(registry.running(), 0);
        assert_eq!(registry.spawned(), 0);
    }
}
