//! Performs the action bound to a key

use std::io::{self, Write};
use std::process::Stdio;

use tracing::{info, warn};

use super::children::ChildRegistry;
use super::table::{Action, Command};
use crate::hotkey::{display_name, KeyEvent};

/// Runs actions: prints key names to its output, launches macros in the background
pub struct Executor<W = io::Stdout> {
    out: W,
    children: ChildRegistry,
    echo_commands: bool,
}

impl Executor<io::Stdout> {
    /// Executor printing to standard output
    pub fn stdout(echo_commands: bool) -> Self {
        Self::new(io::stdout(), echo_commands)
    }
}

impl<W: Write> Executor<W> {
    pub fn new(out: W, echo_commands: bool) -> Self {
        Self {
            out,
            children: ChildRegistry::new(),
            echo_commands,
        }
    }

    /// Perform `action` for `event`. Never blocks on a launched macro.
    pub fn run(&mut self, action: &Action, event: &KeyEvent) {
        match action {
            Action::None => {}
            Action::Print => self.print(event.code),
            Action::Exec(command) => self.spawn(command, event.code),
        }
    }

    fn print(&mut self, code: u16) {
        let name = display_name(code);
        let result = writeln!(self.out, "{name}").and_then(|()| self.out.flush());
        if let Err(e) = result {
            warn!(code, ?e, "failed to print key name");
        }
    }

    fn spawn(&mut self, command: &Command, code: u16) {
        if self.echo_commands {
            info!(code, %command, "launching macro");
        }

        let spawned = tokio::process::Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();

        match spawned {
            Ok(child) => self.children.track(child, command.program()),
            Err(e) => warn!(code, program = command.program(), ?e, "failed to launch macro"),
        }
    }

    /// Reap macros that have exited since the last call
    pub fn reap(&mut self) -> usize {
        self.children.reap()
    }

    pub fn children(&self) -> &ChildRegistry {
        &self.children
    }

    /// Reap what has finished and optionally kill what is still running
    pub async fn shutdown(&mut self, kill_children: bool) {
        self.children.shutdown(kill_children).await;
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::hotkey::Transition;

    fn executor() -> Executor<Vec<u8>> {
        Executor::new(Vec::new(), false)
    }

    fn lines(executor: &Executor<Vec<u8>>) -> Vec<String> {
        String::from_utf8(executor.output().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_none_does_nothing() {
        let mut executor = executor();
        executor.run(&Action::None, &KeyEvent::new(30, Transition::Released));
        assert!(executor.output().is_empty());
        assert_eq!(executor.children().spawned(), 0);
    }

    #[test]
    fn test_print_writes_one_line() {
        let mut executor = executor();
        executor.run(&Action::Print, &KeyEvent::new(28, Transition::Released));
        assert_eq!(lines(&executor), ["KEY_ENTER"]);
    }

    #[test]
    fn test_print_unknown_key_uses_placeholder() {
        let mut executor = executor();
        executor.run(&Action::Print, &KeyEvent::new(0x2f5, Transition::Released));
        assert_eq!(lines(&executor), ["?"]);
    }

    #[tokio::test]
    async fn test_exec_spawns_without_waiting() {
        let mut executor = executor();
        let action = Action::exec(["/bin/sleep", "5"]).unwrap();

        let started = Instant::now();
        executor.run(&action, &KeyEvent::new(30, Transition::Pressed));
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(executor.children().spawned(), 1);
        assert_eq!(executor.children().running(), 1);
        assert!(executor.output().is_empty());

        executor.shutdown(true).await;
        assert_eq!(executor.children().running(), 0);
    }

    #[tokio::test]
    async fn test_exec_passes_argv_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("argv");
        let script = format!("printf '%s|' \"$0\" \"$@\" > '{}'", out.display());
        let action = Action::exec(["/bin/sh", "-c", script.as_str(), "zero", "a b", "c"]).unwrap();

        let mut executor = executor();
        executor.run(&action, &KeyEvent::new(30, Transition::Released));
        assert_eq!(executor.children().spawned(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while executor.children().running() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
            executor.reap();
        }

        assert_eq!(executor.children().running(), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "zero|a b|c|");
    }

    #[tokio::test]
    async fn test_missing_program_is_not_fatal() {
        let mut executor = executor();
        let action = Action::exec(["/definitely/not/a/program"]).unwrap();

        executor.run(&action, &KeyEvent::new(30, Transition::Pressed));
        assert_eq!(executor.children().spawned(), 0);

        executor.run(&Action::Print, &KeyEvent::new(30, Transition::Pressed));
        assert_eq!(lines(&executor), ["KEY_A"]);
    }
}
