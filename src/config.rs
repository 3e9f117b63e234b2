//! Configuration loading and management
//!
//! Command line flags select the device and trigger behaviour; an optional
//! TOML keymap binds keys to actions:
//!
//! ```toml
//! trigger = "press"
//!
//! [keys]
//! KEY_ENTER = ["sh", "-c", "echo 'Hello, world!' > output.txt"]
//! f13 = ["/usr/bin/notify-send", "macro"]
//! KEY_A = "print"
//! 30 = "none"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::actions::{Action, ActionError, ActionTable};
use crate::hotkey::{parse_key, TriggerPolicy};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(version)]
#[command(about = "Print key names or launch commands from a dedicated macro keyboard")]
pub struct Args {
    /// Path to the evdev character device, e.g. /dev/input/by-id/...-event-kbd
    pub device: PathBuf,

    /// Take exclusive control of the device
    #[arg(short, long)]
    pub grab: bool,

    /// Fire actions when a key is pressed instead of when it is released
    #[arg(short = 'p', long)]
    pub on_press: bool,

    /// TOML file binding keys to actions; without it every key name is printed
    #[arg(short, long, value_name = "FILE")]
    pub keymap: Option<PathBuf>,

    /// Kill macros that are still running when the daemon exits
    #[arg(long)]
    pub kill_children: bool,

    /// Log the full command line of every macro launched
    #[arg(long)]
    pub echo_commands: bool,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Input device to read
    pub device_path: PathBuf,

    /// Request exclusive access to the device
    pub grab: bool,

    /// Transition that fires actions
    pub trigger: TriggerPolicy,

    /// Key bindings; `None` prints every key
    pub keymap: Option<Keymap>,

    pub kill_children: bool,
    pub echo_commands: bool,
}

impl Config {
    /// Load configuration from the command line and the keymap it names
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let keymap = args
            .keymap
            .as_deref()
            .map(Keymap::load)
            .transpose()
            .context("failed to load keymap")?;

        let trigger = if args.on_press {
            TriggerPolicy::OnPress
        } else {
            keymap
                .as_ref()
                .and_then(|keymap| keymap.trigger)
                .unwrap_or_default()
        };

        Ok(Self {
            device_path: args.device,
            grab: args.grab,
            trigger,
            keymap,
            kill_children: args.kill_children,
            echo_commands: args.echo_commands,
        })
    }

    /// Build the action table for this configuration
    pub fn action_table(&self) -> Result<ActionTable, ActionError> {
        match &self.keymap {
            Some(keymap) => keymap.build_table(),
            None => Ok(ActionTable::print_all()),
        }
    }
}

/// Errors found while reading a keymap
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid keymap: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("key {key} is bound twice (code {code})")]
    DuplicateKey { key: String, code: u16 },

    #[error("invalid action for {key}: {reason}")]
    InvalidAction { key: String, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeymapFile {
    #[serde(default)]
    trigger: Option<TriggerPolicy>,
    #[serde(default)]
    keys: BTreeMap<String, ActionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionSpec {
    Word(String),
    Argv(Vec<String>),
}

/// Key bindings read from a keymap file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    /// Trigger policy requested by the file, if any
    pub trigger: Option<TriggerPolicy>,
    /// Key code and action pairs, in file key order
    pub bindings: Vec<(u16, Action)>,
}

impl Keymap {
    /// Read and parse a keymap file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: KeymapFile = toml::from_str(text)?;
        let mut seen = BTreeMap::new();
        let mut bindings = Vec::with_capacity(file.keys.len());

        for (key, spec) in file.keys {
            let code = parse_key(&key).ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;

            if let Some(previous) = seen.insert(code, key.clone()) {
                return Err(ConfigError::DuplicateKey {
                    key: format!("{previous}/{key}"),
                    code,
                });
            }

            let action = spec.into_action(&key)?;
            bindings.push((code, action));
        }

        Ok(Self {
            trigger: file.trigger,
            bindings,
        })
    }

    /// Install every binding into a fresh table
    pub fn build_table(&self) -> Result<ActionTable, ActionError> {
        let mut table = ActionTable::new();
        for (code, action) in &self.bindings {
            table.install(*code, action.clone())?;
        }
        Ok(table)
    }
}

impl ActionSpec {
    fn into_action(self, key: &str) -> Result<Action, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidAction {
            key: key.to_string(),
            reason,
        };

        match self {
            ActionSpec::Word(word) => match word.to_ascii_lowercase().as_str() {
                "print" => Ok(Action::Print),
                "none" => Ok(Action::None),
                _ => Err(invalid(format!(
                    "expected \"print\", \"none\" or a command array, got {word:?}"
                ))),
            },
            ActionSpec::Argv(argv) => Action::exec(argv).map_err(|e| invalid(e.to_string())),
        }
    }
}
