//! Invocation specifications for process-backed channels
//!
//! A [`ProcessSpec`] is a declarative description of how to start a child:
//! what to run, under which environment, and with which default readiness
//! timeout. Validation happens before any process is spawned, so a malformed
//! specification fails fast with a configuration error.

use crate::error::{Result, TubeError};
use crate::timeout::Timeout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

/// Shell used for [`Invocation::Shell`] command lines unless overridden
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// How the child is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Invocation {
    /// A single command line handed to a shell (`sh -c <line>`)
    Shell(String),
    /// An argument list executed directly, argv\[0\] first
    Argv(Vec<String>),
}

/// Declarative description of a child process to wrap in a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// What to run
    pub invocation: Invocation,
    /// Explicit executable path overriding the invocation's own program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Replacement environment; `None` inherits the parent's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Default bound for readiness waits on the read side
    #[serde(default)]
    pub timeout: Timeout,
}

impl ProcessSpec {
    /// Spec for an argument list executed directly
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            invocation: Invocation::Argv(argv.into_iter().map(Into::into).collect()),
            executable: None,
            env: None,
            timeout: Timeout::DEFAULT,
        }
    }

    /// Spec for a command line interpreted by a shell
    pub fn shell(command_line: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::Shell(command_line.into()),
            executable: None,
            env: None,
            timeout: Timeout::DEFAULT,
        }
    }

    /// Override the executable actually run (argv\[0\] is kept as given)
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Replace the child's environment with the given mapping
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set the default readiness timeout
    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Identity of the program this spec runs.
    ///
    /// The explicit executable override wins, then the first argv element,
    /// then the shell command line itself. An empty argument list is the one
    /// shape with no identity and is rejected here, before spawning.
    pub fn program(&self) -> Result<String> {
        if let Some(executable) = &self.executable {
            return Ok(executable.to_string_lossy().into_owned());
        }
        match &self.invocation {
            Invocation::Shell(line) => Ok(line.clone()),
            Invocation::Argv(argv) => argv.first().cloned().ok_or_else(|| {
                TubeError::Configuration(
                    "argument list must contain at least one element".to_string(),
                )
            }),
        }
    }

    /// Build the `Command` this spec describes (pipes are wired by the caller)
    pub(crate) fn command(&self) -> Result<Command> {
        let mut command = match &self.invocation {
            Invocation::Shell(line) => {
                let shell = self
                    .executable
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL));
                let mut command = Command::new(shell);
                command.arg("-c").arg(line);
                command
            }
            Invocation::Argv(argv) => {
                let first = argv.first().ok_or_else(|| {
                    TubeError::Configuration(
                        "argument list must contain at least one element".to_string(),
                    )
                })?;
                match &self.executable {
                    Some(executable) => {
                        use std::os::unix::process::CommandExt;
                        let mut command = Command::new(executable);
                        command.arg0(first);
                        command.args(&argv[1..]);
                        command
                    }
                    None => {
                        let mut command = Command::new(first);
                        command.args(&argv[1..]);
                        command
                    }
                }
            }
        };
        if let Some(env) = &self.env {
            command.env_clear();
            command.envs(env);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_program_from_argv() {
        let spec = ProcessSpec::new(["cat", "-A"]);
        assert_eq!(spec.program().unwrap(), "cat");
    }

    #[test]
    fn test_program_from_shell_line() {
        let spec = ProcessSpec::shell("echo hello | wc -c");
        assert_eq!(spec.program().unwrap(), "echo hello | wc -c");
    }

    #[test]
    fn test_program_prefers_executable_override() {
        let spec = ProcessSpec::new(["argv0"]).executable("/usr/bin/env");
        assert_eq!(spec.program().unwrap(), "/usr/bin/env");
    }

    #[test]
    fn test_empty_argv_is_a_configuration_error() {
        let spec = ProcessSpec::new(Vec::<String>::new());
        let error = spec.program().unwrap_err();
        assert_eq!(error.code(), "TUBE001");
        assert!(spec.command().is_err());
    }

    #[test]
    fn test_builder_settings() {
        let spec = ProcessSpec::shell("env")
            .env([("KEY", "value")])
            .timeout(Duration::from_millis(50));
        assert_eq!(spec.timeout, Timeout::Bounded(Duration::from_millis(50)));
        let env = spec.env.as_ref().unwrap();
        assert_eq!(env.get("KEY").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_spec_serde_round_trip() {
        let spec = ProcessSpec::new(["true"]).timeout(Timeout::Indefinite);
        let json = serde_json::to_string(&spec).unwrap();
        let back: ProcessSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.invocation, Invocation::Argv(vec!["true".to_string()]));
        assert!(back.timeout.is_indefinite());
    }
}
