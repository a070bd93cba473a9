// SPDX-License-Identifier: MIT

//! General model for spawning child processes and managing their state.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    time::Duration,
};

use crate::runtime::{error::LaunchError, launch_quote};

/// A launched child process, owned by the caller.
pub trait Child {
    /// The process id.
    fn pid(&self) -> u32;

    /// Request a hard termination of the child process.
    fn terminate(&self, exit_code: u32) -> Result<(), std::io::Error>;

    /// Wait for the child to exit.  `None` waits forever.
    /// Returns the exit code, or `None` if the timeout elapsed first.
    fn wait(&self, timeout: Option<Duration>) -> Result<Option<u32>, std::io::Error>;

    /// Get the current exit status for the child process.
    fn exit_status(&self) -> Option<u32>;
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// An argument vector, program name first.  Quoted into one command line.
    Argv(Vec<OsString>),
    /// A command line used as-is.
    Line(OsString),
}

impl Command {
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Command::Argv(args.into_iter().map(Into::into).collect())
    }

    pub fn line<S: Into<OsString>>(line: S) -> Self {
        Command::Line(line.into())
    }

    /// The program the command names, for diagnostics.
    pub fn program(&self) -> Option<PathBuf> {
        match self {
            Command::Argv(args) => args.first().map(PathBuf::from),
            Command::Line(line) => first_token(&line.to_string_lossy()).map(PathBuf::from),
        }
    }

    /// Build the command line passed to process creation, without the NUL terminator.
    /// With a shell, the line becomes `<shell> /c "<command>"`.
    pub fn to_command_line(&self, shell: Option<&OsStr>) -> Result<Vec<u16>, LaunchError> {
        let line = match self {
            Command::Argv(args) => {
                if args.is_empty() {
                    return Err(LaunchError::InvalidRequest("empty argument vector".to_string()));
                }
                launch_quote::join_arguments(args)?
            }
            Command::Line(line) => launch_quote::enforce_no_zero(line)?,
        };
        match shell {
            None => Ok(line),
            Some(shell) => launch_quote::shell_wrap(shell, &line),
        }
    }
}

fn first_token(line: &str) -> Option<String> {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix('"') {
        let end = rest.find('"').unwrap_or(rest.len());
        return Some(rest[..end].to_string());
    }
    line.split_whitespace().next().map(str::to_string)
}
