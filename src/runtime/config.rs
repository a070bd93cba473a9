// SPDX-License-Identifier: MIT

//! Launcher settings.

use std::{ffi::OsString, time::Duration};

pub const DEFAULT_WINDOW_STATION: &str = "winsta0";
pub const DEFAULT_DESKTOP: &str = "default";
pub const DEFAULT_DIAGNOSTIC_WAIT: Duration = Duration::from_secs(1);

// WaitForSingleObject treats 0xFFFFFFFF as INFINITE.
const MAX_WAIT_MILLIS: u64 = u32::MAX as u64 - 1;

/// Describes how the launcher reaches the interactive session and runs commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Window station whose DACL receives the grants.
    pub window_station: String,
    /// Desktop (inside the window station) whose DACL receives the grants.
    pub desktop: String,
    /// How long to wait after creation to catch children that exit immediately.
    pub diagnostic_wait: Duration,
    /// Shell used for shell-wrapped commands.  `None` reads `COMSPEC`, then `cmd.exe`.
    pub shell: Option<OsString>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        LauncherConfig {
            window_station: DEFAULT_WINDOW_STATION.to_string(),
            desktop: DEFAULT_DESKTOP.to_string(),
            diagnostic_wait: DEFAULT_DIAGNOSTIC_WAIT,
            shell: None,
        }
    }
}

impl LauncherConfig {
    pub fn with_window_station<S: Into<String>>(mut self, name: S) -> Self {
        self.window_station = name.into();
        self
    }

    pub fn with_desktop<S: Into<String>>(mut self, name: S) -> Self {
        self.desktop = name.into();
        self
    }

    pub fn with_diagnostic_wait(mut self, wait: Duration) -> Self {
        self.diagnostic_wait = wait;
        self
    }

    pub fn with_shell<S: Into<OsString>>(mut self, shell: S) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// The shell to wrap commands with.
    pub fn shell(&self) -> OsString {
        match &self.shell {
            Some(s) => s.clone(),
            None => std::env::var_os("COMSPEC").unwrap_or_else(|| OsString::from("cmd.exe")),
        }
    }

    /// The diagnostic wait in milliseconds, clamped below the infinite-wait sentinel.
    pub fn diagnostic_wait_millis(&self) -> u32 {
        self.diagnostic_wait.as_millis().min(MAX_WAIT_MILLIS as u128) as u32
    }
}
