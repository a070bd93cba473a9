// SPDX-License-Identifier: MIT

//! # spawnas
//!
//! Runs child programs as another, already authenticated user, with access to the
//! interactive desktop and without leaking handles.

pub mod runtime;

pub use runtime::{AccessError, Child, Command, LaunchError, LauncherConfig};

#[cfg(target_os = "windows")]
pub use runtime::{LaunchRequest, SecureProcessLauncher, StdioPipes, UserProcess, launch_as_user};
