// SPDX-License-Identifier: MIT

//! Launches child processes under another user's identity.
//!
//! `SecureProcessLauncher::launch` is the main entry point.  It takes a borrowed
//! token for the already authenticated user and a `LaunchRequest` that describes
//! the command, working directory, environment and standard streams.  The returned
//! `UserProcess` belongs to the caller; dropping it does not stop the child.
//!
//! The command line quoting, environment merge and DACL model are portable and
//! tested everywhere.  Process creation is Windows only.

pub mod config;
pub mod environment;
pub mod error;
pub mod session_acl;
pub mod spawn;

mod conv;
mod launch_quote;

pub use config::LauncherConfig;
pub use environment::{BuiltEnvironment, Environment, EnvironmentBuilder, ProfileState};
pub use error::{AccessError, LaunchError, ProfileLoadWarning};
pub use session_acl::{AceEntry, SessionObject, Sid};
pub use spawn::{Child, Command};

#[cfg(target_os = "windows")]
mod spawn_windows;

#[cfg(target_os = "windows")]
pub use spawn_windows::{
    AccessGrantManager, CreateProcessAsIdentity, CreateProcessAsUser, CreateRequest,
    CreatedProcess, LaunchRequest, ScopedHandle, SecureProcessLauncher, StdioHandles,
    StdioPipes, UserProcess, launch_as_user, load_profile_environment, token_user_sid,
};
