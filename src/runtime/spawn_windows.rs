// SPDX-License-Identifier: MIT

//! Launching as another user on Windows.
//!
//! The parent holds an authenticated token for the target user.  Before the child is
//! created, the user is granted access to the interactive window station and desktop,
//! so a child that touches `user32` doesn't fail to initialize.  Every handle the
//! launch acquires has exactly one owner that closes it.

mod access;
mod create;
mod error;
mod fd;
mod handle;
mod launch;
mod process;
mod profile;
mod token;

pub use access::AccessGrantManager;
pub use create::{CreateProcessAsIdentity, CreateProcessAsUser, CreateRequest, CreatedProcess};
pub use fd::{StdioHandles, StdioPipes};
pub use handle::ScopedHandle;
pub use launch::{LaunchRequest, SecureProcessLauncher, launch_as_user};
pub use process::UserProcess;
pub use profile::load_profile_environment;
pub use token::token_user_sid;
