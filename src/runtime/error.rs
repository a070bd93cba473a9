// SPDX-License-Identifier: MIT

//! Common error types.
//!
//! `AccessError` and `LaunchError` abort a launch attempt.  `ProfileLoadWarning` is
//! only ever logged; the environment falls back to the caller's mapping.

use std::path::PathBuf;

use thiserror::Error;

use crate::runtime::session_acl::SessionObject;

/// Failure to read or amend the security state of the interactive session objects.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("cannot open {object} '{name}' (error {code})")]
    Open {
        object: SessionObject,
        name: String,
        code: u32,
    },

    #[error("cannot read the DACL of {object} '{name}' (error {code})")]
    ReadDacl {
        object: SessionObject,
        name: String,
        code: u32,
    },

    #[error("cannot write the DACL of {object} '{name}' (error {code})")]
    WriteDacl {
        object: SessionObject,
        name: String,
        code: u32,
    },

    #[error("cannot read the user of the security context (error {code})")]
    TokenUser { code: u32 },

    #[error("invalid security identifier: {0}")]
    InvalidSid(String),
}

/// Failure to start the child process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot grant session access: {0}")]
    Access(#[from] AccessError),

    #[error("permission denied running {}", executable.display())]
    PermissionDenied { executable: PathBuf },

    #[error("process creation failed (error {code})")]
    CreateFailed { code: u32 },

    #[error("invalid launch request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<LaunchError> for std::io::Error {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Io(e) => e,
            LaunchError::PermissionDenied { .. } => {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, e)
            }
            LaunchError::InvalidRequest(_) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
            }
            e => std::io::Error::other(e),
        }
    }
}

/// The user's profile environment could not be loaded.  Never fatal.
#[derive(Debug, Error)]
#[error("could not load the profile environment of the user (error {code})")]
pub struct ProfileLoadWarning {
    pub code: u32,
}
