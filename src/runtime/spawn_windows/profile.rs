// SPDX-License-Identifier: MIT

//! Load the profile environment of the identity behind a token.

use std::{
    ffi::c_void,
    os::windows::io::{AsRawHandle, BorrowedHandle},
    ptr::null_mut,
};

use log::warn;
use windows_sys::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};

use crate::runtime::{
    environment::{BuiltEnvironment, Environment, EnvironmentBuilder},
    error::ProfileLoadWarning,
};

use super::error::last_error_code;

/// An environment block allocated by `CreateEnvironmentBlock`.
struct EnvironmentBlock(*mut c_void);

impl EnvironmentBlock {
    /// Copy the block out, up to and including the first empty entry.
    ///
    /// Safety: the block must be a well formed, double NUL terminated block.
    unsafe fn to_vec(&self) -> Vec<u16> {
        let p = self.0 as *const u16;
        let mut len = 0usize;
        unsafe {
            while !(*p.add(len) == 0 && (len == 0 || *p.add(len - 1) == 0)) {
                len += 1;
            }
            std::slice::from_raw_parts(p, len + 1).to_vec()
        }
    }
}

impl Drop for EnvironmentBlock {
    fn drop(&mut self) {
        if unsafe { DestroyEnvironmentBlock(self.0) } == 0 {
            warn!("releasing the profile environment block failed (error {})", last_error_code());
        }
    }
}

/// The environment the token's user would get on logon, without inheriting anything
/// from this process.
pub fn load_profile_environment(
    token: BorrowedHandle<'_>,
) -> Result<Environment, ProfileLoadWarning> {
    let mut block: *mut c_void = null_mut();
    let ok = unsafe { CreateEnvironmentBlock(&mut block, token.as_raw_handle(), 0) };
    if ok == 0 || block.is_null() {
        return Err(ProfileLoadWarning { code: last_error_code() });
    }
    let block = EnvironmentBlock(block);
    let vars = unsafe { block.to_vec() };
    Ok(Environment::from_block(&vars))
}

impl EnvironmentBuilder {
    /// Build the environment for the user behind `token`.  A profile that cannot be
    /// loaded is logged, and the base mapping is used as-is.
    pub fn build_for_token(self, token: BorrowedHandle<'_>) -> BuiltEnvironment {
        self.build(load_profile_environment(token))
    }
}
