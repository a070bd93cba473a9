// SPDX-License-Identifier: MIT

//! Read the identity out of a caller-supplied security context.
//! The token is only borrowed; it is never closed here.

use std::os::windows::io::{AsRawHandle, BorrowedHandle};

use windows_sys::Win32::{
    Foundation::ERROR_INSUFFICIENT_BUFFER,
    Security::{GetLengthSid, GetTokenInformation, TOKEN_USER, TokenUser},
};

use crate::runtime::{error::AccessError, session_acl::Sid};

use super::error::last_error_code;

/// The user SID of the token.
pub fn token_user_sid(token: BorrowedHandle<'_>) -> Result<Sid, AccessError> {
    let h = token.as_raw_handle();
    let mut needed = 0u32;
    unsafe {
        // Make the first call to get the size required
        if GetTokenInformation(h, TokenUser, std::ptr::null_mut(), 0, &mut needed) == 0 {
            let code = last_error_code();
            if code != ERROR_INSUFFICIENT_BUFFER || needed == 0 {
                return Err(AccessError::TokenUser { code });
            }
        }
    }

    // u64 storage keeps the TOKEN_USER pointer aligned.
    let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
    unsafe {
        if GetTokenInformation(h, TokenUser, buffer.as_mut_ptr().cast(), needed, &mut needed) == 0 {
            return Err(AccessError::TokenUser { code: last_error_code() });
        }
        let user = &*(buffer.as_ptr() as *const TOKEN_USER);
        let sid = user.User.Sid;
        if sid.is_null() {
            return Err(AccessError::InvalidSid("token has no user".to_string()));
        }
        let len = GetLengthSid(sid) as usize;
        Sid::from_bytes(std::slice::from_raw_parts(sid as *const u8, len))
    }
}
