// SPDX-License-Identifier: MIT

//! Various type conversion routines.
//!
//! Command lines and environment blocks are built as UTF-16 on every platform so the
//! quoting logic can be tested off Windows.  On Windows the conversion is lossless.

use std::ffi::OsStr;

/// Convert the OS string into UTF-16 code units, without a terminator.
#[cfg(target_os = "windows")]
pub fn to_wide(s: &OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    s.encode_wide().collect()
}

/// Convert the OS string into UTF-16 code units, without a terminator.
#[cfg(not(target_os = "windows"))]
pub fn to_wide(s: &OsStr) -> Vec<u16> {
    s.to_string_lossy().encode_utf16().collect()
}

/// Convert the OS string into a null-terminated wide (16-bit) C string.
pub fn as_c_str_w(s: &OsStr) -> Vec<u16> {
    let mut ret = to_wide(s);
    ret.push(0);
    ret
}

/// Turn UTF-16 code units back into an OS string.
#[cfg(target_os = "windows")]
pub fn from_wide(s: &[u16]) -> std::ffi::OsString {
    use std::os::windows::ffi::OsStringExt;
    std::ffi::OsString::from_wide(s)
}

/// Turn UTF-16 code units back into an OS string.
#[cfg(not(target_os = "windows"))]
pub fn from_wide(s: &[u16]) -> std::ffi::OsString {
    std::ffi::OsString::from(String::from_utf16_lossy(s))
}
