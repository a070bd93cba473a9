// SPDX-License-Identifier: MIT

//! Windows error code helpers.

const FACILITY_WIN32_MASK: u32 = 0xFFFF_0000;
const FACILITY_WIN32_PREFIX: u32 = 0x8007_0000;

/// The Win32 error code behind a windows error.  Errors that don't wrap a Win32 code
/// keep their raw HRESULT value.
pub fn win32_code(e: &windows::core::Error) -> u32 {
    let hr = e.code().0 as u32;
    if hr & FACILITY_WIN32_MASK == FACILITY_WIN32_PREFIX {
        hr & 0xFFFF
    } else {
        hr
    }
}

/// The calling thread's last error, as a Win32 code.
pub fn last_error_code() -> u32 {
    win32_code(&windows_result::Error::from_thread())
}
