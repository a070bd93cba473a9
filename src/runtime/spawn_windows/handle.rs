// SPDX-License-Identifier: MIT

//! Scoped ownership of OS handles.
//! Because much of windows requires explicit add/remove actions,
//! wrapping each handle in a single struct that implements Drop gives every handle
//! exactly one close point, on every exit path.

use std::os::windows::io::{FromRawHandle, IntoRawHandle, OwnedHandle};

use log::warn;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::System::StationsAndDesktops::{CloseDesktop, CloseWindowStation};

use crate::runtime::session_acl::SessionObject;

/// A kernel handle closed with `CloseHandle` when dropped.
/// Close failures are logged, never returned.
pub struct ScopedHandle {
    handle: Option<HANDLE>,
    what: &'static str,
}

impl ScopedHandle {
    /// Take ownership of `handle`.  `what` names the handle in log messages.
    pub fn new(handle: HANDLE, what: &'static str) -> Self {
        let handle = if handle.is_invalid() { None } else { Some(handle) };
        Self { handle, what }
    }

    pub fn from_owned(handle: OwnedHandle, what: &'static str) -> Self {
        Self::new(HANDLE(handle.into_raw_handle()), what)
    }

    pub fn raw(&self) -> HANDLE {
        self.handle.unwrap_or_default()
    }

    /// Hand the handle to the caller without closing it.
    pub fn into_owned(mut self) -> Option<OwnedHandle> {
        self.handle
            .take()
            .map(|h| unsafe { OwnedHandle::from_raw_handle(h.0) })
    }

    pub fn close(&mut self) -> windows::core::Result<()> {
        match self.handle.take() {
            None => Ok(()),
            Some(h) => unsafe { CloseHandle(h) },
        }
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing the {} handle failed: {}", self.what, e);
        }
    }
}

/// An open window station or desktop, closed with the matching call when dropped.
pub struct SessionHandle {
    raw: *mut core::ffi::c_void,
    object: SessionObject,
}

impl SessionHandle {
    /// Take ownership of a window station (`HWINSTA`) or desktop (`HDESK`) handle.
    /// Returns `None` for a null handle.
    pub fn new(raw: *mut core::ffi::c_void, object: SessionObject) -> Option<Self> {
        if raw.is_null() { None } else { Some(Self { raw, object }) }
    }

    pub fn raw(&self) -> *mut core::ffi::c_void {
        self.raw
    }

    pub fn object(&self) -> SessionObject {
        self.object
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let ok = unsafe {
            match self.object {
                SessionObject::WindowStation => CloseWindowStation(self.raw),
                SessionObject::Desktop => CloseDesktop(self.raw),
            }
        };
        if ok == 0 {
            warn!("closing the {} handle failed: {}", self.object, std::io::Error::last_os_error());
        }
    }
}
