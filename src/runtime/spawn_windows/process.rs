// SPDX-License-Identifier: MIT

//! The launched child, as handed to the caller.

use std::{
    os::windows::io::{AsHandle, AsRawHandle, BorrowedHandle, OwnedHandle, RawHandle},
    sync::Mutex,
    time::Duration,
};

use windows::{
    Win32::{
        Foundation::{STILL_ACTIVE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT},
        System::Threading::{GetExitCodeProcess, INFINITE, TerminateProcess, WaitForSingleObject},
    },
    core,
};

use crate::runtime::spawn::Child;

use super::{error::win32_code, handle::ScopedHandle};

/// A running (or finished) child process.
///
/// Dropping it closes the process handle but never terminates the child.
pub struct UserProcess {
    handle: ScopedHandle,
    pid: u32,
    state: Mutex<ProcessState>,
}

#[derive(Default)]
struct ProcessState {
    terminated: bool,
    exit_code: Option<u32>,
}

impl UserProcess {
    pub(crate) fn new(handle: ScopedHandle, pid: u32) -> Self {
        Self {
            handle,
            pid,
            state: Mutex::new(ProcessState::default()),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the exit code for the process, or None if it hasn't exited yet.
    pub fn exit_code(&self) -> Result<Option<u32>, std::io::Error> {
        let mut guard = self.lock()?;
        if guard.exit_code.is_none() {
            guard.exit_code = self.inner_exit_code().map_err(to_io)?;
        }
        Ok(guard.exit_code)
    }

    fn inner_exit_code(&self) -> core::Result<Option<u32>> {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.handle.raw(), &mut code)? };
        if code == STILL_ACTIVE.0 as u32 {
            Ok(None)
        } else {
            Ok(Some(code))
        }
    }

    /// Wait up to `millis` milliseconds; `INFINITE` waits forever.
    pub(crate) fn wait_millis(&self, millis: u32) -> Result<Option<u32>, std::io::Error> {
        let event = unsafe { WaitForSingleObject(self.handle.raw(), millis) };
        if event == WAIT_OBJECT_0 {
            self.exit_code()
        } else if event == WAIT_TIMEOUT {
            Ok(None)
        } else if event == WAIT_FAILED {
            Err(std::io::Error::last_os_error())
        } else {
            Err(std::io::Error::other(format!("unexpected wait result {:?}", event)))
        }
    }

    /// Terminate the process.  Only requested once; a process that already exited is
    /// left alone.
    pub fn terminate(&self, exit_code: u32) -> Result<(), std::io::Error> {
        let mut guard = self.lock()?;
        if guard.terminated || guard.exit_code.is_some() {
            return Ok(());
        }
        if let Some(code) = self.inner_exit_code().map_err(to_io)? {
            guard.exit_code = Some(code);
            return Ok(());
        }
        unsafe { TerminateProcess(self.handle.raw(), exit_code) }.map_err(to_io)?;
        guard.terminated = true;
        Ok(())
    }

    /// Give up the wrapper, keeping the process handle open.
    pub fn into_handle(self) -> Option<OwnedHandle> {
        self.handle.into_owned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ProcessState>, std::io::Error> {
        self.state
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "lock poisoned"))
    }
}

impl AsRawHandle for UserProcess {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle.raw().0
    }
}

impl AsHandle for UserProcess {
    fn as_handle(&self) -> BorrowedHandle<'_> {
        // The handle stays open for as long as self.
        unsafe { BorrowedHandle::borrow_raw(self.handle.raw().0) }
    }
}

impl Child for UserProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self, exit_code: u32) -> Result<(), std::io::Error> {
        UserProcess::terminate(self, exit_code)
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Option<u32>, std::io::Error> {
        self.wait_millis(timeout_millis(timeout))
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_code().ok().flatten()
    }
}

fn timeout_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE,
        Some(d) => d.as_millis().min((INFINITE - 1) as u128) as u32,
    }
}

fn to_io(e: core::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(win32_code(&e) as i32)
}
