// SPDX-License-Identifier: MIT

//! The process creation call, behind a trait so tests can substitute it.

use std::os::windows::io::{AsRawHandle, BorrowedHandle};

use windows::{
    Win32::{
        Foundation::HANDLE,
        System::Threading::{
            CreateProcessAsUserW, PROCESS_CREATION_FLAGS, PROCESS_INFORMATION, STARTUPINFOW,
        },
    },
    core::{PCWSTR, PWSTR},
};

use super::handle::ScopedHandle;

/// Everything process creation consumes.  All strings are NUL terminated UTF-16.
pub struct CreateRequest<'a> {
    /// The security context the child runs as.
    pub token: BorrowedHandle<'a>,
    pub application: Option<&'a [u16]>,
    /// Writable; creation may modify it in place.
    pub command_line: &'a mut [u16],
    pub inherit_handles: bool,
    pub creation_flags: u32,
    /// A double NUL terminated UTF-16 block, or `None` to inherit this process's.
    pub environment: Option<&'a [u16]>,
    pub current_directory: Option<&'a [u16]>,
    pub startup_info: &'a STARTUPINFOW,
}

/// The handles and ids of a created process.
pub struct CreatedProcess {
    pub process: ScopedHandle,
    pub thread: ScopedHandle,
    pub pid: u32,
    pub tid: u32,
}

/// Creates a process running as the identity of a token.
pub trait CreateProcessAsIdentity {
    fn create(&self, request: CreateRequest<'_>) -> windows::core::Result<CreatedProcess>;
}

/// The default strategy, `CreateProcessAsUserW`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateProcessAsUser;

impl CreateProcessAsIdentity for CreateProcessAsUser {
    fn create(&self, request: CreateRequest<'_>) -> windows::core::Result<CreatedProcess> {
        let mut pi = PROCESS_INFORMATION::default();
        unsafe {
            CreateProcessAsUserW(
                Some(HANDLE(request.token.as_raw_handle())),
                match request.application {
                    Some(app) => PCWSTR(app.as_ptr()),
                    None => PCWSTR::null(),
                },
                Some(PWSTR(request.command_line.as_mut_ptr())),
                None, // process security attributes
                None, // thread security attributes
                request.inherit_handles,
                PROCESS_CREATION_FLAGS(request.creation_flags),
                request.environment.map(|env| env.as_ptr() as *const std::ffi::c_void),
                match request.current_directory {
                    Some(cwd) => PCWSTR(cwd.as_ptr()),
                    None => PCWSTR::null(),
                },
                request.startup_info,
                &mut pi,
            )?;
        }
        Ok(CreatedProcess {
            process: ScopedHandle::new(pi.hProcess, "process"),
            thread: ScopedHandle::new(pi.hThread, "thread"),
            pid: pi.dwProcessId,
            tid: pi.dwThreadId,
        })
    }
}
