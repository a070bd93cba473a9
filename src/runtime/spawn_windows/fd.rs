// SPDX-License-Identifier: MIT

//! Standard i/o handles passed from the parent to the child.

use std::fs::File;
#[cfg(test)]
use std::os::windows::io::AsRawHandle;
use std::os::windows::io::{FromRawHandle, OwnedHandle};

use windows::Win32::{
    Foundation::{FALSE, HANDLE, HANDLE_FLAG_INHERIT, SetHandleInformation},
    Security,
    System::Pipes,
};

use crate::runtime::spawn_windows::handle::ScopedHandle;

/// The child's ends of its standard streams.
///
/// Moved into the launch request; the launcher closes the parent's copies once
/// process creation has been attempted, whether it succeeded or not.
pub struct StdioHandles {
    pub stdin: OwnedHandle,
    pub stdout: OwnedHandle,
    pub stderr: OwnedHandle,
}

/// The parent's ends of freshly created pipes for the child's standard streams.
pub struct StdioPipes {
    /// Write end of the child's stdin.
    pub stdin: File,
    /// Read end of the child's stdout.
    pub stdout: File,
    /// Read end of the child's stderr.
    pub stderr: File,
}

#[derive(Debug, Clone, Copy)]
enum StreamDirection {
    ToChild,
    FromChild,
}

const DEFAULT_BUFFER_SIZE: u32 = 0; // use default buffer size

impl StdioPipes {
    /// Create three anonymous pipes.  Returns the parent's ends, and the child's ends
    /// ready to be put on a launch request.
    pub fn new() -> windows::core::Result<(StdioPipes, StdioHandles)> {
        let (stdin_parent, stdin_child) = pipe(StreamDirection::ToChild)?;
        let (stdout_parent, stdout_child) = pipe(StreamDirection::FromChild)?;
        let (stderr_parent, stderr_child) = pipe(StreamDirection::FromChild)?;
        Ok((
            StdioPipes {
                stdin: File::from(stdin_parent),
                stdout: File::from(stdout_parent),
                stderr: File::from(stderr_parent),
            },
            StdioHandles {
                stdin: stdin_child,
                stdout: stdout_child,
                stderr: stderr_child,
            },
        ))
    }
}

/// Create a pipe, returning the (parent, child) ends.  Neither end is inheritable;
/// the launcher turns inheritance on for the child end right before creation.
fn pipe(direction: StreamDirection) -> windows::core::Result<(OwnedHandle, OwnedHandle)> {
    let sa = Security::SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<Security::SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: std::ptr::null_mut(),
        bInheritHandle: FALSE,
    };

    let mut read = HANDLE::default();
    let mut write = HANDLE::default();

    unsafe {
        Pipes::CreatePipe(
            &mut read,  // hReadPipe (writes to the variable)
            &mut write, // hWritePipe (writes to the variable)
            Some(&sa),  // lpPipeAttributes (controls inheritability)
            DEFAULT_BUFFER_SIZE,
        )?;
    }
    let (read, write) = unsafe {
        (OwnedHandle::from_raw_handle(read.0), OwnedHandle::from_raw_handle(write.0))
    };

    Ok(match direction {
        StreamDirection::ToChild => (write, read),
        StreamDirection::FromChild => (read, write),
    })
}

/// The parent's copies of the child's standard streams while a launch is in flight.
/// Dropping closes all three, logging close failures.
pub(crate) struct InheritedStdio {
    pub stdin: ScopedHandle,
    pub stdout: ScopedHandle,
    pub stderr: ScopedHandle,
}

impl InheritedStdio {
    /// Take ownership of the handles and mark them inheritable.
    pub fn prepare(handles: StdioHandles) -> windows::core::Result<Self> {
        let StdioHandles { stdin, stdout, stderr } = handles;
        let ret = InheritedStdio {
            stdin: ScopedHandle::from_owned(stdin, "stdin"),
            stdout: ScopedHandle::from_owned(stdout, "stdout"),
            stderr: ScopedHandle::from_owned(stderr, "stderr"),
        };
        for h in [&ret.stdin, &ret.stdout, &ret.stderr] {
            allow_inheritable(h.raw())?;
        }
        Ok(ret)
    }
}

/// Prepare windows handle for inheriting into the child.
pub(crate) fn allow_inheritable(allow: HANDLE) -> windows::core::Result<()> {
    unsafe { SetHandleInformation(allow, HANDLE_FLAG_INHERIT.0, HANDLE_FLAG_INHERIT)? };
    Ok(())
}

#[cfg(test)]
pub(crate) fn is_inheritable<H: AsRawHandle>(h: &H) -> windows::core::Result<bool> {
    let mut flags = 0u32;
    unsafe {
        windows::Win32::Foundation::GetHandleInformation(HANDLE(h.as_raw_handle()), &mut flags)?
    };
    Ok(flags & HANDLE_FLAG_INHERIT.0 != 0)
}
