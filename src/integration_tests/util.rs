// SPDX-License-Identifier: MIT

//! Utility helpers for running the tests.

use std::{
    os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle},
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use windows::Win32::{
    Foundation::{GetHandleInformation, HANDLE},
    Security::{CreateRestrictedToken, DISABLE_MAX_PRIVILEGE, TOKEN_ALL_ACCESS},
    System::Threading::{GetCurrentProcess, OpenProcessToken},
};

use crate::runtime::LauncherConfig;

/// Tests that compare DACL contents or check that a handle value was closed must
/// not see another test's grants or handles land in between.
static SESSION: Mutex<()> = Mutex::new(());

pub fn lock_session() -> MutexGuard<'static, ()> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A primary token for this process's user, with every privilege removed.
/// A restricted copy of the caller's own token can be assigned without
/// extra privileges.
pub fn restricted_token() -> OwnedHandle {
    unsafe {
        let mut process_token = HANDLE::default();
        OpenProcessToken(GetCurrentProcess(), TOKEN_ALL_ACCESS, &mut process_token)
            .expect("open the process token");
        let process_token = OwnedHandle::from_raw_handle(process_token.0);

        let mut restricted = HANDLE::default();
        CreateRestrictedToken(
            HANDLE(process_token.as_raw_handle()),
            DISABLE_MAX_PRIVILEGE,
            None,
            None,
            None,
            &mut restricted,
        )
        .expect("create the restricted token");
        OwnedHandle::from_raw_handle(restricted.0)
    }
}

/// Full path to the system command shell.
pub fn cmd_exe() -> PathBuf {
    let root = std::env::var_os("SystemRoot").unwrap_or_else(|| r"C:\Windows".into());
    let mut path = PathBuf::from(root);
    path.push("System32");
    path.push("cmd.exe");
    path
}

/// Launcher settings for tests; a short diagnostic wait keeps them quick.
pub fn config() -> LauncherConfig {
    LauncherConfig::default().with_diagnostic_wait(Duration::from_millis(50))
}

/// Is the raw handle value still open in this process?
pub fn is_open(raw: RawHandle) -> bool {
    let mut flags = 0u32;
    unsafe { GetHandleInformation(HANDLE(raw), &mut flags) }.is_ok()
}
