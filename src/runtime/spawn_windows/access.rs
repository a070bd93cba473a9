// SPDX-License-Identifier: MIT

//! Grant a user access to the interactive window station and desktop.
//!
//! Each grant rebuilds the object's DACL: every existing entry is copied in order, then
//! two access-allowed entries for the user are appended.  Entries are never removed, so
//! repeated grants accumulate duplicates; that is harmless for access checks.

use std::{
    ffi::c_void,
    ptr::null_mut,
    sync::{Mutex, PoisonError},
    time::Instant,
};

use log::{debug, trace, warn};
use windows_sys::Win32::{
    Foundation::ERROR_SUCCESS,
    Security::{
        ACL, ACL_REVISION_DS, ACL_SIZE_INFORMATION, AclSizeInformation, AddAccessAllowedAce,
        AddAce, DACL_SECURITY_INFORMATION, GetAce, GetAclInformation, GetSecurityDescriptorDacl,
        GetUserObjectSecurity, InitializeAcl,
        Authorization::{SE_WINDOW_OBJECT, SetSecurityInfo},
    },
    System::StationsAndDesktops::{
        GetProcessWindowStation, OpenDesktopW, OpenWindowStationW, SetProcessWindowStation,
    },
};

use crate::runtime::{
    config::LauncherConfig,
    conv::as_c_str_w,
    error::AccessError,
    session_acl::{
        AceEntry, AceRecord, DESKTOP_READOBJECTS, DESKTOP_WRITEOBJECTS, DaclPlan, READ_CONTROL,
        SessionObject, Sid, WRITE_DAC, ace_size,
    },
};

use super::{error::last_error_code, handle::SessionHandle};

/// Grants are read-modify-write on shared objects; one at a time per process.
static GRANT_LOCK: Mutex<()> = Mutex::new(());

/// Manages the access entries on the configured window station and desktop.
#[derive(Debug, Clone)]
pub struct AccessGrantManager {
    window_station: String,
    desktop: String,
}

impl AccessGrantManager {
    pub fn new(config: &LauncherConfig) -> Self {
        AccessGrantManager {
            window_station: config.window_station.clone(),
            desktop: config.desktop.clone(),
        }
    }

    /// Append the grants for `sid` to the window station, then to the desktop.
    ///
    /// On failure, the window station may already carry its grants; nothing is undone.
    pub fn grant_interactive_access(&self, sid: &Sid) -> Result<(), AccessError> {
        let _lock = GRANT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();

        let station = self.open_station(READ_CONTROL | WRITE_DAC)?;
        self.grant_on(&station, sid)?;

        let desktop = self.open_desktop_in(
            &station,
            READ_CONTROL | WRITE_DAC | DESKTOP_WRITEOBJECTS | DESKTOP_READOBJECTS,
        )?;
        self.grant_on(&desktop, sid)?;

        debug!(
            "granted {} access to {}\\{} in {:?}",
            sid,
            self.window_station,
            self.desktop,
            started.elapsed()
        );
        Ok(())
    }

    /// The current entries of the object's DACL, in order.
    pub fn read_entries(&self, object: SessionObject) -> Result<Vec<AceEntry>, AccessError> {
        let _lock = GRANT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let station = self.open_station(READ_CONTROL)?;
        let raw = match object {
            SessionObject::WindowStation => self.read_dacl(&station)?,
            SessionObject::Desktop => {
                let desktop = self.open_desktop_in(&station, READ_CONTROL)?;
                self.read_dacl(&desktop)?
            }
        };
        Ok(raw.iter().filter_map(|ace| AceEntry::parse(ace)).collect())
    }

    fn name(&self, object: SessionObject) -> &str {
        match object {
            SessionObject::WindowStation => &self.window_station,
            SessionObject::Desktop => &self.desktop,
        }
    }

    fn open_error(&self, object: SessionObject) -> AccessError {
        AccessError::Open {
            object,
            name: self.name(object).to_string(),
            code: last_error_code(),
        }
    }

    fn read_error(&self, object: SessionObject) -> AccessError {
        AccessError::ReadDacl {
            object,
            name: self.name(object).to_string(),
            code: last_error_code(),
        }
    }

    fn write_error(&self, object: SessionObject, code: u32) -> AccessError {
        AccessError::WriteDacl {
            object,
            name: self.name(object).to_string(),
            code,
        }
    }

    fn open_station(&self, access: u32) -> Result<SessionHandle, AccessError> {
        let object = SessionObject::WindowStation;
        let name = as_c_str_w(self.window_station.as_ref());
        let raw = unsafe { OpenWindowStationW(name.as_ptr(), 0, access) };
        SessionHandle::new(raw, object).ok_or_else(|| self.open_error(object))
    }

    /// Desktops are opened relative to the process window station, so switch to the
    /// target station for the duration of the open.
    ///
    /// The process window station is shared by every thread.  Only grants and reads
    /// hold `GRANT_LOCK`, so other threads that create windows or open desktops during
    /// the switch see the target station.  A failed switch is an open error; the
    /// desktop would otherwise resolve in the caller's own station.
    fn open_desktop_in(
        &self,
        station: &SessionHandle,
        access: u32,
    ) -> Result<SessionHandle, AccessError> {
        let object = SessionObject::Desktop;
        let name = as_c_str_w(self.desktop.as_ref());
        let raw = unsafe {
            let previous = GetProcessWindowStation();
            if previous.is_null() {
                return Err(self.open_error(object));
            }
            if SetProcessWindowStation(station.raw()) == 0 {
                return Err(self.open_error(object));
            }
            let raw = OpenDesktopW(name.as_ptr(), 0, 0, access);
            // Capture the open failure before the restore can overwrite it.
            let code = last_error_code();
            if SetProcessWindowStation(previous) == 0 {
                warn!(
                    "cannot restore the process window station (error {})",
                    last_error_code()
                );
            }
            if raw.is_null() {
                return Err(AccessError::Open {
                    object,
                    name: self.desktop.clone(),
                    code,
                });
            }
            raw
        };
        SessionHandle::new(raw, object).ok_or_else(|| self.open_error(object))
    }

    fn grant_on(&self, handle: &SessionHandle, sid: &Sid) -> Result<(), AccessError> {
        let mut plan = DaclPlan::from_existing(self.read_dacl(handle)?);
        let existing = plan.records().len();
        plan.grant(sid, handle.object());
        trace!(
            "{} '{}': {} existing entries, {} bytes for the rebuilt DACL",
            handle.object(),
            self.name(handle.object()),
            existing,
            plan.acl_size()
        );
        self.write_dacl(handle, &plan)
    }

    /// Copy out every entry of the object's DACL.  A missing DACL reads as empty.
    fn read_dacl(&self, handle: &SessionHandle) -> Result<Vec<Vec<u8>>, AccessError> {
        let object = handle.object();
        let requested = DACL_SECURITY_INFORMATION;
        unsafe {
            // Retrieve the required buffer size for the security descriptor
            let mut needed = 0u32;
            GetUserObjectSecurity(handle.raw(), &requested, null_mut(), 0, &mut needed);
            if needed == 0 {
                return Err(self.read_error(object));
            }

            // u64 storage keeps the descriptor aligned.
            let mut descriptor = vec![0u64; (needed as usize).div_ceil(8)];
            if GetUserObjectSecurity(
                handle.raw(),
                &requested,
                descriptor.as_mut_ptr().cast(),
                needed,
                &mut needed,
            ) == 0
            {
                return Err(self.read_error(object));
            }

            let mut present = 0;
            let mut defaulted = 0;
            let mut dacl: *mut ACL = null_mut();
            if GetSecurityDescriptorDacl(
                descriptor.as_mut_ptr().cast(),
                &mut present,
                &mut dacl,
                &mut defaulted,
            ) == 0
            {
                return Err(self.read_error(object));
            }
            if present == 0 || dacl.is_null() {
                return Ok(Vec::new());
            }

            let mut info: ACL_SIZE_INFORMATION = std::mem::zeroed();
            if GetAclInformation(
                dacl,
                (&mut info as *mut ACL_SIZE_INFORMATION).cast::<c_void>(),
                size_of::<ACL_SIZE_INFORMATION>() as u32,
                AclSizeInformation,
            ) == 0
            {
                return Err(self.read_error(object));
            }

            let mut entries = Vec::with_capacity(info.AceCount as usize);
            for i in 0..info.AceCount {
                let mut ace: *mut c_void = null_mut();
                if GetAce(dacl, i, &mut ace) == 0 || ace.is_null() {
                    return Err(self.read_error(object));
                }
                let header = std::slice::from_raw_parts(ace as *const u8, 4);
                let size = ace_size(header).unwrap_or(0);
                entries.push(std::slice::from_raw_parts(ace as *const u8, size).to_vec());
            }
            Ok(entries)
        }
    }

    /// Materialize the plan as an ACL and set it as the object's DACL.
    fn write_dacl(&self, handle: &SessionHandle, plan: &DaclPlan) -> Result<(), AccessError> {
        let object = handle.object();
        let size = plan.acl_size();
        // u32 storage keeps the ACL DWORD aligned.
        let mut buffer = vec![0u32; size / 4];
        let acl = buffer.as_mut_ptr() as *mut ACL;
        unsafe {
            if InitializeAcl(acl, size as u32, ACL_REVISION_DS) == 0 {
                return Err(self.write_error(object, last_error_code()));
            }
            for record in plan.records() {
                let ok = match record {
                    AceRecord::Existing(raw) => AddAce(
                        acl,
                        ACL_REVISION_DS,
                        u32::MAX, // append
                        raw.as_ptr().cast(),
                        raw.len() as u32,
                    ),
                    AceRecord::Allowed { mask, sid } => {
                        let mut sid = sid.as_bytes().to_vec();
                        AddAccessAllowedAce(acl, ACL_REVISION_DS, *mask, sid.as_mut_ptr().cast())
                    }
                };
                if ok == 0 {
                    return Err(self.write_error(object, last_error_code()));
                }
            }

            let status = SetSecurityInfo(
                handle.raw(),
                SE_WINDOW_OBJECT,
                DACL_SECURITY_INFORMATION,
                null_mut(), // owner: unchanged
                null_mut(), // group: unchanged
                acl,
                std::ptr::null(),
            );
            if status != ERROR_SUCCESS {
                return Err(self.write_error(object, status));
            }
        }
        Ok(())
    }
}
