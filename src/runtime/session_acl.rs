// SPDX-License-Identifier: MIT

//! Access-control model for the interactive session objects.
//!
//! A window station and its desktop each carry a DACL.  Before a child runs under a
//! different user, that user needs two access-allowed entries on each object: a generic
//! grant and one with the object-specific rights.  The DACL is rebuilt from the existing
//! entries, copied as-is and in order, followed by the new grants.  Nothing is
//! deduplicated; granting the same SID twice leaves four new entries.
//!
//! This module holds the platform-neutral part: the right sets, the SID value, and the
//! plan describing the new DACL.  `spawn_windows::access` applies the plan.

use std::fmt;

use crate::runtime::error::AccessError;

// Generic rights.
pub const GENERIC_READ: u32 = 0x8000_0000;
pub const GENERIC_WRITE: u32 = 0x4000_0000;
pub const GENERIC_EXECUTE: u32 = 0x2000_0000;
pub const GENERIC_ALL: u32 = 0x1000_0000;

// Standard rights.
pub const DELETE: u32 = 0x0001_0000;
pub const READ_CONTROL: u32 = 0x0002_0000;
pub const WRITE_DAC: u32 = 0x0004_0000;
pub const WRITE_OWNER: u32 = 0x0008_0000;

// Window station rights.
pub const WINSTA_ENUMDESKTOPS: u32 = 0x0001;
pub const WINSTA_READATTRIBUTES: u32 = 0x0002;
pub const WINSTA_ACCESSCLIPBOARD: u32 = 0x0004;
pub const WINSTA_CREATEDESKTOP: u32 = 0x0008;
pub const WINSTA_WRITEATTRIBUTES: u32 = 0x0010;
pub const WINSTA_ACCESSGLOBALATOMS: u32 = 0x0020;
pub const WINSTA_EXITWINDOWS: u32 = 0x0040;
pub const WINSTA_ENUMERATE: u32 = 0x0100;
pub const WINSTA_READSCREEN: u32 = 0x0200;

// Desktop rights.
pub const DESKTOP_READOBJECTS: u32 = 0x0001;
pub const DESKTOP_CREATEWINDOW: u32 = 0x0002;
pub const DESKTOP_CREATEMENU: u32 = 0x0004;
pub const DESKTOP_HOOKCONTROL: u32 = 0x0008;
pub const DESKTOP_JOURNALRECORD: u32 = 0x0010;
pub const DESKTOP_JOURNALPLAYBACK: u32 = 0x0020;
pub const DESKTOP_ENUMERATE: u32 = 0x0040;
pub const DESKTOP_WRITEOBJECTS: u32 = 0x0080;
pub const DESKTOP_SWITCHDESKTOP: u32 = 0x0100;

/// The broad grant added first to both objects.
pub const GENERIC_ACCESS: u32 = GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE | GENERIC_ALL;

/// Object-specific grant for the window station.
pub const WINSTA_ALL: u32 = WINSTA_ACCESSCLIPBOARD
    | WINSTA_ACCESSGLOBALATOMS
    | WINSTA_CREATEDESKTOP
    | WINSTA_ENUMDESKTOPS
    | WINSTA_ENUMERATE
    | WINSTA_EXITWINDOWS
    | WINSTA_READATTRIBUTES
    | WINSTA_READSCREEN
    | WINSTA_WRITEATTRIBUTES
    | DELETE
    | READ_CONTROL
    | WRITE_DAC
    | WRITE_OWNER;

/// Object-specific grant for the desktop.
pub const DESKTOP_ALL: u32 = DESKTOP_CREATEMENU
    | DESKTOP_CREATEWINDOW
    | DESKTOP_ENUMERATE
    | DESKTOP_HOOKCONTROL
    | DESKTOP_JOURNALPLAYBACK
    | DESKTOP_JOURNALRECORD
    | DESKTOP_READOBJECTS
    | DESKTOP_SWITCHDESKTOP
    | DESKTOP_WRITEOBJECTS
    | DELETE
    | READ_CONTROL
    | WRITE_DAC
    | WRITE_OWNER;

pub const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;

const ACL_HEADER_SIZE: usize = 8;
const ACE_HEADER_SIZE: usize = 4;
// ACE header + access mask; the SID follows.
const ACCESS_ALLOWED_ACE_FIXED_SIZE: usize = ACE_HEADER_SIZE + 4;
const SID_MAX_SUB_AUTHORITIES: usize = 15;

/// The session objects that receive grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionObject {
    WindowStation,
    Desktop,
}

impl SessionObject {
    /// The object-specific right set.
    pub fn object_rights(&self) -> u32 {
        match self {
            SessionObject::WindowStation => WINSTA_ALL,
            SessionObject::Desktop => DESKTOP_ALL,
        }
    }

    /// The two access masks granted, in order.
    pub fn grants(&self) -> [u32; 2] {
        [GENERIC_ACCESS, self.object_rights()]
    }
}

impl fmt::Display for SessionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionObject::WindowStation => f.write_str("window station"),
            SessionObject::Desktop => f.write_str("desktop"),
        }
    }
}

/// An owned, validated security identifier in its binary form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sid(Vec<u8>);

impl Sid {
    /// Copy the SID out of a buffer.  Trailing bytes past the SID are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AccessError> {
        if bytes.len() < 8 {
            return Err(AccessError::InvalidSid(format!("{} bytes is too short", bytes.len())));
        }
        if bytes[0] != 1 {
            return Err(AccessError::InvalidSid(format!("unknown revision {}", bytes[0])));
        }
        let count = bytes[1] as usize;
        if count > SID_MAX_SUB_AUTHORITIES {
            return Err(AccessError::InvalidSid(format!("{} sub-authorities", count)));
        }
        let len = Self::required_len(count);
        if bytes.len() < len {
            return Err(AccessError::InvalidSid(format!(
                "{} bytes, but {} sub-authorities need {}",
                bytes.len(),
                count,
                len
            )));
        }
        Ok(Sid(bytes[..len].to_vec()))
    }

    fn required_len(sub_authorities: usize) -> usize {
        8 + 4 * sub_authorities
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn authority(&self) -> u64 {
        self.0[2..8].iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
    }

    fn sub_authorities(&self) -> impl Iterator<Item = u32> + '_ {
        self.0[8..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0[0])?;
        let authority = self.authority();
        if authority >> 32 == 0 {
            write!(f, "-{}", authority)?;
        } else {
            write!(f, "-0x{:012X}", authority)?;
        }
        for sub in self.sub_authorities() {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self)
    }
}

/// A decoded access-control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AceEntry {
    pub ace_type: u8,
    pub flags: u8,
    pub mask: u32,
    /// Only decoded for the basic allowed/denied/audit/alarm layouts.
    pub sid: Option<Sid>,
}

impl AceEntry {
    /// Decode the ACE at the start of `raw`.  Returns `None` when the buffer is shorter
    /// than the size the header declares.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let size = ace_size(raw)?;
        if size < ACCESS_ALLOWED_ACE_FIXED_SIZE || raw.len() < size {
            return None;
        }
        let mask = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        // Types 0-3 are ACCESS_ALLOWED, ACCESS_DENIED, SYSTEM_AUDIT and SYSTEM_ALARM,
        // which share one layout.  Object ACEs put GUIDs before the SID.
        let sid = if raw[0] <= 3 {
            Sid::from_bytes(&raw[ACCESS_ALLOWED_ACE_FIXED_SIZE..size]).ok()
        } else {
            None
        };
        Some(AceEntry { ace_type: raw[0], flags: raw[1], mask, sid })
    }

    pub fn is_allowed_for(&self, sid: &Sid) -> bool {
        self.ace_type == ACCESS_ALLOWED_ACE_TYPE && self.sid.as_ref() == Some(sid)
    }
}

/// Read the size field of the ACE header.
pub fn ace_size(raw: &[u8]) -> Option<usize> {
    if raw.len() < ACE_HEADER_SIZE {
        return None;
    }
    Some(u16::from_le_bytes([raw[2], raw[3]]) as usize)
}

/// One entry of the rebuilt DACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AceRecord {
    /// An entry copied from the current DACL, byte for byte.
    Existing(Vec<u8>),
    /// A new access-allowed entry.
    Allowed { mask: u32, sid: Sid },
}

impl AceRecord {
    /// Size of the entry inside the ACL.
    pub fn size(&self) -> usize {
        match self {
            AceRecord::Existing(raw) => raw.len(),
            AceRecord::Allowed { sid, .. } => ACCESS_ALLOWED_ACE_FIXED_SIZE + sid.len(),
        }
    }

    pub fn entry(&self) -> Option<AceEntry> {
        match self {
            AceRecord::Existing(raw) => AceEntry::parse(raw),
            AceRecord::Allowed { mask, sid } => Some(AceEntry {
                ace_type: ACCESS_ALLOWED_ACE_TYPE,
                flags: 0,
                mask: *mask,
                sid: Some(sid.clone()),
            }),
        }
    }
}

/// The DACL to write back: the existing entries followed by the appended grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaclPlan {
    records: Vec<AceRecord>,
}

impl DaclPlan {
    /// Start from the raw entries of the current DACL, in DACL order.
    /// An object without a DACL starts from an empty list.
    pub fn from_existing(existing: Vec<Vec<u8>>) -> Self {
        DaclPlan {
            records: existing.into_iter().map(AceRecord::Existing).collect(),
        }
    }

    /// Append the two grants for `object`.
    pub fn grant(&mut self, sid: &Sid, object: SessionObject) {
        for mask in object.grants() {
            self.records.push(AceRecord::Allowed { mask, sid: sid.clone() });
        }
    }

    pub fn records(&self) -> &[AceRecord] {
        &self.records
    }

    /// Bytes needed for the ACL holding every record, DWORD aligned.
    pub fn acl_size(&self) -> usize {
        let size = ACL_HEADER_SIZE + self.records.iter().map(AceRecord::size).sum::<usize>();
        (size + 3) & !3
    }

    pub fn entries(&self) -> Vec<AceEntry> {
        self.records.iter().filter_map(AceRecord::entry).collect()
    }
}
