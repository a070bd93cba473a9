// SPDX-License-Identifier: MIT

//! Windows Argument Quoting Rules
//!
//! Unfortunately, there currently is no crate that supplies this logic, and
//! the Rust standard library has these as crate private.  Therefore, there's
//! no choice (at the moment) than to implement this tricky logic here.
//!
//! See "Everyone quotes command line arguments the wrong way":
//!   https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
//! and
//!   https://docs.microsoft.com/en-us/archive/blogs/larryosterman/the-windows-command-line-is-just-a-string
//!
//! The argument vector includes the program name as arg 0.  Everything here works on
//! UTF-16 code units without a trailing NUL; the launcher adds the terminator.

use std::ffi::{OsStr, OsString};

use crate::runtime::{conv::to_wide, error::LaunchError};

/// Turn environment variables into the block format used by process creation.
/// Warning: callers must ensure that the list of key/values contains no duplicate keys.
/// Windows requires that no duplicate keys exist, and this function does not detect duplicates.
/// For the most part, the caller should ensure the key does not contain '=', but there
/// are a few special variables that do contain '=' such as '=C:' that are commonly needed by Windows.
pub fn encode_env_strings(env: &[(OsString, OsString)]) -> Result<Vec<u16>, LaunchError> {
    if env.is_empty() {
        // An empty environment block is just two NULs.
        return Ok(vec![0, 0]);
    }
    let mut pairs: Vec<(&OsString, &OsString)> = env.iter().map(|(k, v)| (k, v)).collect();
    // Sort by key, case-insensitive: Windows compares keys as uppercase ordinals.
    pairs.sort_by(|a, b| {
        let a_key = a.0.to_string_lossy().to_uppercase();
        let b_key = b.0.to_string_lossy().to_uppercase();
        a_key.cmp(&b_key)
    });

    let mut block: Vec<u16> = Vec::new();
    for (k, v) in pairs {
        block.extend(enforce_no_zero(k)?);
        block.push('=' as u16);
        block.extend(enforce_no_zero(v)?);
        block.push(0); // NUL terminator for this entry
    }
    block.push(0); // extra NUL terminator ends the block
    Ok(block)
}

/// Quote an argument vector (program name first) into a single command line.
pub fn join_arguments(args: &[OsString]) -> Result<Vec<u16>, LaunchError> {
    let mut ret = vec![];
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            ret.push(' ' as u16);
        }
        append_arg(&mut ret, arg)?;
    }
    Ok(ret)
}

/// Run the command line through the shell: `<shell> /c "<command>"`.
/// The inner command is not re-escaped; `cmd.exe` strips the outer quotes itself.
pub fn shell_wrap(shell: &OsStr, command: &[u16]) -> Result<Vec<u16>, LaunchError> {
    let mut ret = enforce_no_zero(shell)?;
    ret.extend(" /c \"".encode_utf16());
    ret.extend_from_slice(command);
    ret.push('"' as u16);
    Ok(ret)
}

fn append_arg(cmd: &mut Vec<u16>, arg: &OsStr) -> Result<(), LaunchError> {
    let arg = enforce_no_zero(arg)?;
    if !requires_quoting(&arg) {
        cmd.extend_from_slice(&arg);
        return Ok(());
    }

    // Perform quoting.
    cmd.push('"' as u16);
    let mut backslash_count = 0;
    for c in arg {
        if c == '\\' as u16 {
            backslash_count += 1;
            continue;
        }
        if c == '"' as u16 {
            // Escape all the backslashes, and add one for the escaped '"'.
            for _ in 0..(backslash_count * 2 + 1) {
                cmd.push('\\' as u16);
            }
        } else {
            // Backslashes aren't special.
            for _ in 0..backslash_count {
                cmd.push('\\' as u16);
            }
        }
        cmd.push(c);
        backslash_count = 0;
    }

    // Escape all the trailing backslashes.
    // Let the final '"' be still considered a meta-character.
    for _ in 0..(backslash_count * 2) {
        cmd.push('\\' as u16);
    }

    cmd.push('"' as u16);
    Ok(())
}

/// Convert to UTF-16, refusing embedded NULs.
pub(crate) fn enforce_no_zero(val: &OsStr) -> Result<Vec<u16>, LaunchError> {
    let ret = to_wide(val);
    if ret.contains(&0) {
        Err(LaunchError::InvalidRequest(format!(
            "nul byte found in value {:?}",
            val.to_string_lossy()
        )))
    } else {
        Ok(ret)
    }
}

fn requires_quoting(val: &[u16]) -> bool {
    val.is_empty() || val.iter().copied().any(char_requires_quoting)
}

fn char_requires_quoting(b: u16) -> bool {
    b == ' ' as u16
    || b == '\t' as u16
    || b == '\n' as u16
    || b == 0x0bu16  // vertical tab (\v in c)
    || b == '"' as u16
}

/// Split a command line the way the Microsoft C runtime builds `argv`.
/// Used to check that quoting round-trips.
#[cfg(test)]
pub(crate) fn split_command_line(line: &str) -> Vec<String> {
    let mut args = vec![];
    let mut current = String::new();
    let mut in_arg = false;
    let mut in_quotes = false;
    let mut backslashes = 0usize;
    for c in line.chars() {
        match c {
            '\\' => {
                backslashes += 1;
                in_arg = true;
            }
            '"' => {
                current.extend(std::iter::repeat_n('\\', backslashes / 2));
                if backslashes % 2 == 1 {
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                backslashes = 0;
                in_arg = true;
            }
            ' ' | '\t' if !in_quotes => {
                current.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                current.push(c);
                in_arg = true;
            }
        }
    }
    current.extend(std::iter::repeat_n('\\', backslashes));
    if in_arg {
        args.push(current);
    }
    args
}
