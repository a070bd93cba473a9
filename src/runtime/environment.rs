// SPDX-License-Identifier: MIT

//! Environment of the child process.
//!
//! The child's environment is the caller's base mapping, a few variables passed through
//! from this process, and the per-user paths from the impersonated user's profile.
//! Loading the profile can fail; that only produces a warning and the base mapping is
//! used as it is.

use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    path::PathBuf,
};

use log::{debug, warn};

use crate::runtime::{
    conv::{from_wide, to_wide},
    error::{LaunchError, ProfileLoadWarning},
    launch_quote,
};

/// Variables copied from this process when present.
pub const PASSTHROUGH_VARS: &[&str] = &["SYSTEMROOT", "APPDATA", "WINDIR", "USERPROFILE"];

const ROAMING_VAR: &str = "APPDATA";
const PROFILE_VAR: &str = "USERPROFILE";
const PUBLIC_VAR: &str = "PUBLIC";
const DEFAULT_PUBLIC_DIR: &str = r"C:\Users\Public";

/// A set of environment variables with Windows key semantics: keys compare
/// case-insensitively and each key appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<OsString, OsString>) -> Self {
        let mut env = Environment::new();
        for (k, v) in map {
            env.set(k, v);
        }
        env
    }

    /// Parse a `KEY=VALUE\0...\0\0` block.
    /// Keys may start with '=' (the per-drive current directories).
    pub fn from_block(block: &[u16]) -> Self {
        let mut env = Environment::new();
        for entry in block.split(|c| *c == 0) {
            if entry.is_empty() {
                // The empty entry is the block terminator.
                break;
            }
            let split = entry
                .iter()
                .skip(1)
                .position(|c| *c == '=' as u16)
                .map(|p| p + 1);
            match split {
                Some(p) => env.set(from_wide(&entry[..p]), from_wide(&entry[p + 1..])),
                None => debug!("ignoring environment entry without '=': {:?}", from_wide(entry)),
            }
        }
        env
    }

    fn position(&self, key: &OsStr) -> Option<usize> {
        let key = fold_key(key);
        self.vars.iter().position(|(k, _)| fold_key(k) == key)
    }

    pub fn get<K: AsRef<OsStr>>(&self, key: K) -> Option<&OsStr> {
        self.position(key.as_ref()).map(|i| self.vars[i].1.as_os_str())
    }

    /// Set the variable, replacing an existing key that differs only in case.
    pub fn set<K: Into<OsString>, V: Into<OsString>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => self.vars[i] = (key, value),
            None => self.vars.push((key, value)),
        }
    }

    pub fn remove<K: AsRef<OsStr>>(&mut self, key: K) -> Option<OsString> {
        self.position(key.as_ref()).map(|i| self.vars.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Encode as an environment block for process creation.
    pub fn to_block(&self) -> Result<Vec<u16>, LaunchError> {
        launch_quote::encode_env_strings(&self.vars)
    }

    pub fn into_map(self) -> HashMap<OsString, OsString> {
        self.vars.into_iter().collect()
    }
}

fn fold_key(key: &OsStr) -> Vec<u16> {
    to_wide(OsStr::new(&key.to_string_lossy().to_uppercase()))
}

/// How the profile of the impersonated user contributed to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    /// The profile provided the per-user roaming and profile paths.
    Loaded,
    /// The profile loaded but had no roaming path; the profile root now points at the
    /// shared public folder.
    MissingRoaming,
    /// The profile could not be loaded; the base mapping is used unchanged.
    Unavailable,
}

/// The environment for one launch.
#[derive(Debug, Clone)]
pub struct BuiltEnvironment {
    pub vars: Environment,
    pub profile: ProfileState,
}

impl BuiltEnvironment {
    /// A sensible working directory: the user's profile folder, when the per-user
    /// profile was loaded.
    pub fn working_dir_hint(&self) -> Option<PathBuf> {
        match self.profile {
            ProfileState::Loaded => self.vars.get(PROFILE_VAR).map(PathBuf::from),
            _ => None,
        }
    }

    /// The working directory hint, or else a new temporary directory.  The directory
    /// is kept after the launch; the child may still be using it.
    pub fn working_dir(&self) -> std::io::Result<PathBuf> {
        if let Some(dir) = self.working_dir_hint() {
            return Ok(dir);
        }
        let dir = tempfile::Builder::new().prefix("spawnas-").tempdir()?.keep();
        debug!("no per-user profile folder; working in {}", dir.display());
        Ok(dir)
    }
}

/// Combines the caller's mapping with the impersonated user's profile variables.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    base: Environment,
    user_name: Option<String>,
    passthrough: Vec<String>,
}

impl EnvironmentBuilder {
    pub fn new(base: HashMap<OsString, OsString>) -> Self {
        EnvironmentBuilder {
            base: Environment::from_map(base),
            ..Default::default()
        }
    }

    /// Set `USER` to the name of the account the child runs as.
    pub fn with_user_name<S: Into<String>>(mut self, name: S) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Copy the standard Windows location variables from this process.
    pub fn with_parent_passthrough(mut self) -> Self {
        self.passthrough = PASSTHROUGH_VARS.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Copy specific variables from this process.
    pub fn with_passthrough<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Merge the profile variables, reading pass-through values from this process.
    pub fn build(self, profile: Result<Environment, ProfileLoadWarning>) -> BuiltEnvironment {
        self.build_with_parent(profile, |key| std::env::var_os(key))
    }

    /// Merge the profile variables, reading pass-through values through `parent`.
    pub fn build_with_parent<F>(
        self,
        profile: Result<Environment, ProfileLoadWarning>,
        parent: F,
    ) -> BuiltEnvironment
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut vars = self.base;
        if let Some(name) = self.user_name {
            vars.set("USER", name);
        }
        for key in &self.passthrough {
            if let Some(v) = parent(key.as_str()) {
                vars.set(key.as_str(), v);
            }
        }

        let profile_env = match profile {
            Ok(env) => env,
            Err(e) => {
                warn!("{}; using the base environment", e);
                return BuiltEnvironment { vars, profile: ProfileState::Unavailable };
            }
        };

        match profile_env.get(ROAMING_VAR) {
            Some(roaming) => {
                vars.set(ROAMING_VAR, roaming);
                if let Some(root) = profile_env.get(PROFILE_VAR) {
                    vars.set(PROFILE_VAR, root);
                }
                debug!("using per-user profile paths, {}={:?}", ROAMING_VAR, roaming);
                BuiltEnvironment { vars, profile: ProfileState::Loaded }
            }
            None => {
                // The default profile root is not writable by an identity whose profile
                // was never loaded.
                let public = profile_env
                    .get(PUBLIC_VAR)
                    .map(OsString::from)
                    .or_else(|| parent(PUBLIC_VAR))
                    .unwrap_or_else(|| OsString::from(DEFAULT_PUBLIC_DIR));
                warn!(
                    "profile has no {}; pointing {} at {:?}",
                    ROAMING_VAR, PROFILE_VAR, public
                );
                vars.set(PROFILE_VAR, public);
                BuiltEnvironment { vars, profile: ProfileState::MissingRoaming }
            }
        }
    }
}
