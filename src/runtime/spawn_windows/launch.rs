// SPDX-License-Identifier: MIT

//! Run a process as another user, wired to the caller's standard streams.

use std::{
    os::windows::io::BorrowedHandle,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, error, info, warn};
use windows::Win32::{
    Foundation::ERROR_ACCESS_DENIED,
    System::Threading::{
        CREATE_UNICODE_ENVIRONMENT, STARTF_USESHOWWINDOW, STARTF_USESTDHANDLES, STARTUPINFOW,
    },
    UI::WindowsAndMessaging::SW_HIDE,
};

use crate::runtime::{
    config::LauncherConfig,
    environment::Environment,
    error::LaunchError,
    launch_quote::enforce_no_zero,
    spawn::Command,
};

use super::{
    access::AccessGrantManager,
    create::{CreateProcessAsIdentity, CreateProcessAsUser, CreateRequest, CreatedProcess},
    error::win32_code,
    fd::{InheritedStdio, StdioHandles},
    process::UserProcess,
    token::token_user_sid,
};

/// What to launch, and with which resources.
pub struct LaunchRequest {
    pub command: Command,
    /// Explicit application path.  `None` lets the first command line token name it.
    pub executable: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    /// `None` inherits this process's environment.
    pub env: Option<Environment>,
    /// The child's standard streams.  Always closed in this process by the launch.
    pub stdio: Option<StdioHandles>,
    pub creation_flags: u32,
    /// Run through the command shell, with a hidden window.
    pub shell: bool,
    /// Don't let the child inherit handles.
    pub close_fds: bool,
}

impl LaunchRequest {
    pub fn new(command: Command) -> Self {
        LaunchRequest {
            command,
            executable: None,
            cwd: None,
            env: None,
            stdio: None,
            creation_flags: 0,
            shell: false,
            close_fds: false,
        }
    }

    pub fn with_executable<P: Into<PathBuf>>(mut self, executable: P) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_stdio(mut self, stdio: StdioHandles) -> Self {
        self.stdio = Some(stdio);
        self
    }

    pub fn with_creation_flags(mut self, flags: u32) -> Self {
        self.creation_flags = flags;
        self
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_close_fds(mut self, close_fds: bool) -> Self {
        self.close_fds = close_fds;
        self
    }
}

/// Launches processes as the user behind a token.
pub struct SecureProcessLauncher<C = CreateProcessAsUser> {
    config: LauncherConfig,
    access: AccessGrantManager,
    creator: C,
}

impl SecureProcessLauncher<CreateProcessAsUser> {
    pub fn new(config: LauncherConfig) -> Self {
        Self::with_creator(config, CreateProcessAsUser)
    }
}

impl Default for SecureProcessLauncher<CreateProcessAsUser> {
    fn default() -> Self {
        Self::new(LauncherConfig::default())
    }
}

impl<C: CreateProcessAsIdentity> SecureProcessLauncher<C> {
    pub fn with_creator(config: LauncherConfig, creator: C) -> Self {
        let access = AccessGrantManager::new(&config);
        SecureProcessLauncher { config, access, creator }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn access(&self) -> &AccessGrantManager {
        &self.access
    }

    pub fn creator(&self) -> &C {
        &self.creator
    }

    /// Launch the request as the user of `context`.
    ///
    /// The token is only borrowed.  The request's stdio handles are closed in this
    /// process before returning, whatever the outcome.  Access grants made before a
    /// failed creation stay in place.
    pub fn launch(
        &self,
        context: BorrowedHandle<'_>,
        request: LaunchRequest,
    ) -> Result<UserProcess, LaunchError> {
        let LaunchRequest {
            command,
            executable,
            cwd,
            env,
            stdio,
            creation_flags,
            shell,
            close_fds,
        } = request;
        // Owns the parent's copies of the child's streams from here on.  Declared first,
        // so it is closed last.
        let stdio = stdio.map(InheritedStdio::prepare).transpose().map_err(to_launch_error)?;
        let started = Instant::now();

        let shell_path = shell.then(|| self.config.shell());
        let mut command_line = command.to_command_line(shell_path.as_deref())?;
        debug!("resolved command line: {}", String::from_utf16_lossy(&command_line));
        command_line.push(0);

        let application = executable
            .as_deref()
            .map(|p| nul_terminated(p.as_os_str()))
            .transpose()?;
        let current_directory = cwd
            .as_deref()
            .map(|p| nul_terminated(p.as_os_str()))
            .transpose()?;
        let environment = env.as_ref().map(Environment::to_block).transpose()?;

        let mut startup = STARTUPINFOW {
            cb: size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };
        if let Some(s) = &stdio {
            if close_fds {
                warn!("stdio handles are not inherited when close_fds is set");
            }
            startup.dwFlags = startup.dwFlags | STARTF_USESTDHANDLES;
            startup.hStdInput = s.stdin.raw();
            startup.hStdOutput = s.stdout.raw();
            startup.hStdError = s.stderr.raw();
        }
        if shell {
            startup.dwFlags = startup.dwFlags | STARTF_USESHOWWINDOW;
            startup.wShowWindow = SW_HIDE.0 as u16;
        }

        let sid = token_user_sid(context)?;
        self.access.grant_interactive_access(&sid)?;
        let granted = started.elapsed();

        let mut flags = creation_flags;
        if environment.is_some() {
            flags |= CREATE_UNICODE_ENVIRONMENT.0;
        }

        let created = self.creator.create(CreateRequest {
            token: context,
            application: application.as_deref(),
            command_line: &mut command_line,
            inherit_handles: !close_fds,
            creation_flags: flags,
            environment: environment.as_deref(),
            current_directory: current_directory.as_deref(),
            startup_info: &startup,
        });
        let CreatedProcess { process, thread, pid, tid } = match created {
            Ok(created) => created,
            Err(e) => return Err(self.creation_error(&e, &command, executable.as_deref())),
        };
        drop(thread);

        let child = UserProcess::new(process, pid);
        info!(
            "launched pid {} (thread {}) as {} in {:?} ({:?} granting access)",
            pid,
            tid,
            sid,
            started.elapsed(),
            granted
        );
        self.diagnostic_wait(&child);
        Ok(child)
    }

    /// Catch children that die right away, so the cause lands in the log.
    fn diagnostic_wait(&self, child: &UserProcess) {
        let wait = self.config.diagnostic_wait;
        match child.wait_millis(self.config.diagnostic_wait_millis()) {
            Ok(Some(code)) => warn!("pid {} exited within {:?} with code {}", child.pid(), wait, code),
            Ok(None) => debug!("pid {} still running after {:?}", child.pid(), wait),
            Err(e) => warn!("cannot check pid {} after launch: {}", child.pid(), e),
        }
    }

    fn creation_error(
        &self,
        e: &windows::core::Error,
        command: &Command,
        executable: Option<&Path>,
    ) -> LaunchError {
        if e.code() == ERROR_ACCESS_DENIED.into() {
            let executable = resolve_executable(command, executable);
            error!(
                "permission denied running {}; check that the user can read and execute it",
                executable.display()
            );
            LaunchError::PermissionDenied { executable }
        } else {
            let code = win32_code(e);
            error!(
                "creating {} failed: {}",
                resolve_executable(command, executable).display(),
                e
            );
            LaunchError::CreateFailed { code }
        }
    }
}

/// Launch with the default configuration and process creation.
pub fn launch_as_user(
    context: BorrowedHandle<'_>,
    request: LaunchRequest,
) -> Result<UserProcess, LaunchError> {
    SecureProcessLauncher::default().launch(context, request)
}

/// The full path of the program being run, when it can be found on the search path.
fn resolve_executable(command: &Command, executable: Option<&Path>) -> PathBuf {
    let program = executable
        .map(Path::to_path_buf)
        .or_else(|| command.program())
        .unwrap_or_default();
    which::which(&program).unwrap_or(program)
}

fn nul_terminated(val: &std::ffi::OsStr) -> Result<Vec<u16>, LaunchError> {
    let mut ret = enforce_no_zero(val)?;
    ret.push(0);
    Ok(ret)
}

fn to_launch_error(e: windows::core::Error) -> LaunchError {
    LaunchError::Io(std::io::Error::from_raw_os_error(win32_code(&e) as i32))
}
