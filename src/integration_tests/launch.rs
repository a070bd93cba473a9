// SPDX-License-Identifier: MIT

//! Launch `cmd.exe` as the current user through the full launcher.

use std::{
    collections::HashMap,
    ffi::OsString,
    io::Read,
    os::windows::io::{AsHandle, AsRawHandle},
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use windows::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, WIN32_ERROR};
use windows_sys::Win32::{
    Foundation::LocalFree,
    UI::Shell::CommandLineToArgvW,
};

use crate::runtime::{
    AccessError, Child, Command, CreateProcessAsIdentity, CreateRequest, CreatedProcess,
    EnvironmentBuilder, LaunchError, LaunchRequest, ProfileState, SecureProcessLauncher,
    StdioPipes,
};

use super::util;

fn cmd(args: &[&str]) -> Command {
    let mut argv = vec![util::cmd_exe().into_os_string()];
    argv.extend(args.iter().map(OsString::from));
    Command::Argv(argv)
}

/// Creation that always fails with the given code, counting the attempts.
struct FailingCreate {
    code: WIN32_ERROR,
    calls: AtomicUsize,
}

impl FailingCreate {
    fn new(code: WIN32_ERROR) -> Self {
        FailingCreate { code, calls: AtomicUsize::new(0) }
    }
}

impl CreateProcessAsIdentity for FailingCreate {
    fn create(&self, _request: CreateRequest<'_>) -> windows::core::Result<CreatedProcess> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(windows::core::Error::new(self.code.into(), "refused by test"))
    }
}

#[test]
fn exit_code_is_reported() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let child = launcher
        .launch(token.as_handle(), LaunchRequest::new(cmd(&["/c", "exit", "3"])))
        .unwrap();
    assert_ne!(child.pid(), 0);
    assert_eq!(child.wait(Some(Duration::from_secs(30))).unwrap(), Some(3));
    assert_eq!(child.exit_status(), Some(3));
}

#[test]
fn shell_mode_wraps_the_command() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let request = LaunchRequest::new(Command::line("exit 7")).with_shell(true);
    let child = launcher.launch(token.as_handle(), request).unwrap();
    assert_eq!(child.wait(Some(Duration::from_secs(30))).unwrap(), Some(7));
}

/// The child writes to its stdout pipe; the parent's copies of the child ends are
/// closed by the launch, so reading reaches end of file once the child exits.
#[test]
fn stdout_is_piped_and_child_ends_closed() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let (mut parent, child_ends) = StdioPipes::new().unwrap();
    let child_raw = [
        child_ends.stdin.as_raw_handle(),
        child_ends.stdout.as_raw_handle(),
        child_ends.stderr.as_raw_handle(),
    ];

    let request = LaunchRequest::new(cmd(&["/c", "echo", "hello"])).with_stdio(child_ends);
    let child = launcher.launch(token.as_handle(), request).unwrap();
    for raw in child_raw {
        assert!(!util::is_open(raw), "child end {:?} still open in the parent", raw);
    }

    drop(parent.stdin);
    let mut out = String::new();
    parent.stdout.read_to_string(&mut out).unwrap();
    assert_eq!(out.trim(), "hello");
    assert_eq!(child.wait(Some(Duration::from_secs(30))).unwrap(), Some(0));
}

#[test]
fn environment_reaches_the_child() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let mut base = HashMap::new();
    base.insert(OsString::from("SPAWNAS_PROBE"), OsString::from("from-parent"));
    let built = EnvironmentBuilder::new(base)
        .with_parent_passthrough()
        .build_for_token(token.as_handle());
    assert_ne!(built.profile, ProfileState::Unavailable);

    let (mut parent, child_ends) = StdioPipes::new().unwrap();
    let request = LaunchRequest::new(Command::line("cmd.exe /c echo %SPAWNAS_PROBE%"))
        .with_executable(util::cmd_exe())
        .with_env(built.vars)
        .with_stdio(child_ends);
    let child = launcher.launch(token.as_handle(), request).unwrap();

    drop(parent.stdin);
    let mut out = String::new();
    parent.stdout.read_to_string(&mut out).unwrap();
    assert_eq!(out.trim(), "from-parent");
    assert_eq!(child.wait(Some(Duration::from_secs(30))).unwrap(), Some(0));
}

/// A directory can't be executed; creation fails with access denied.
#[test]
fn unrunnable_executable_is_permission_denied() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());
    let dir = tempfile::tempdir().unwrap();

    let (_parent, child_ends) = StdioPipes::new().unwrap();
    let child_raw = child_ends.stdout.as_raw_handle();
    let request = LaunchRequest::new(Command::line("not-a-program"))
        .with_executable(dir.path())
        .with_stdio(child_ends);

    match launcher.launch(token.as_handle(), request) {
        Err(LaunchError::PermissionDenied { executable }) => {
            assert_eq!(executable, dir.path());
        }
        Err(e) => panic!("expected permission denied, found {}", e),
        Ok(child) => panic!("directory launched as pid {}", child.pid()),
    }
    assert!(!util::is_open(child_raw));
}

#[test]
fn access_denied_names_the_resolved_program() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let create = FailingCreate::new(ERROR_ACCESS_DENIED);
    let launcher = SecureProcessLauncher::with_creator(util::config(), create);

    let err = launcher
        .launch(token.as_handle(), LaunchRequest::new(Command::argv(["cmd", "/c", "exit"])))
        .err()
        .expect("creation is refused");
    match err {
        LaunchError::PermissionDenied { executable } => {
            let name = executable.file_name().unwrap().to_string_lossy().to_lowercase();
            assert_eq!(name, "cmd.exe", "{}", executable.display());
        }
        e => panic!("expected permission denied, found {}", e),
    }
}

#[test]
fn other_creation_failures_keep_the_code() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher =
        SecureProcessLauncher::with_creator(util::config(), FailingCreate::new(ERROR_FILE_NOT_FOUND));

    let (_parent, child_ends) = StdioPipes::new().unwrap();
    let child_raw = child_ends.stdin.as_raw_handle();
    let request = LaunchRequest::new(cmd(&["/c", "exit"])).with_stdio(child_ends);
    match launcher.launch(token.as_handle(), request) {
        Err(LaunchError::CreateFailed { code }) => assert_eq!(code, ERROR_FILE_NOT_FOUND.0),
        Err(e) => panic!("expected a creation failure, found {}", e),
        Ok(child) => panic!("launched pid {}", child.pid()),
    }
    assert_eq!(launcher_calls(&launcher), 1);
    assert!(!util::is_open(child_raw));
}

/// A failed grant stops the launch before creation, and still closes the stdio.
#[test]
fn grant_failure_aborts_before_creation() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let config = util::config().with_window_station("spawnas-no-such-station");
    let launcher = SecureProcessLauncher::with_creator(config, FailingCreate::new(ERROR_FILE_NOT_FOUND));

    let (_parent, child_ends) = StdioPipes::new().unwrap();
    let child_raw = child_ends.stderr.as_raw_handle();
    let request = LaunchRequest::new(cmd(&["/c", "exit"])).with_stdio(child_ends);
    match launcher.launch(token.as_handle(), request) {
        Err(LaunchError::Access(AccessError::Open { .. })) => {}
        Err(e) => panic!("expected an access error, found {}", e),
        Ok(child) => panic!("launched pid {}", child.pid()),
    }
    assert_eq!(launcher_calls(&launcher), 0);
    assert!(!util::is_open(child_raw));
}

#[test]
fn nul_in_arguments_is_rejected_before_any_grant() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::with_creator(
        util::config().with_window_station("spawnas-no-such-station"),
        FailingCreate::new(ERROR_FILE_NOT_FOUND),
    );
    let request = LaunchRequest::new(Command::argv(["cmd", "/c", "echo \0"]));
    assert!(matches!(
        launcher.launch(token.as_handle(), request),
        Err(LaunchError::InvalidRequest(_))
    ));
}

/// A bounded wait returns while the child is still running; terminate stops it.
#[test]
fn bounded_wait_then_terminate() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let (_parent, child_ends) = StdioPipes::new().unwrap();
    let request = LaunchRequest::new(cmd(&["/c", "ping", "-n", "30", "127.0.0.1"]))
        .with_stdio(child_ends);
    let child = launcher.launch(token.as_handle(), request).unwrap();

    let started = Instant::now();
    assert_eq!(child.wait(Some(Duration::from_millis(200))).unwrap(), None);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(child.exit_code().unwrap(), None);

    child.terminate(9).unwrap();
    assert_eq!(child.wait(Some(Duration::from_secs(30))).unwrap(), Some(9));
    // Already terminated; a second request is a no-op.
    child.terminate(1).unwrap();
    assert_eq!(child.exit_code().unwrap(), Some(9));
}

/// The post-creation wait is bounded even when the child never exits on its own.
#[test]
fn diagnostic_wait_is_bounded() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let config = util::config().with_diagnostic_wait(Duration::from_millis(500));
    let launcher = SecureProcessLauncher::new(config);

    let (_parent, child_ends) = StdioPipes::new().unwrap();
    let request = LaunchRequest::new(cmd(&["/c", "ping", "-n", "30", "127.0.0.1"]))
        .with_stdio(child_ends);
    let started = Instant::now();
    let child = launcher.launch(token.as_handle(), request).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(400), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
    child.terminate(1).unwrap();
}

/// Terminating a child that already exited keeps its real exit code.
#[test]
fn terminate_after_exit_keeps_exit_code() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let launcher = SecureProcessLauncher::new(util::config());

    let child = launcher
        .launch(token.as_handle(), LaunchRequest::new(cmd(&["/c", "exit", "0"])))
        .unwrap();
    assert_eq!(child.wait(None).unwrap(), Some(0));
    child.terminate(5).unwrap();
    assert_eq!(child.exit_code().unwrap(), Some(0));
}

/// The joined command line splits back into the same arguments with the OS parser.
#[test]
fn command_line_round_trips_through_the_os_parser() {
    let _session = util::lock_session();
    let args = ["prog.exe", "a b", "c\"d", "", r"trailing\", "x\\\"y", "tab\there"];
    let mut line = Command::argv(args).to_command_line(None).unwrap();
    line.push(0);

    let parsed = unsafe {
        let mut count = 0i32;
        let argv = CommandLineToArgvW(line.as_ptr(), &mut count);
        assert!(!argv.is_null());
        let parsed: Vec<String> = (0..count as usize)
            .map(|i| {
                let arg = *argv.add(i);
                let len = (0..).take_while(|&j| *arg.add(j) != 0).count();
                String::from_utf16(std::slice::from_raw_parts(arg, len)).unwrap()
            })
            .collect();
        LocalFree(argv.cast());
        parsed
    };
    assert_eq!(parsed, args);
}

fn launcher_calls(launcher: &SecureProcessLauncher<FailingCreate>) -> usize {
    launcher.creator().calls.load(Ordering::SeqCst)
}
