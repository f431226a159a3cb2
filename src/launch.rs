use std::collections::HashSet;
use std::ffi::CString;
use std::os::fd::IntoRawFd;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::signal::{self, kill, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, pipe, setpgid, ForkResult, Pid};

use crate::error::ShellError;
use crate::jobs::{JobId, JobState};
use crate::parse::{RedirSpec, Stage};
use crate::Shell;

/// Everything a forked child needs, prepared before the fork so the child
/// never allocates: exec argv, redirection paths and pre-formatted failure
/// messages are all built in the parent.
struct ChildPlan {
    argv: Vec<CString>,
    stdin_path: Option<CString>,
    stdout_path: Option<CString>,
    devnull: Option<CString>,
    exec_err: Vec<u8>,
    redir_in_err: Vec<u8>,
    redir_out_err: Vec<u8>,
}

impl ChildPlan {
    fn new(argv: &[String], redir: &RedirSpec, devnull_stdout: bool) -> Result<Self, ShellError> {
        let cstr = |s: &str| CString::new(s).map_err(|_| ShellError::Sys(Errno::EINVAL));
        let cmd = argv.first().map(String::as_str).unwrap_or("");
        let argv = argv.iter().map(|a| cstr(a)).collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            return Err(ShellError::MissingCommand);
        }
        let stdin_path = redir.input.as_deref().map(cstr).transpose()?;
        let stdout_path = redir.output.as_deref().map(cstr).transpose()?;
        let devnull = if devnull_stdout && stdout_path.is_none() {
            Some(cstr("/dev/null")?)
        } else {
            None
        };
        let redir_err = |path: Option<&str>| {
            path.map_or_else(Vec::new, |p| {
                format!("jsh: cannot open file {p}\n").into_bytes()
            })
        };
        Ok(ChildPlan {
            argv,
            stdin_path,
            stdout_path,
            devnull,
            exec_err: format!("jsh: {cmd}: command could not be executed\n").into_bytes(),
            redir_in_err: redir_err(redir.input.as_deref()),
            redir_out_err: redir_err(redir.output.as_deref()),
        })
    }

    /// Child side, after fork. Only async-signal-safe calls from here on:
    /// open/dup2/close/execvp, raw write on failure, then _exit. Never
    /// returns to shell logic.
    fn exec(self) -> ! {
        unsafe {
            let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
            let _ = signal::signal(Signal::SIGTSTP, SigHandler::SigDfl);
            let _ = signal::signal(Signal::SIGCHLD, SigHandler::SigDfl);
        }
        if let Some(path) = &self.stdin_path {
            match open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty()) {
                Ok(fd) => {
                    let _ = dup2(fd, libc::STDIN_FILENO);
                    let _ = close(fd);
                }
                Err(_) => self.fail(&self.redir_in_err, 126),
            }
        }
        // explicit > beats both a pipe and the background /dev/null sink:
        // this dup2 runs after the caller's pipe wiring
        let out = self.stdout_path.as_ref().or(self.devnull.as_ref());
        if let Some(path) = out {
            let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
            match open(path.as_c_str(), flags, Mode::from_bits_truncate(0o644)) {
                Ok(fd) => {
                    let _ = dup2(fd, libc::STDOUT_FILENO);
                    let _ = close(fd);
                }
                Err(_) => self.fail(&self.redir_out_err, 126),
            }
        }
        let argv_refs: Vec<&CString> = self.argv.iter().collect();
        let _ = execvp(&self.argv[0], &argv_refs);
        self.fail(&self.exec_err, 127)
    }

    fn fail(&self, msg: &[u8], code: i32) -> ! {
        unsafe {
            libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
            libc::_exit(code);
        }
    }
}

/// Launches a simple command and blocks until it exits or stops. The child
/// runs in a fresh process group so interactive signals can be steered at it
/// without hitting the shell.
pub fn run_foreground(
    shell: &Shell,
    argv: &[String],
    redir: &RedirSpec,
    line: &str,
) -> Result<(), ShellError> {
    let plan = ChildPlan::new(argv, redir, false)?;
    let id = shell.jobs().create(line, false)?;
    match unsafe { fork() } {
        Err(e) => {
            shell.jobs().discard(id);
            Err(e.into())
        }
        Ok(ForkResult::Child) => {
            let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
            plan.exec()
        }
        Ok(ForkResult::Parent { child }) => {
            // whichever of parent/child runs first, the group exists before
            // anyone signals it
            let _ = setpgid(child, child);
            // gate before the table update: the moment assign_pids lands the
            // child is visible to the router, which must already see it as
            // foreground or a fast exit can be reaped out from under the wait
            shell.set_fg(child);
            shell.jobs().assign_pids(id, child, &[child]);
            if shell.debug {
                eprintln!("jsh[debug]: fg job [{id}] pid {child}");
            }
            wait_job(shell, id);
            shell.clear_fg();
            Ok(())
        }
    }
}

/// Launches a command without waiting. Untethered stdout goes to /dev/null
/// so background chatter cannot corrupt the prompt.
pub fn run_background(
    shell: &Shell,
    argv: &[String],
    redir: &RedirSpec,
    line: &str,
) -> Result<(), ShellError> {
    let plan = ChildPlan::new(argv, redir, true)?;
    let id = shell.jobs().create(line, false)?;
    match unsafe { fork() } {
        Err(e) => {
            shell.jobs().discard(id);
            Err(e.into())
        }
        Ok(ForkResult::Child) => {
            let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
            plan.exec()
        }
        Ok(ForkResult::Parent { child }) => {
            let _ = setpgid(child, child);
            shell.jobs().assign_pids(id, child, &[child]);
            if shell.debug {
                eprintln!("jsh[debug]: bg job [{id}] pid {child}");
            }
            Ok(())
        }
    }
}

/// Two-stage pipeline: one pipe, two forks, one job. The left child anchors
/// a fresh process group and both members join it, so fg/bg/interrupt can
/// address the pair as a unit; the job survives until both are reaped.
pub fn run_pipeline(
    shell: &Shell,
    left: &Stage,
    right: &Stage,
    line: &str,
) -> Result<(), ShellError> {
    let left_plan = ChildPlan::new(&left.argv, &left.redir, false)?;
    let right_plan = ChildPlan::new(&right.argv, &right.redir, false)?;
    let id = shell.jobs().create(line, true)?;

    let (read_fd, write_fd) = match pipe() {
        Ok((r, w)) => (r.into_raw_fd(), w.into_raw_fd()),
        Err(e) => {
            shell.jobs().discard(id);
            return Err(e.into());
        }
    };

    let left_pid = match unsafe { fork() } {
        Err(e) => {
            close_pipe(read_fd, write_fd);
            shell.jobs().discard(id);
            return Err(e.into());
        }
        Ok(ForkResult::Child) => {
            let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
            let _ = close(read_fd);
            let _ = dup2(write_fd, libc::STDOUT_FILENO);
            let _ = close(write_fd);
            left_plan.exec()
        }
        Ok(ForkResult::Parent { child }) => child,
    };
    let _ = setpgid(left_pid, left_pid);

    let right_pid = match unsafe { fork() } {
        Err(e) => {
            close_pipe(read_fd, write_fd);
            // half-built pipeline: take the anchor down with it
            let _ = kill(left_pid, Signal::SIGKILL);
            let _ = waitpid(left_pid, None);
            shell.jobs().discard(id);
            return Err(e.into());
        }
        Ok(ForkResult::Child) => {
            join_group(left_pid);
            let _ = close(write_fd);
            let _ = dup2(read_fd, libc::STDIN_FILENO);
            let _ = close(read_fd);
            right_plan.exec()
        }
        Ok(ForkResult::Parent { child }) => child,
    };
    // close the join race from this side too; harmless if the child won
    let _ = setpgid(right_pid, left_pid);
    close_pipe(read_fd, write_fd);

    // gate first, as in run_foreground: members visible in the table before
    // the gate is up would be fair game for the router
    shell.set_fg(left_pid);
    shell.jobs().assign_pids(id, left_pid, &[left_pid, right_pid]);
    if shell.debug {
        eprintln!("jsh[debug]: pipeline job [{id}] pgid {left_pid} pids {left_pid},{right_pid}");
    }
    wait_job(shell, id);
    shell.clear_fg();
    Ok(())
}

fn close_pipe(read_fd: RawFd, write_fd: RawFd) {
    let _ = close(read_fd);
    let _ = close(write_fd);
}

/// Right-child side of the pipeline join. The anchor group may not exist
/// yet, so retry briefly instead of assuming fork ordering.
fn join_group(leader: Pid) {
    for _ in 0..50 {
        if setpgid(Pid::from_raw(0), leader).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// The one blocking operation in the shell: waits on the foreground job
/// (single pid, or the whole group for pipelines) until it is gone or
/// wholly stopped. Never holds the table lock across the waitpid call.
pub fn wait_job(shell: &Shell, id: JobId) {
    let (pgid, pipeline) = {
        let table = shell.jobs();
        match table.pgid_of(id) {
            Some(p) => (p, table.is_pipeline(id)),
            None => return,
        }
    };
    let target = if pipeline {
        Pid::from_raw(-pgid.as_raw())
    } else {
        pgid
    };
    let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let mut stopped: HashSet<Pid> = HashSet::new();
    loop {
        match waitpid(target, Some(flags)) {
            Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                stopped.remove(&pid);
                let mut table = shell.jobs();
                table.reap_member(pid);
                if table.drain_if_done(id) {
                    return;
                }
                // remaining twin may already be stopped; nothing further
                // will be reported for it, so settle the job as Stopped
                let live = table.members_of(id);
                if !live.is_empty() && live.iter().all(|m| stopped.contains(m)) {
                    table.set_job_state(id, JobState::Stopped);
                    return;
                }
            }
            Ok(WaitStatus::Stopped(pid, _)) => {
                stopped.insert(pid);
                let mut table = shell.jobs();
                let live = table.members_of(id);
                if live.iter().all(|m| stopped.contains(m)) {
                    table.set_job_state(id, JobState::Stopped);
                    return;
                }
            }
            // stray resume racing in ahead of the real status; the member
            // is running again, so it no longer counts toward a group-wide
            // stop
            Ok(WaitStatus::Continued(pid)) => {
                stopped.remove(&pid);
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => {
                // the router may have reaped a job that finished in the
                // set-foreground window; only report if it is still ours
                if shell.jobs().contains(id) {
                    eprintln!("jsh: waitpid: no such child");
                }
                return;
            }
            Err(e) => {
                eprintln!("jsh: waitpid: {e}");
                return;
            }
        }
    }
}
