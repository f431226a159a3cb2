use std::io::Write;
use std::thread;

use anyhow::Result;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTSTP};
use signal_hook::iterator::Signals;

use crate::jobs::{JobId, JobState};
use crate::Shell;

/// Starts the signal router thread. signal-hook's own handler does nothing
/// but a self-pipe write; everything below runs on this thread, outside
/// async-signal context, serialized with the main thread through the job
/// table mutex.
pub fn install(shell: &Shell) -> Result<()> {
    let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTSTP])?;
    let shell = shell.clone();
    thread::Builder::new()
        .name("sig-router".into())
        .spawn(move || {
            for sig in signals.forever() {
                match sig {
                    SIGCHLD => reap_children(&shell),
                    SIGINT => forward(&shell, Signal::SIGINT),
                    SIGTSTP => forward(&shell, Signal::SIGTSTP),
                    _ => {}
                }
            }
        })?;
    Ok(())
}

/// Interactive interrupt/stop goes to the whole foreground group, so both
/// halves of a pipeline receive it. With nothing in the foreground the shell
/// itself ignores the key.
fn forward(shell: &Shell, sig: Signal) {
    let pgid = shell.fg_pgid();
    if pgid == 0 {
        return;
    }
    let _ = killpg(Pid::from_raw(pgid), sig);
}

/// Drains every pending child-state change without blocking. Only members
/// outside the foreground group are polled, so the blocked foreground wait
/// can never have its status stolen. Several notifications may be queued
/// behind one SIGCHLD; polling each live member catches them all.
pub fn reap_children(shell: &Shell) {
    let fg = shell.fg_pgid();
    let candidates = shell.jobs().background_members(fg);
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    for pid in candidates {
        match waitpid(pid, Some(flags)) {
            Ok(WaitStatus::Exited(p, _)) | Ok(WaitStatus::Signaled(p, _, _)) => {
                if shell.debug {
                    eprintln!("jsh[debug]: reaped pid {p}");
                }
                let done = {
                    let mut table = shell.jobs();
                    table.reap_member(p);
                    table.drain_done()
                };
                notify_done(shell, &done);
            }
            Ok(WaitStatus::Stopped(p, _)) => shell.jobs().set_state(p, JobState::Stopped),
            Ok(WaitStatus::Continued(p)) => shell.jobs().set_state(p, JobState::Running),
            Ok(_) | Err(_) => {}
        }
    }
}

/// Prints the asynchronous done notices and reprints the prompt the user
/// was mid-way through.
fn notify_done(shell: &Shell, done: &[(JobId, String)]) {
    if done.is_empty() {
        return;
    }
    let mut out = std::io::stdout().lock();
    for (id, line) in done {
        if shell.interactive {
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "[{id}] Done    {line}");
    }
    if shell.interactive {
        let _ = write!(out, "# ");
    }
    let _ = out.flush();
}
