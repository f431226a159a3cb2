mod builtins;
mod error;
mod jobs;
mod launch;
mod parse;
mod signals;

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use crate::jobs::JobTable;
use crate::parse::{Builtin, Parsed};

/// The single owned shell state, shared with the signal router: the job
/// table behind one mutex and the foreground gate (pgid of the job the shell
/// is currently blocked on, 0 when the prompt is live).
#[derive(Clone)]
pub struct Shell {
    jobs: Arc<Mutex<JobTable>>,
    fg_pgid: Arc<AtomicI32>,
    pub interactive: bool,
    pub debug: bool,
}

impl Shell {
    pub fn new(interactive: bool) -> Self {
        Shell {
            jobs: Arc::new(Mutex::new(JobTable::new())),
            fg_pgid: Arc::new(AtomicI32::new(0)),
            interactive,
            debug: env::var_os("JSH_DEBUG").is_some(),
        }
    }

    pub fn jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().expect("job table lock poisoned")
    }

    pub fn fg_pgid(&self) -> i32 {
        self.fg_pgid.load(Ordering::SeqCst)
    }

    pub fn set_fg(&self, pgid: Pid) {
        self.fg_pgid.store(pgid.as_raw(), Ordering::SeqCst);
    }

    pub fn clear_fg(&self) {
        self.fg_pgid.store(0, Ordering::SeqCst);
    }
}

fn usage() {
    println!(
        "usage: jsh [--no-prompt]\n\
         interactive job-control shell: one '|' per line, trailing '&',\n\
         '<'/'>' redirections, built-ins jobs/fg/bg"
    );
}

fn main() -> Result<()> {
    let mut prompt = atty::is(atty::Stream::Stdin);
    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "-h" | "--help" => {
                usage();
                return Ok(());
            }
            "--no-prompt" => {
                prompt = false;
            }
            other => {
                eprintln!("jsh: unknown arg: {other}");
            }
        }
    }

    let shell = Shell::new(prompt);
    signals::install(&shell)?;

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        if shell.interactive {
            print!("# ");
            io::stdout().flush()?;
        }
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // end of input
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        dispatch(&shell, trimmed);
    }
    if shell.interactive {
        println!();
    }
    shutdown(&shell);
    Ok(())
}

fn dispatch(shell: &Shell, line: &str) {
    match parse::parse_line(line) {
        Err(e) => eprintln!("jsh: {e}"),
        Ok(Parsed::Empty) => {}
        Ok(Parsed::Builtin(Builtin::Jobs)) => builtins::jobs(shell),
        Ok(Parsed::Builtin(Builtin::Fg)) => builtins::fg(shell),
        Ok(Parsed::Builtin(Builtin::Bg)) => builtins::bg(shell),
        Ok(Parsed::Simple { argv, redir, background }) => {
            let res = if background {
                launch::run_background(shell, &argv, &redir, line)
            } else {
                launch::run_foreground(shell, &argv, &redir, line)
            };
            if let Err(e) = res {
                eprintln!("jsh: {e}");
            }
        }
        Ok(Parsed::Pipeline { left, right }) => {
            if let Err(e) = launch::run_pipeline(shell, &left, &right, line) {
                eprintln!("jsh: {e}");
            }
        }
    }
}

/// End-of-input teardown: every remaining job's group gets an interrupt,
/// plus a continue so stopped jobs can act on it, then the table is drained.
fn shutdown(shell: &Shell) {
    let pgids = shell.jobs().pgids();
    for pgid in pgids {
        let _ = killpg(pgid, Signal::SIGINT);
        let _ = killpg(pgid, Signal::SIGCONT);
    }
    shell.jobs().clear();
}
