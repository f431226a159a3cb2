use nix::sys::signal::{kill, killpg, Signal};

use crate::jobs::JobState;
use crate::launch::wait_job;
use crate::Shell;

/// `fg`: resume the most recent job and block until it exits or stops again.
pub fn fg(shell: &Shell) {
    let id = {
        let mut table = shell.jobs();
        let Some(id) = table.most_recent() else {
            println!("jsh: no active jobs");
            return;
        };
        table.set_job_state(id, JobState::Running);
        if let Some(row) = table.status_line(id) {
            println!("{row}");
        }
        id
    };
    let (pgid, pipeline) = {
        let table = shell.jobs();
        (table.pgid_of(id), table.is_pipeline(id))
    };
    let Some(pgid) = pgid else {
        return;
    };
    // gate first: a resumed job that exits instantly must not be stolen by
    // the router before the wait below picks it up
    shell.set_fg(pgid);
    let sent = if pipeline {
        killpg(pgid, Signal::SIGCONT)
    } else {
        kill(pgid, Signal::SIGCONT)
    };
    if let Err(e) = sent {
        shell.clear_fg();
        eprintln!("jsh: continue: {e}");
        return;
    }
    wait_job(shell, id);
    shell.clear_fg();
}

/// `bg`: resume the most recent stopped non-pipeline job without waiting.
pub fn bg(shell: &Shell) {
    let pid = {
        let mut table = shell.jobs();
        if table.is_empty() {
            println!("jsh: no active jobs");
            return;
        }
        let Some(id) = table.most_recent_stopped_simple() else {
            // distinct from the empty-table outcome: jobs exist, none eligible
            println!("jsh: no jobs available to put in background");
            return;
        };
        table.set_job_state(id, JobState::Running);
        if let Some(row) = table.status_line(id) {
            println!("{row}");
        }
        table.pgid_of(id)
    };
    if let Some(pid) = pid {
        if let Err(e) = kill(pid, Signal::SIGCONT) {
            eprintln!("jsh: continue: {e}");
        }
    }
}

/// `jobs`: render the table in insertion order.
pub fn jobs(shell: &Shell) {
    let rows = shell.jobs().render();
    if rows.is_empty() {
        println!("No active jobs");
        return;
    }
    for row in rows {
        println!("{row}");
    }
}
