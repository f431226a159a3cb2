
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use test_util::{jobs_row_for, pid_from_jobs_row, ShellSession};

#[test]
fn sigint_at_an_empty_prompt_does_not_kill_the_shell() {
    let mut sh = ShellSession::spawn();
    sh.settle(150);
    kill(Pid::from_raw(sh.pid()), Signal::SIGINT).expect("SIGINT");
    sh.settle(150);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(out.contains("No active jobs"), "shell should have survived: {out}");
    assert!(err.is_empty(), "unexpected stderr: {err}");
}

#[test]
fn sigint_is_forwarded_to_the_foreground_job_only() {
    let mut sh = ShellSession::spawn();
    sh.send_line("/bin/sleep 5");
    sh.settle(250);
    kill(Pid::from_raw(sh.pid()), Signal::SIGINT).expect("SIGINT");
    // the forwarded interrupt kills the sleep; the prompt comes back long
    // before the 5 seconds are up and the shell keeps answering
    sh.settle(300);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, _err) = sh.close();
    assert!(out.contains("No active jobs"), "got: {out}");
}

#[test]
fn sigtstp_stops_the_foreground_job_and_returns_the_prompt() {
    let mut sh = ShellSession::spawn();
    sh.send_line("/bin/sleep 5");
    sh.settle(250);
    kill(Pid::from_raw(sh.pid()), Signal::SIGTSTP).expect("SIGTSTP");
    sh.settle(300);
    sh.send_line("jobs");
    sh.settle(200);
    let out = sh.stdout_text();
    let row = jobs_row_for(&out, "/bin/sleep 5").expect("no jobs row");
    assert!(row.contains("[1] + Stopped"), "got: {row}");
    // don't leave a stopped sleep behind
    if let Some(pid) = pid_from_jobs_row(row) {
        kill(Pid::from_raw(pid), Signal::SIGKILL).ok();
    }
    drop(sh);
}
