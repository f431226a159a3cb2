use test_util::ShellSession;

#[test]
fn pipeline_connects_two_stages_and_cleans_up() {
    let mut sh = ShellSession::spawn();
    sh.send_line("echo hi | wc -l");
    sh.settle(400);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(out.contains('1'), "wc -l should have seen one line: {out}");
    assert!(out.contains("No active jobs"), "job should be gone: {out}");
    assert!(err.is_empty(), "unexpected stderr: {err}");
}

#[test]
fn background_and_pipe_together_are_rejected() {
    let mut sh = ShellSession::spawn();
    sh.send_line("echo hi | /bin/sleep 0.6 &");
    sh.settle(100);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(
        err.contains("'&' and '|' must be used separately"),
        "got: {err}"
    );
    assert!(out.contains("No active jobs"), "no job must exist: {out}");
}

#[test]
fn two_pipes_are_rejected_and_create_no_job() {
    let mut sh = ShellSession::spawn();
    sh.send_line("a | b | c");
    sh.settle(100);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(err.contains("only one '|' allowed per line"), "got: {err}");
    assert!(out.contains("No active jobs"), "no job must exist: {out}");
}

#[test]
fn trailing_redirect_without_filename_is_rejected() {
    let mut sh = ShellSession::spawn();
    sh.send_line("echo hi >");
    sh.settle(100);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(err.contains("missing file name after '>'"), "got: {err}");
    assert!(out.contains("No active jobs"), "no job must exist: {out}");
}

#[test]
fn failing_right_stage_does_not_hang_the_pipeline_wait() {
    let mut sh = ShellSession::spawn();
    sh.send_line("echo hi | not-a-real-filter-xyz");
    sh.settle(400);
    sh.send_line("jobs");
    sh.settle(150);
    let (out, err) = sh.close();
    assert!(
        err.contains("not-a-real-filter-xyz: command could not be executed"),
        "got: {err}"
    );
    assert!(out.contains("No active jobs"), "got: {out}");
}
