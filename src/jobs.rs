use std::fmt;

use nix::unistd::Pid;
use thiserror::Error;

pub const MAX_JOBS: usize = 50;

/// Display sequence number of a job. Assigned at creation (last live job's
/// number + 1, or 1 for an empty table) and never reused while the job lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Stopped,
    Running,
    /// Transient: every member reaped, waiting to be drained for its notice.
    Done,
}

impl JobState {
    fn label(self) -> &'static str {
        match self {
            JobState::Stopped => "Stopped",
            JobState::Running => "Running",
            JobState::Done => "Done",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job table full ({MAX_JOBS} jobs)")]
    CapacityExceeded,
}

#[derive(Debug)]
struct Job {
    id: JobId,
    line: String,
    /// Process-group leader. None between create and the post-fork assign.
    pgid: Option<Pid>,
    state: JobState,
    pipeline: bool,
    /// Still-live member processes: one for simple jobs, two for pipelines.
    /// A job only becomes Done once this is empty.
    members: Vec<Pid>,
}

/// Insertion-ordered store of tracked jobs. Owned records, removal by value;
/// shared between the main thread and the signal router behind one mutex.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    /// Appends a new placeholder job: Stopped, no pid yet.
    pub fn create(&mut self, line: &str, pipeline: bool) -> Result<JobId, JobError> {
        if self.jobs.len() >= MAX_JOBS {
            return Err(JobError::CapacityExceeded);
        }
        let id = JobId(self.jobs.last().map_or(1, |j| j.id.0 + 1));
        self.jobs.push(Job {
            id,
            line: line.to_string(),
            pgid: None,
            state: JobState::Stopped,
            pipeline,
            members: Vec::new(),
        });
        Ok(id)
    }

    /// Records the group leader and members after fork and flips the job to
    /// Running. A second call for the same job is ignored.
    pub fn assign_pids(&mut self, id: JobId, pgid: Pid, members: &[Pid]) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) {
            if job.pgid.is_some() {
                return;
            }
            job.pgid = Some(pgid);
            job.members = members.to_vec();
            job.state = JobState::Running;
        }
    }

    /// Drops a job that never received a pid (fork failed at launch).
    pub fn discard(&mut self, id: JobId) {
        self.jobs.retain(|j| j.id != id);
    }

    /// State update keyed by member pid; no-op for unknown pids (the child
    /// may already have been reaped and removed).
    pub fn set_state(&mut self, pid: Pid, state: JobState) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.members.contains(&pid)) {
            job.state = state;
        }
    }

    pub fn set_job_state(&mut self, id: JobId, state: JobState) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) {
            job.state = state;
        }
    }

    /// Removes the whole job owning `pid`. Idempotent: a second call for the
    /// same pid finds nothing and returns false.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.jobs.iter().position(|j| j.members.contains(&pid)) {
            Some(i) => {
                self.jobs.remove(i);
                true
            }
            None => false,
        }
    }

    /// Drains one reaped member from its job. The job turns Done only when
    /// its last member is gone, so a pipeline outlives its first exit.
    pub fn reap_member(&mut self, pid: Pid) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.members.contains(&pid)) {
            job.members.retain(|m| *m != pid);
            if job.members.is_empty() {
                job.state = JobState::Done;
            }
        }
    }

    /// Removes every Done job, returning (sequence number, command text) for
    /// notice printing, in table order.
    pub fn drain_done(&mut self) -> Vec<(JobId, String)> {
        let mut done = Vec::new();
        self.jobs.retain_mut(|j| {
            if j.state == JobState::Done {
                done.push((j.id, std::mem::take(&mut j.line)));
                false
            } else {
                true
            }
        });
        done
    }

    /// Targeted drain used by the blocking wait path, which reports through
    /// its own return rather than a notice.
    pub fn drain_if_done(&mut self, id: JobId) -> bool {
        match self.jobs.iter().position(|j| j.id == id && j.state == JobState::Done) {
            Some(i) => {
                self.jobs.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn most_recent(&self) -> Option<JobId> {
        self.jobs.last().map(|j| j.id)
    }

    /// Newest-to-oldest scan for the `bg` target: first Stopped job that is
    /// not a pipeline.
    pub fn most_recent_stopped_simple(&self) -> Option<JobId> {
        self.jobs
            .iter()
            .rev()
            .find(|j| !j.pipeline && j.state == JobState::Stopped)
            .map(|j| j.id)
    }

    /// One row per job in insertion order; the last row carries the `+`
    /// current marker, every other row `-`.
    pub fn render(&self) -> Vec<String> {
        let last = self.jobs.len().saturating_sub(1);
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, j)| {
                let mark = if i == last { '+' } else { '-' };
                let pid = j.pgid.map_or(0, Pid::as_raw);
                format!("[{}] {} {}  {}  {}", j.id, mark, j.state.label(), pid, j.line)
            })
            .collect()
    }

    /// The `[n] + Running    <command>` form printed by `fg` and `bg`.
    pub fn status_line(&self, id: JobId) -> Option<String> {
        let last = self.jobs.last()?.id;
        let job = self.jobs.iter().find(|j| j.id == id)?;
        let mark = if job.id == last { '+' } else { '-' };
        Some(format!("[{}] {} {}    {}", job.id, mark, job.state.label(), job.line))
    }

    pub fn pgid_of(&self, id: JobId) -> Option<Pid> {
        self.jobs.iter().find(|j| j.id == id).and_then(|j| j.pgid)
    }

    pub fn members_of(&self, id: JobId) -> Vec<Pid> {
        self.jobs
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.members.clone())
            .unwrap_or_default()
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.jobs.iter().find(|j| j.id == id).map(|j| j.state)
    }

    pub fn is_pipeline(&self, id: JobId) -> bool {
        self.jobs.iter().any(|j| j.id == id && j.pipeline)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.iter().any(|j| j.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Group leaders of every live job, for shutdown.
    pub fn pgids(&self) -> Vec<Pid> {
        self.jobs.iter().filter_map(|j| j.pgid).collect()
    }

    /// Member pids of every job outside the foreground group. The router
    /// polls exactly these, so it can never steal the foreground wait's
    /// status.
    pub fn background_members(&self, fg_pgid: i32) -> Vec<Pid> {
        self.jobs
            .iter()
            .filter(|j| j.pgid.map_or(true, |p| p.as_raw() != fg_pgid))
            .flat_map(|j| j.members.iter().copied())
            .collect()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}
