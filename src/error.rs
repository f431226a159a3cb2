use thiserror::Error;

use crate::jobs::JobError;

/// Everything a dispatched line can fail with. User syntax errors and
/// resource errors are both non-fatal; the caller prints them with a `jsh:`
/// prefix and returns to the prompt.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("only one '|' allowed per line")]
    TooManyPipes,
    #[error("cannot background and pipeline commands ('&' and '|' must be used separately)")]
    PipeBackgroundConflict,
    #[error("'&' must be the last token on the line")]
    BackgroundNotLast,
    #[error("missing file name after '{0}'")]
    MissingRedirectTarget(char),
    #[error("missing command")]
    MissingCommand,
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("{0}")]
    Sys(#[from] nix::errno::Errno),
}
