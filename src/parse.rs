use crate::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Jobs,
    Fg,
    Bg,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedirSpec {
    pub input: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub redir: RedirSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Empty,
    Builtin(Builtin),
    Simple {
        argv: Vec<String>,
        redir: RedirSpec,
        background: bool,
    },
    Pipeline {
        left: Stage,
        right: Stage,
    },
}

pub fn pipe_count(tokens: &[&str]) -> usize {
    tokens.iter().filter(|t| **t == "|").count()
}

fn background_requested(tokens: &[&str]) -> bool {
    tokens.iter().any(|t| *t == "&")
}

/// Validates line-level syntax (pipe count, `&` placement) and splits the
/// token stream into stages. Built-ins match on the first token only.
pub fn parse_line(line: &str) -> Result<Parsed, ShellError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Ok(Parsed::Empty);
    };
    match *first {
        "jobs" => return Ok(Parsed::Builtin(Builtin::Jobs)),
        "fg" => return Ok(Parsed::Builtin(Builtin::Fg)),
        "bg" => return Ok(Parsed::Builtin(Builtin::Bg)),
        _ => {}
    }

    let pipes = pipe_count(&tokens);
    let background = background_requested(&tokens);
    if pipes > 0 && background {
        return Err(ShellError::PipeBackgroundConflict);
    }
    if pipes > 1 {
        return Err(ShellError::TooManyPipes);
    }
    if background
        && (tokens.iter().filter(|t| **t == "&").count() > 1 || tokens.last() != Some(&"&"))
    {
        return Err(ShellError::BackgroundNotLast);
    }

    if pipes == 1 {
        let Some(split) = tokens.iter().position(|t| *t == "|") else {
            return Err(ShellError::MissingCommand);
        };
        let left = parse_stage(&tokens[..split])?;
        let right = parse_stage(&tokens[split + 1..])?;
        return Ok(Parsed::Pipeline { left, right });
    }

    let stage = parse_stage(&tokens)?;
    Ok(Parsed::Simple {
        argv: stage.argv,
        redir: stage.redir,
        background,
    })
}

/// One side of a pipe (or the whole line): strips `<`/`>` pairs into the
/// redirection spec and the trailing `&`, leaving the exec argv.
fn parse_stage(tokens: &[&str]) -> Result<Stage, ShellError> {
    let mut redir = RedirSpec::default();
    let mut argv = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "<" => {
                let Some(file) = tokens.get(i + 1) else {
                    return Err(ShellError::MissingRedirectTarget('<'));
                };
                redir.input = Some(file.to_string());
                i += 2;
            }
            ">" => {
                let Some(file) = tokens.get(i + 1) else {
                    return Err(ShellError::MissingRedirectTarget('>'));
                };
                redir.output = Some(file.to_string());
                i += 2;
            }
            // validated at line level; never passed to exec
            "&" => i += 1,
            t => {
                argv.push(t.to_string());
                i += 1;
            }
        }
    }
    if argv.is_empty() {
        return Err(ShellError::MissingCommand);
    }
    Ok(Stage { argv, redir })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parsed: &Parsed) -> Vec<String> {
        match parsed {
            Parsed::Simple { argv, .. } => argv.clone(),
            other => panic!("expected simple command, got {other:?}"),
        }
    }

    #[test]
    fn empty_and_whitespace_lines_parse_to_empty() {
        assert_eq!(parse_line("").unwrap(), Parsed::Empty);
        assert_eq!(parse_line("   \t ").unwrap(), Parsed::Empty);
    }

    #[test]
    fn builtins_match_on_first_token_only() {
        assert_eq!(parse_line("jobs").unwrap(), Parsed::Builtin(Builtin::Jobs));
        assert_eq!(parse_line("fg extra junk").unwrap(), Parsed::Builtin(Builtin::Fg));
        assert_eq!(parse_line("bg").unwrap(), Parsed::Builtin(Builtin::Bg));
        // not case-insensitive, not a suffix match
        assert_eq!(argv(&parse_line("Jobs").unwrap()), vec!["Jobs"]);
        assert_eq!(argv(&parse_line("fgrep hay").unwrap()), vec!["fgrep", "hay"]);
    }

    #[test]
    fn ampersand_marks_background_and_is_stripped() {
        let parsed = parse_line("sleep 5 &").unwrap();
        match parsed {
            Parsed::Simple { argv, background, .. } => {
                assert!(background);
                assert_eq!(argv, vec!["sleep", "5"]);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn ampersand_must_be_last() {
        assert!(matches!(
            parse_line("sleep & 5"),
            Err(ShellError::BackgroundNotLast)
        ));
        assert!(matches!(
            parse_line("sleep 5 & &"),
            Err(ShellError::BackgroundNotLast)
        ));
    }

    #[test]
    fn single_pipe_splits_into_two_stages() {
        let parsed = parse_line("echo hi | wc -l").unwrap();
        match parsed {
            Parsed::Pipeline { left, right } => {
                assert_eq!(left.argv, vec!["echo", "hi"]);
                assert_eq!(right.argv, vec!["wc", "-l"]);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn more_than_one_pipe_is_rejected() {
        assert!(matches!(parse_line("a | b | c"), Err(ShellError::TooManyPipes)));
    }

    #[test]
    fn pipe_and_background_are_exclusive() {
        assert!(matches!(
            parse_line("ls | wc &"),
            Err(ShellError::PipeBackgroundConflict)
        ));
    }

    #[test]
    fn redirections_consume_the_following_token() {
        let parsed = parse_line("sort < in.txt > out.txt").unwrap();
        match parsed {
            Parsed::Simple { argv, redir, .. } => {
                assert_eq!(argv, vec!["sort"]);
                assert_eq!(redir.input.as_deref(), Some("in.txt"));
                assert_eq!(redir.output.as_deref(), Some("out.txt"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn trailing_redirection_without_filename_is_rejected() {
        assert!(matches!(
            parse_line("echo hi >"),
            Err(ShellError::MissingRedirectTarget('>'))
        ));
        assert!(matches!(
            parse_line("wc <"),
            Err(ShellError::MissingRedirectTarget('<'))
        ));
    }

    #[test]
    fn pipe_side_without_command_is_rejected() {
        assert!(matches!(parse_line("| wc"), Err(ShellError::MissingCommand)));
        assert!(matches!(parse_line("ls |"), Err(ShellError::MissingCommand)));
    }

    #[test]
    fn per_stage_redirections_stay_with_their_stage() {
        let parsed = parse_line("cat < in.txt | wc -c > out.txt").unwrap();
        match parsed {
            Parsed::Pipeline { left, right } => {
                assert_eq!(left.redir.input.as_deref(), Some("in.txt"));
                assert_eq!(left.redir.output, None);
                assert_eq!(right.redir.output.as_deref(), Some("out.txt"));
                assert_eq!(right.redir.input, None);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
