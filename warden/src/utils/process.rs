//! Child process helpers shared by command probes, the restarter and the
//! sendmail channel.

use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

/// Maximum number of characters kept from a child's output in diagnostics.
pub const OUTPUT_TAIL_CHARS: usize = 512;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured output of a finished child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Short diagnostic for a failed run: exit status plus the stderr tail,
    /// falling back to stdout when stderr is empty.
    pub fn failure_detail(&self) -> String {
        let output = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let tail = tail(output.trim(), OUTPUT_TAIL_CHARS);
        if tail.is_empty() {
            format!("exited with {}", self.status)
        } else {
            format!("exited with {}: {}", self.status, tail)
        }
    }
}

/// Build a `tokio::process::Command` from an argv vector.
///
/// The child is killed when its handle is dropped, so aborting the owning
/// task never leaks a process.
pub fn tokio_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::config("command must not be empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);

    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    Ok(cmd)
}

/// Run an argv vector to completion, optionally feeding `stdin`.
pub async fn run_command(argv: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput> {
    run(tokio_command(argv)?, stdin).await
}

/// Run a prepared command to completion, capturing its output.
pub async fn run(mut cmd: Command, stdin: Option<&[u8]>) -> Result<CommandOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn()?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input).await?;
        pipe.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Substitute `{key}` placeholders in every argument of `template`.
pub fn render_argv(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

/// Last `max_chars` characters of `s`.
pub fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}
