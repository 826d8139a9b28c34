//! Subprocess execution with stdout and stderr captured as one stream.
//!
//! Both streams are pointed at the same OS pipe, so the captured text keeps
//! the order in which the child wrote it.

use serde::Serialize;
use std::io::{self, Read};
use std::process::{Command, Stdio};

/// Combined stdout/stderr of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub output: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            success: exit_code == 0,
            exit_code,
        }
    }
}

/// Build the platform shell invocation for a single command string.
pub fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    let cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd
}

/// Run `cmd` to completion, capturing stdout and stderr interleaved.
///
/// Returns `Err` only when the process could not be started or waited on;
/// a non-zero exit is reported through [`CommandOutput::success`].
pub fn run_combined(mut cmd: Command) -> io::Result<CommandOutput> {
    let (mut reader, writer) = io::pipe()?;

    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);

    let mut child = cmd.spawn()?;
    // The Command still owns the write ends; drop it so EOF arrives when the child exits.
    drop(cmd);

    let mut raw = Vec::new();
    let read_result = reader.read_to_end(&mut raw);
    let status = child.wait()?;
    read_result?;

    Ok(CommandOutput {
        output: String::from_utf8_lossy(&raw).to_string(),
        success: status.success(),
        exit_code: status.code().unwrap_or(-1),
    })
}
