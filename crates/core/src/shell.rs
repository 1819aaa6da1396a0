//! Shell command construction shared by steps, hooks and cache rebuilds

use std::process::{Command, Output, Stdio};
use tracing::info;

/// Build a command that runs `script` through the platform shell
pub fn shell_command(script: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", script]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }
}

/// Run a prepared command to completion, logging its output under `tag`
pub fn run_logged(mut command: Command, tag: &str) -> std::io::Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = command.output()?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("[{}] stdout: {}", tag, line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        info!("[{}] stderr: {}", tag, line);
    }

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_logged_captures_output() {
        let output = run_logged(shell_command("echo hello; echo oops >&2"), "test").unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }

    #[test]
    fn test_run_logged_reports_exit_code() {
        let output = run_logged(shell_command("exit 4"), "test").unwrap();
        assert_eq!(output.status.code(), Some(4));
    }
}
