//! External tool invocation.
//!
//! Tools are run directly (no shell) with the caller's environment. Output is
//! captured so a failing rule can report it; a successful tool's output is
//! returned to the caller.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::execute::types::ExecuteError;

/// Captured streams of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
  pub stdout: String,
  pub stderr: String,
}

/// Run `program args...` in `cwd` and wait for it.
///
/// The child is killed if the returned future is dropped, so aborting the
/// task that awaits this also stops the tool.
///
/// # Errors
///
/// - `Spawn` if the program could not be started (e.g. not found).
/// - `CmdFailed` if it exited non-zero or was killed by a signal.
pub async fn run_tool(program: &str, args: &[String], cwd: &Path) -> Result<ToolOutput, ExecuteError> {
  let mut command = Command::new(program);
  command
    .args(args)
    .current_dir(cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  // Own process group, so helpers the tool starts (cc1, as, ld) can be
  // stopped along with it.
  #[cfg(unix)]
  command.process_group(0);

  debug!(program = %program, args = ?args, cwd = %cwd.display(), "spawning process");

  let child = command.spawn().map_err(|source| ExecuteError::Spawn {
    program: program.to_string(),
    source,
  })?;
  let group = GroupGuard { pgid: child.id() };

  let output = child.wait_with_output().await?;
  group.disarm();

  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if !output.status.success() {
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecuteError::CmdFailed {
      cmd: crate::flags::render_command(program, args),
      code: output.status.code(),
      stdout,
      stderr,
    });
  }

  Ok(ToolOutput { stdout, stderr })
}

/// Kills the tool's whole process group if dropped while the tool runs.
///
/// `kill_on_drop` only reaches the direct child.
struct GroupGuard {
  pgid: Option<u32>,
}

impl GroupGuard {
  fn disarm(mut self) {
    self.pgid = None;
  }
}

impl Drop for GroupGuard {
  fn drop(&mut self) {
    let Some(pgid) = self.pgid.take() else {
      return;
    };
    #[cfg(unix)]
    {
      use nix::sys::signal::{Signal, killpg};
      use nix::unistd::Pid;

      match i32::try_from(pgid) {
        Ok(raw) => {
          if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            debug!(pgid, error = %e, "process group already gone");
          }
        }
        Err(_) => debug!(pgid, "process group id out of range"),
      }
    }
    #[cfg(not(unix))]
    let _ = pgid;
  }
}
