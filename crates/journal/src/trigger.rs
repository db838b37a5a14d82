//! Fire-and-forget launch of the repository's sync script.
//!
//! The writer never waits on the child, never reads its output and never
//! looks at its exit status.  A missing script is a skipped step, not an
//! error.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Spawned { pid: Option<u32> },
    ScriptMissing { script: PathBuf },
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("failed to spawn {} via {interpreter}", .script.display())]
    Spawn {
        script: PathBuf,
        interpreter: String,
        #[source]
        source: io::Error,
    },
}

pub trait SyncLauncher: Send + Sync {
    fn launch(&self) -> Result<LaunchOutcome, TriggerError>;
}

/// Runs `<interpreter> <repo>/<script>` from the repository root as a
/// detached child.  Must be called from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    repo: PathBuf,
    script: PathBuf,
    interpreter: String,
}

impl ScriptLauncher {
    pub fn new(
        repo: impl Into<PathBuf>,
        script: impl AsRef<Path>,
        interpreter: impl Into<String>,
    ) -> Self {
        let repo = repo.into();
        let script = repo.join(script);
        Self {
            repo,
            script,
            interpreter: interpreter.into(),
        }
    }
}

impl SyncLauncher for ScriptLauncher {
    fn launch(&self) -> Result<LaunchOutcome, TriggerError> {
        if !self.script.is_file() {
            return Ok(LaunchOutcome::ScriptMissing {
                script: self.script.clone(),
            });
        }

        let mut command = std::process::Command::new(&self.interpreter);
        command
            .arg(&self.script)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group: a Ctrl-C aimed at the daemon must not reach the
        // child.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = tokio::process::Command::from(command)
            .spawn()
            .map_err(|source| TriggerError::Spawn {
                script: self.script.clone(),
                interpreter: self.interpreter.clone(),
                source,
            })?;
        let pid = child.id();
        // Dropping the handle does not kill the child; tokio reaps it once
        // it exits.
        drop(child);
        Ok(LaunchOutcome::Spawned { pid })
    }
}
