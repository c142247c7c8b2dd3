//! Declarative builder for external tool invocations.

use crate::cancellation::CancellationToken;
use crate::errors::{OtuflowError, Result};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// How an external command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandExit {
    /// The process exited with a status code.
    Code(i32),
    /// The process was terminated by a signal.
    Signal,
    /// The wait was cancelled and the process killed.
    Cancelled,
}

impl CommandExit {
    /// Returns true for exit code zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl fmt::Display for CommandExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal => write!(f, "terminated by signal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An argv-style external command.
///
/// The assembled argv is `[launcher] [program_dir/]program [flag value]... [bare flag]...`,
/// all in insertion order. Re-adding a flag replaces its value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    program_dir: Option<PathBuf>,
    launcher: Option<String>,
    arguments: Vec<(String, String)>,
    flags: Vec<String>,
    working_dir: Option<PathBuf>,
    stdout: Option<PathBuf>,
    stderr: Option<PathBuf>,
}

impl ExternalCommand {
    /// Creates a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Replaces the executable token.
    pub fn set_program(&mut self, program: impl Into<String>) {
        self.program = program.into();
    }

    /// Sets the directory the executable is resolved in.
    pub fn set_program_dir(&mut self, dir: impl Into<PathBuf>) {
        self.program_dir = Some(dir.into());
    }

    /// Sets an interpreter placed before the executable, e.g. `python`.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    /// Adds or replaces a flag/value pair.
    pub fn arg(&mut self, flag: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let flag = flag.into();
        let value = value.into();
        if let Some(slot) = self.arguments.iter_mut().find(|(f, _)| *f == flag) {
            slot.1 = value;
        } else {
            self.arguments.push((flag, value));
        }
        self
    }

    /// Adds a flag/value pair where the value is a path.
    pub fn path_arg(&mut self, flag: impl Into<String>, path: &Path) -> &mut Self {
        self.arg(flag, path.to_string_lossy())
    }

    /// Appends a bare flag. Repeats are kept.
    pub fn flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.flags.push(flag.into());
        self
    }

    /// Runs the process in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Redirects standard output to a file, truncating it.
    #[must_use]
    pub fn with_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Redirects standard error to a file, truncating it.
    #[must_use]
    pub fn with_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// The executable token as configured.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The stderr redirection target, if any.
    #[must_use]
    pub fn stderr_path(&self) -> Option<&Path> {
        self.stderr.as_deref()
    }

    /// The full argument vector.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(2 + self.arguments.len() * 2 + self.flags.len());
        if let Some(launcher) = &self.launcher {
            argv.push(launcher.clone());
        }
        argv.push(self.executable());
        for (flag, value) in &self.arguments {
            argv.push(flag.clone());
            argv.push(value.clone());
        }
        argv.extend(self.flags.iter().cloned());
        argv
    }

    fn executable(&self) -> String {
        match &self.program_dir {
            Some(dir) => dir.join(&self.program).to_string_lossy().into_owned(),
            None => self.program.clone(),
        }
    }

    /// Spawns the process and waits for it, killing it if `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns an error if a redirection file cannot be created or the process
    /// cannot be spawned.
    pub async fn execute(self, cancel: &CancellationToken) -> Result<CommandExit> {
        let argv = self.argv();
        let (head, rest) = argv
            .split_first()
            .ok_or_else(|| OtuflowError::Worker("empty command line".to_string()))?;

        let mut command = Command::new(head);
        command
            .args(rest)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.stdout(redirect(self.stdout.as_deref())?);
        command.stderr(redirect(self.stderr.as_deref())?);

        debug!(command = %argv.join(" "), "Spawning external command");
        let mut child = command.spawn().map_err(|source| OtuflowError::Spawn {
            program: head.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                Ok(status.code().map_or(CommandExit::Signal, CommandExit::Code))
            }
            () = cancel.cancelled() => {
                warn!(program = %head, "Killing external command after cancellation");
                if let Err(e) = child.start_kill() {
                    debug!("Kill failed, process already gone: {e}");
                }
                let _ = child.wait().await;
                Ok(CommandExit::Cancelled)
            }
        }
    }
}

fn redirect(path: Option<&Path>) -> Result<Stdio> {
    match path {
        Some(path) => Ok(Stdio::from(File::create(path)?)),
        None => Ok(Stdio::null()),
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_argv_order() {
        let mut cmd = ExternalCommand::new("usearch");
        cmd.arg("-cluster_otus", "in.fasta").arg("-otus", "otus.fasta").flag("-quiet");
        assert_eq!(
            cmd.argv(),
            vec!["usearch", "-cluster_otus", "in.fasta", "-otus", "otus.fasta", "-quiet"]
        );
    }

    #[test]
    fn test_readding_flag_replaces_in_place() {
        let mut cmd = ExternalCommand::new("tool");
        cmd.arg("-a", "1").arg("-b", "2").arg("-a", "3");
        assert_eq!(cmd.argv(), vec!["tool", "-a", "3", "-b", "2"]);
    }

    #[test]
    fn test_launcher_and_program_dir() {
        let mut cmd = ExternalCommand::new("uc2otutab.py").with_launcher("python");
        cmd.set_program_dir("/opt/scripts");
        cmd.flag("map.uc");
        assert_eq!(cmd.argv(), vec!["python", "/opt/scripts/uc2otutab.py", "map.uc"]);
    }

    #[test]
    fn test_repeated_bare_flag_kept() {
        let mut cmd = ExternalCommand::new("tool");
        cmd.flag("-v").arg("-a", "1").flag("-v");
        assert_eq!(cmd.argv(), vec!["tool", "-a", "1", "-v", "-v"]);
        assert_eq!(cmd.to_string(), "tool -a 1 -v -v");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let cmd = ExternalCommand::new("definitely-not-a-real-binary-otuflow");
        let err = cmd.execute(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OtuflowError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_redirects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut cmd = ExternalCommand::new("sh").with_stdout(&out);
        cmd.arg("-c", "echo hello");

        let exit = cmd.execute(&CancellationToken::new()).await.unwrap();
        assert!(exit.success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_in_working_dir() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let out = logs.path().join("pwd.txt");
        let mut cmd = ExternalCommand::new("sh")
            .with_working_dir(work.path())
            .with_stdout(&out);
        cmd.arg("-c", "pwd -P");

        let exit = cmd.execute(&CancellationToken::new()).await.unwrap();
        assert!(exit.success());
        let printed = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            PathBuf::from(printed.trim_end()),
            work.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let mut cmd = ExternalCommand::new("sh");
        cmd.arg("-c", "exit 3");
        let exit = cmd.execute(&CancellationToken::new()).await.unwrap();
        assert_eq!(exit, CommandExit::Code(3));
        assert!(!exit.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_child() {
        let token = Arc::new(CancellationToken::new());
        let mut cmd = ExternalCommand::new("sh");
        cmd.arg("-c", "sleep 30");

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel("test");
            })
        };

        let exit = tokio::time::timeout(Duration::from_secs(5), cmd.execute(&token))
            .await
            .expect("cancel should stop the wait")
            .unwrap();
        canceller.await.unwrap();
        assert_eq!(exit, CommandExit::Cancelled);
    }
}
