use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, ChildStderr, ChildStdout, Command},
};

use crate::error::ExecutionError;

/// Captured result of one successful encoder run.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

impl ProcessOutcome {
    /// The diagnostic stream decoded as text; invalid UTF-8 is replaced.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// How to start the encoder: the program, an optional launcher prefix
/// (`xvfb-run -a`, `/bin/sh -c ...`), the child working directory and an
/// optional wall-clock limit.
#[derive(Clone, Debug)]
pub struct EncoderCommand {
    program: PathBuf,
    launcher: Vec<OsString>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl EncoderCommand {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher: Vec::new(),
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    /// Runs `launcher[0] launcher[1..] program args..` instead of
    /// `program args..`. An empty launcher is ignored.
    pub fn with_launcher<I, S>(mut self, launcher: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.launcher = launcher.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut cmd = match self.launcher.split_first() {
            Some((launcher, prefix)) => {
                let mut cmd = Command::new(launcher);
                cmd.args(prefix).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawned_program(&self) -> PathBuf {
        match self.launcher.first() {
            Some(launcher) => PathBuf::from(launcher),
            None => self.program.clone(),
        }
    }

    /// Runs the encoder once and waits for it to exit, draining stdout and
    /// stderr concurrently so a chatty child cannot block on a full pipe.
    ///
    /// The child is killed when the timeout elapses or when the returned
    /// future is dropped. A timed-out run still reports the stderr printed
    /// so far.
    pub async fn run(&self, args: &[OsString]) -> Result<ProcessOutcome, ExecutionError> {
        let mut child = self
            .command(args)
            .spawn()
            .map_err(|source| ExecutionError::SpawnFailed {
                program: self.spawned_program(),
                source,
            })?;
        log::debug!(
            "spawned {} (pid {:?}) in {}",
            self.program.display(),
            child.id(),
            self.working_dir.display()
        );

        let mut capture = Capture::new(&mut child);
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, capture.drain(&mut child))
                .await
                .map_err(|_| limit),
            None => Ok(capture.drain(&mut child).await),
        };

        let status = match waited {
            Ok(status) => status.map_err(ExecutionError::Wait)?,
            Err(limit) => {
                if let Err(e) = child.start_kill() {
                    log::warn!("failed to kill {}: {}", self.program.display(), e);
                }
                // Descendants may still hold the pipes open.
                let _ = tokio::time::timeout(KILL_GRACE, capture.drain(&mut child)).await;
                return Err(ExecutionError::TimedOut {
                    limit,
                    stderr: String::from_utf8_lossy(&capture.stderr).into_owned(),
                });
            }
        };

        let outcome = ProcessOutcome {
            exit_code: status.code(),
            stdout: Bytes::from(capture.stdout),
            stderr: Bytes::from(capture.stderr),
        };
        if !status.success() {
            return Err(ExecutionError::NonZeroExit {
                code: outcome.exit_code,
                stderr: outcome.stderr_text(),
            });
        }
        Ok(outcome)
    }
}

const KILL_GRACE: Duration = Duration::from_secs(1);

/// Output pipes of a running child and what has been read from them.
/// Buffers survive a cancelled [`Capture::drain`].
struct Capture {
    stdout_pipe: Option<ChildStdout>,
    stderr_pipe: Option<ChildStderr>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Capture {
    fn new(child: &mut Child) -> Self {
        Self {
            stdout_pipe: child.stdout.take(),
            stderr_pipe: child.stderr.take(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    async fn drain(&mut self, child: &mut Child) -> io::Result<ExitStatus> {
        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            read_pipe(self.stdout_pipe.as_mut(), &mut self.stdout),
            read_pipe(self.stderr_pipe.as_mut(), &mut self.stderr),
        );
        stdout?;
        stderr?;
        status
    }
}

async fn read_pipe<R>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    if let Some(pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, dir: &Path) -> EncoderCommand {
        EncoderCommand::new("glraw-cmd", dir).with_launcher(["/bin/sh", "-c", script])
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[tokio::test]
    async fn test_success_captures_both_streams() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell(r#"echo "args: $*"; echo "$1 created." >&2"#, dir.path());

        let outcome = cmd.run(&os_args(&["in.png"])).await?;
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(&outcome.stdout[..], b"args: in.png\n");
        assert_eq!(outcome.stderr_text(), "in.png created.\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell("pwd -P", dir.path());

        let outcome = cmd.run(&[]).await?;
        let reported = String::from_utf8_lossy(&outcome.stdout).trim().to_string();
        assert_eq!(Path::new(&reported), dir.path().canonicalize()?);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell("printf 'unsupported format' >&2; exit 3", dir.path());

        match cmd.run(&[]).await {
            Err(ExecutionError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "unsupported format");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = EncoderCommand::new("/nonexistent/glraw-cmd", dir.path());

        match cmd.run(&os_args(&["in.png"])).await {
            Err(ExecutionError::SpawnFailed { program, .. }) => {
                assert_eq!(program, PathBuf::from("/nonexistent/glraw-cmd"));
            }
            other => panic!("expected SpawnFailed, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_spawn_failure() {
        let cmd = EncoderCommand::new("/bin/sh", "/nonexistent/glraw/workdir");
        assert!(matches!(
            cmd.run(&os_args(&["-c", "true"])).await,
            Err(ExecutionError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell("sleep 5", dir.path()).with_timeout(Some(Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let result = cmd.run(&[]).await;
        assert!(matches!(result, Err(ExecutionError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_stderr() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell("echo 'photo.raw created.' >&2; exec sleep 5", dir.path())
            .with_timeout(Some(Duration::from_millis(500)));

        match cmd.run(&[]).await {
            Err(ExecutionError::TimedOut { limit, stderr }) => {
                assert_eq!(limit, Duration::from_millis(500));
                assert_eq!(stderr, "photo.raw created.\n");
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cmd = shell(
            "i=0; while [ $i -lt 20000 ]; do echo \"line $i of progress\"; echo \"err $i\" >&2; i=$((i+1)); done",
            dir.path(),
        )
        .with_timeout(Some(Duration::from_secs(30)));

        let outcome = cmd.run(&[]).await?;
        assert!(outcome.stdout.len() > 65536);
        assert!(outcome.stderr.len() > 65536);
        Ok(())
    }
}
