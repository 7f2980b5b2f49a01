//! Supervision of the external process that writes the zip stream.
//!
//! An [`ArchiveProducer`] owns exactly one child process for the lifetime of
//! one download. The child is reaped through [`ArchiveProducer::wait`] or
//! [`ArchiveProducer::terminate`]; dropping an unreaped producer kills it.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

pub struct ArchiveProducer {
    child: Child,
    stdout: ChildStdout,
    pid: Option<u32>,
    status: Option<ExitStatus>,
    live: Arc<AtomicUsize>,
}

impl ArchiveProducer {
    /// Start `program args...` inside `source_dir` with stdout and stderr piped.
    pub fn spawn(
        program: &str,
        args: &[String],
        source_dir: &Path,
        live: Arc<AtomicUsize>,
    ) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(source_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("producer stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, pid));
        }

        live.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(pid, program, dir = %source_dir.display(), "archive producer started");

        Ok(Self {
            child,
            stdout,
            pid,
            status: None,
            live,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// The archive byte stream.
    pub fn stdout(&mut self) -> &mut ChildStdout {
        &mut self.stdout
    }

    /// Wait for the producer to exit on its own and reap it.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.mark_reaped(status);
        Ok(status)
    }

    /// Kill the producer if it is still running, then reap it.
    ///
    /// Safe to call any number of times; once reaped the cached status is
    /// returned without signalling or waiting again.
    pub async fn terminate(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = match self.child.try_wait()? {
            Some(status) => status,
            None => {
                tracing::debug!(pid = self.pid, "killing archive producer");
                self.child.start_kill()?;
                self.child.wait().await?
            }
        };
        self.mark_reaped(status);
        Ok(status)
    }

    fn mark_reaped(&mut self, status: ExitStatus) {
        if self.status.is_none() {
            self.status = Some(status);
            self.live.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(pid = self.pid, %status, "archive producer reaped");
        }
    }
}

impl Drop for ArchiveProducer {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        // Only reached when the owning task is torn down mid-flight; the
        // runtime reaps killed orphans in the background.
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(pid = self.pid, error = %e, "failed to kill dropped archive producer");
        } else {
            tracing::warn!(pid = self.pid, "archive producer dropped while running; killed");
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// How a zip-compatible producer's exit status reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipExit {
    Complete,
    /// Exit 18: some files could not be read; the archive holds the rest.
    SkippedFiles,
    /// Exit 12: nothing to archive, so no output was written.
    NothingToDo,
    Failed,
}

impl ZipExit {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Self::Complete,
            Some(12) => Self::NothingToDo,
            Some(18) => Self::SkippedFiles,
            _ => Self::Failed,
        }
    }
}

/// End-of-central-directory record of a zip archive with no entries.
pub const EMPTY_ZIP: [u8; 22] = [
    0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Forward producer diagnostics to the log so the stderr pipe never fills.
async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(pid, "producer: {line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(pid, error = %e, "producer stderr closed");
                break;
            }
        }
    }
}
