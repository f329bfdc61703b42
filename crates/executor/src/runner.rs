use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{metrics::Metrics, Error, Result};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed waiting for {command}: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    Exit { command: String, status: ExitStatus },
}

/// Runs the configured command once per alert notification.
///
/// Runs are independent: there is no queue, no concurrency limit and no
/// deduplication. The only shared state is the pair of process instruments
/// in [`Metrics`].
pub struct ProcessRunner {
    command: String,
    args: Vec<String>,
    metrics: Metrics,
}

impl ProcessRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>, metrics: Metrics) -> Self {
        Self {
            command: command.into(),
            args,
            metrics,
        }
    }

    /// Builds a runner from the positional command line: the first entry is
    /// the executable, the rest are its arguments.
    pub fn from_positional(positional: Vec<String>, metrics: Metrics) -> Result<Self> {
        let mut positional = positional.into_iter();
        let command = positional
            .next()
            .ok_or_else(|| Error::Config("Require command".to_string()))?;
        Ok(Self::new(command, positional.collect(), metrics))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawns the command with the inherited environment plus `env` and waits
    /// for it to exit. Output is streamed line by line into the log.
    ///
    /// `env` entries are applied after the inherited variables, so an entry
    /// overrides an inherited variable of the same name. Everything up to the
    /// first `=` is the name.
    pub async fn run(&self, env: &[String]) -> std::result::Result<(), ExecutionError> {
        let _in_flight = InFlight::start(&self.metrics);

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for entry in env {
            match entry.split_once('=') {
                Some((name, value)) => cmd.env(name, value),
                None => cmd.env(entry, ""),
            };
        }

        debug!(command = %self.command, args = ?self.args, "Starting process");
        let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        // Drain the pipes on their own tasks so the child keeps running if
        // this future is dropped before it exits.
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(log_lines(stdout, self.command.clone(), "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(log_lines(stderr, self.command.clone(), "stderr")));
        }

        let status = child.wait().await.map_err(|source| ExecutionError::Wait {
            command: self.command.clone(),
            source,
        })?;
        for drain in drains {
            if let Err(e) = drain.await {
                warn!("Output reader for {} failed: {}", self.command, e);
            }
        }

        if status.success() {
            debug!(command = %self.command, "Process finished");
            Ok(())
        } else {
            Err(ExecutionError::Exit {
                command: self.command.clone(),
                status,
            })
        }
    }
}

/// Tracks one run in the process instruments. Dropping it records the
/// duration and decrements the gauge, whichever way the run ends.
struct InFlight<'a> {
    metrics: &'a Metrics,
    started: Instant,
}

impl<'a> InFlight<'a> {
    fn start(metrics: &'a Metrics) -> Self {
        metrics.process_started();
        Self {
            metrics,
            started: Instant::now(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics
            .process_finished(self.started.elapsed().as_secs_f64());
    }
}

async fn log_lines<R>(reader: R, command: String, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                info!(command = %command, stream, "{}", text.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                warn!(command = %command, stream, "Failed to read process output: {}", e);
                break;
            }
        }
    }
}
