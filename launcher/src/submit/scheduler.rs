use super::SubmitError;
use std::{
    io::{self, ErrorKind, Read, Write},
    process::{Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Hands job scripts to a scheduler submit command (qsub, sbatch) on stdin
#[derive(Debug, Clone)]
pub struct SchedulerSubmitter {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SchedulerSubmitter {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[tracing::instrument(level = "debug", skip(script))]
    pub fn submit(&self, script: &str) -> Result<String, SubmitError> {
        let mut handle = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SubmitError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // both pipes are drained while the command runs, a full pipe would stall it
        let stdout = drain(handle.stdout.take());
        let stderr = drain(handle.stderr.take());

        if let Some(mut stdin) = handle.stdin.take() {
            match stdin.write_all(script.as_bytes()) {
                Ok(()) => {}
                // the command exited without reading, its exit status tells why
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!("Submit command closed stdin early")
                }
                Err(e) => return Err(SubmitError::Write(e)),
            }
            // Dropping stdin closes the pipe so the command sees the end of the script
            drop(stdin);
        }

        debug!("Submit command waiting on {}", handle.id());
        let status = match handle.wait_timeout(self.timeout).map_err(SubmitError::Wait)? {
            Some(status) => status,
            None => {
                warn!(command = %self.command, "Submit command ran into timeout, killing it");
                if let Err(error) = handle.kill().and_then(|()| handle.wait().map(|_| ())) {
                    warn!(error = ?error, "Failed to kill submit command");
                }

                // readers are left detached, a forked child may still hold the pipes open
                return Err(SubmitError::Timeout {
                    command: self.command.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !status.success() {
            return Err(SubmitError::Failed {
                status: status.code(),
                stderr: collect(stderr)?.trim().to_owned(),
            });
        }

        let output = collect(stdout)?;
        debug!("Output from submit command: {output}");

        Ok(output.trim().to_owned())
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_string(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(reader: JoinHandle<io::Result<String>>) -> Result<String, SubmitError> {
    reader
        .join()
        .map_err(|_| SubmitError::Wait(io::Error::new(ErrorKind::Other, "pipe reader panicked")))?
        .map_err(SubmitError::Wait)
}
