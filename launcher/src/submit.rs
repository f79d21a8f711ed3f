mod scheduler;

pub use scheduler::SchedulerSubmitter;

use crate::config::{check_submit_command, ConfigErrors, LaunchConfig};
use std::{io, time::Duration};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Failed to spawn submit command {command}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to pass the job script to the submit command")]
    Write(#[source] io::Error),
    #[error("Failed to wait for the submit command")]
    Wait(#[source] io::Error),
    #[error("Submit command {command} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("Submit command exited with {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
}

/// How rendered scripts are handed to the scheduler
#[derive(Debug, Clone)]
pub enum Submitters {
    Scheduler(SchedulerSubmitter),
    DryRun,
}

impl Submitters {
    pub fn load(config: &LaunchConfig, dry_run: bool) -> Result<Self, ConfigErrors> {
        if dry_run {
            return Ok(Self::DryRun);
        }

        let command = config.submit_command();
        check_submit_command(command)?;

        Ok(Self::Scheduler(SchedulerSubmitter::new(
            command,
            config.submit.args.clone(),
            Duration::from_secs(config.submit.timeout),
        )))
    }

    /// submit a job script, returning what the scheduler printed (usually the job id)
    pub fn submit(&self, name: &str, script: &str) -> Result<Option<String>, SubmitError> {
        match self {
            Self::Scheduler(submitter) => submitter.submit(script).map(Some),
            Self::DryRun => {
                info!(job = name, "Dry run, not submitting:\n{script}");

                Ok(None)
            }
        }
    }
}
