use super::{LaunchError, Walltime};
use serde::{Deserialize, Serialize};

/// Resources a job asks the batch scheduler for.
///
/// Only local sanity is checked here, whether the cluster can actually
/// satisfy the request is up to the scheduler.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResourceRequest {
    #[serde(alias = "nodes")]
    pub node_count: u32,
    #[serde(alias = "ppn")]
    pub processors_per_node: u32,
    #[serde(default, alias = "gpus")]
    pub gpu_count: u32,
    #[serde(alias = "walltime")]
    pub wall_clock_limit: Walltime,
    #[serde(alias = "account")]
    pub account_id: String,
    #[serde(alias = "queue")]
    pub queue_name: String,
    pub job_name: String,
    #[serde(alias = "stdout")]
    pub stdout_path: String,
    #[serde(alias = "stderr")]
    pub stderr_path: String,
}

impl ResourceRequest {
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.node_count == 0 {
            return Err(LaunchError::resource("node_count", "must be at least 1"));
        }

        if self.processors_per_node == 0 {
            return Err(LaunchError::resource(
                "processors_per_node",
                "must be at least 1",
            ));
        }

        if self.wall_clock_limit.is_zero() {
            return Err(LaunchError::resource(
                "wall_clock_limit",
                "must be greater than 0",
            ));
        }

        require_single_line("account_id", &self.account_id)?;
        require_single_line("queue_name", &self.queue_name)?;
        require_single_line("job_name", &self.job_name)?;
        // the job name doubles as the script file name
        if self.job_name.contains(['/', '\\']) {
            return Err(LaunchError::resource(
                "job_name",
                "must not contain path separators",
            ));
        }
        require_single_line("stdout_path", &self.stdout_path)?;
        require_single_line("stderr_path", &self.stderr_path)
    }
}

// every identifier ends up as the value of exactly one directive line
fn require_single_line(field: &'static str, value: &str) -> Result<(), LaunchError> {
    if value.trim().is_empty() {
        Err(LaunchError::resource(field, "must not be empty"))
    } else if value.contains(['\n', '\r']) {
        Err(LaunchError::resource(field, "must not contain line breaks"))
    } else {
        Ok(())
    }
}
