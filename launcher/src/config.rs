use crate::{
    descriptor::{
        Argument, EnvironmentStep, InvocationSpec, LaunchDescriptor, LaunchError, ResourceRequest,
    },
    render::Dialect,
    sweep::{suffixed, Sweep},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read launch file")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse launch file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Launch declaration rejected: {0}")]
    Launch(#[from] LaunchError),
    #[error("Preflight checks failed")]
    Preflight,
    #[error("Submit command '{0}' not supported, expected a single program name or path")]
    UnsupportedSubmitCommand(String),
}

/// A launch file: one job, optionally swept over a set of hyperparameters
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    // directive syntax of the target scheduler
    #[serde(default)]
    pub dialect: Dialect,
    // interpreter for the `#!` line of written scripts, none when unset
    #[serde(default)]
    pub shebang: Option<String>,
    pub resources: ResourceRequest,
    #[serde(default, alias = "modules")]
    pub environment: Vec<EnvironmentStep>,
    pub invocation: InvocationSpec,
    #[serde(default)]
    pub sweep: Sweep,
    #[serde(default)]
    pub submit: SubmitConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    // defaults to the dialect's submit command (qsub or sbatch)
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    // seconds to wait for the scheduler to accept a job
    #[serde(default = "default_submit_timeout")]
    pub timeout: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout: default_submit_timeout(),
        }
    }
}

impl LaunchConfig {
    pub fn parse(source: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        debug!(path = ?path, "Loading launch file");

        Self::parse(&fs::read_to_string(path)?)
    }

    /// submit command to use, falling back to the dialect default
    pub fn submit_command(&self) -> &str {
        self.submit
            .command
            .as_deref()
            .unwrap_or_else(|| self.dialect.submit_command())
    }

    /// Run all checks and log every problem instead of stopping at the first.
    /// Returns true if any error was found.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if let Err(e) = self.resources.validate() {
            error!("resources: {e}");
            contains_error = true;
        }

        if let Err(e) = self.invocation.validate() {
            error!("invocation: {e}");
            contains_error = true;
        }

        for flag in self.sweep.empty_axes() {
            error!("sweep.{flag} has no values, the sweep would not produce any job");
            contains_error = true;
        }

        let fixed_flags: BTreeSet<&str> = self
            .invocation
            .arguments
            .iter()
            .map(Argument::name)
            .collect();
        for flag in self.sweep.flags() {
            if fixed_flags.contains(flag) {
                error!("sweep.{flag} is also passed as a fixed argument, remove one of them");
                contains_error = true;
            }
        }

        let command = self.submit_command();
        if let Err(e) = check_submit_command(command) {
            error!("submit.command: {e}");
            contains_error = true;
        } else if self.submit.command.is_some() && !command.ends_with(self.dialect.submit_command())
        {
            warn!(
                "submit.command '{command}' does not look like {} for {} scripts",
                self.dialect.submit_command(),
                self.dialect
            );
        }

        if self.submit.timeout == 0 {
            error!("submit.timeout cannot be 0");
            contains_error = true;
        }

        // variables like $PBS_O_WORKDIR only resolve on the cluster
        if let Some(directory) = self
            .invocation
            .working_directory
            .as_ref()
            .filter(|directory| !directory.to_string_lossy().contains('$'))
        {
            let script = directory.join(&self.invocation.script_path);
            if !script.exists() {
                warn!(
                    "Script {} not found, make sure it exists on the cluster",
                    script.to_string_lossy()
                );
            }
        }

        if self.environment.iter().unique().count() != self.environment.len() {
            debug!("environment lists a module more than once, every load is kept in order");
        }

        contains_error
    }

    /// Build one descriptor per sweep combination.
    ///
    /// With more than one combination, the job name and both output paths get
    /// a `_<index>` suffix so the jobs stay distinguishable on the scheduler.
    pub fn descriptors(&self) -> Result<Vec<LaunchDescriptor>, ConfigErrors> {
        let combinations = self.sweep.combinations();
        let is_sweep = combinations.len() > 1;

        debug!(count = combinations.len(), "Expanding launch file into jobs");

        combinations
            .into_iter()
            .enumerate()
            .map(|(index, sweep_arguments)| -> Result<LaunchDescriptor, ConfigErrors> {
                let mut resources = self.resources.clone();
                if is_sweep {
                    let suffix = format!("_{index}");
                    resources.job_name.push_str(&suffix);
                    resources.stdout_path = suffixed(&resources.stdout_path, &suffix);
                    resources.stderr_path = suffixed(&resources.stderr_path, &suffix);
                }

                let mut invocation = self.invocation.clone();
                invocation.arguments.extend(sweep_arguments);

                let mut descriptor = LaunchDescriptor::with_dialect(self.dialect);
                descriptor.declare_resources(resources)?;
                self.environment
                    .iter()
                    .cloned()
                    .for_each(|step| descriptor.add_environment_step(step));
                descriptor.set_invocation(invocation)?;

                Ok(descriptor)
            })
            .collect()
    }

    /// file name a rendered descriptor is written to
    pub fn script_file_name(&self, descriptor: &LaunchDescriptor) -> PathBuf {
        let job_name = descriptor
            .resources()
            .map_or(self.resources.job_name.as_str(), |resources| {
                resources.job_name.as_str()
            });

        // keep the script inside the output directory whatever the job is called
        let file_stem: String = job_name
            .chars()
            .map(|c| match c {
                '/' | '\\' => '_',
                c if c.is_whitespace() || c.is_control() => '_',
                c => c,
            })
            .collect();

        PathBuf::from(format!(
            "{file_stem}.{}",
            descriptor.dialect().script_extension()
        ))
    }
}

pub fn check_submit_command(command: &str) -> Result<(), ConfigErrors> {
    if command.is_empty() || command.chars().any(char::is_whitespace) {
        Err(ConfigErrors::UnsupportedSubmitCommand(command.to_owned()))
    } else {
        Ok(())
    }
}

fn default_submit_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAUNCH_FILE: &str = r#"
resources:
  nodes: 1
  ppn: 16
  gpus: 1
  walltime: "1:00:00"
  account: xzv-031-ab
  job_name: bayesianAL
  queue: aw
  stdout: out.txt
  stderr: err.txt
environment:
  - CompilerToolchain/2015b
  - LangRuntime/3.5.2
  - GPULib/7.5
invocation:
  interpreter: python3
  script: ./experiment_ss.py
  arguments:
    - -p: uniform-varratio
    - -f: TEST_experiment_ss
    - -data: mnist
"#;

    fn with_sweep(sweep: &str) -> String {
        format!("{LAUNCH_FILE}sweep:\n{sweep}")
    }

    #[test]
    fn parses_launch_file_with_defaults() {
        let config = LaunchConfig::parse(LAUNCH_FILE).unwrap();

        assert_eq!(config.dialect, Dialect::Pbs);
        assert_eq!(config.shebang, None);
        assert_eq!(config.environment.len(), 3);
        assert_eq!(config.invocation.arguments.len(), 3);
        assert!(config.sweep.is_empty());
        assert_eq!(config.submit, SubmitConfig::default());
        assert_eq!(config.submit_command(), "qsub");
        assert!(!config.preflight_checks());
    }

    #[test]
    fn demo_launch_file_renders() {
        let config = LaunchConfig::parse(include_str!("../../demos/bayesian_al.yaml")).unwrap();
        assert!(!config.preflight_checks());
        assert_eq!(config.submit.timeout, 60);

        let descriptors = config.descriptors().unwrap();
        let script = descriptors[0].render().to_script(config.shebang.as_deref());

        assert!(script.starts_with("#!/bin/bash\n#PBS -l nodes=1:ppn=16:gpus=1\n"));
        assert!(script.ends_with(
            "module load GPULib/7.5\npython3 ./experiment_ss.py -p uniform-varratio -f TEST_experiment_ss -data mnist\n"
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let source = LAUNCH_FILE.replace("  ppn: 16", "  ppn: 16\n  memory: 4gb");
        assert!(matches!(
            LaunchConfig::parse(&source),
            Err(ConfigErrors::Yaml(_))
        ));
    }

    #[test]
    fn single_job_keeps_names() {
        let config = LaunchConfig::parse(LAUNCH_FILE).unwrap();
        let descriptors = config.descriptors().unwrap();

        assert_eq!(descriptors.len(), 1);
        let resources = descriptors[0].resources().unwrap();
        assert_eq!(resources.job_name, "bayesianAL");
        assert_eq!(resources.stdout_path, "out.txt");
        assert_eq!(
            config.script_file_name(&descriptors[0]),
            PathBuf::from("bayesianAL.pbs")
        );
    }

    #[test]
    fn sweep_expands_and_suffixes() {
        let config =
            LaunchConfig::parse(&with_sweep("  -lr: [0.01, 0.001]\n  -seed: [1, 2]\n")).unwrap();
        assert!(!config.preflight_checks());

        let descriptors = config.descriptors().unwrap();
        assert_eq!(descriptors.len(), 4);

        let last = &descriptors[3];
        let resources = last.resources().unwrap();
        assert_eq!(resources.job_name, "bayesianAL_3");
        assert_eq!(resources.stdout_path, "out_3.txt");
        assert_eq!(resources.stderr_path, "err_3.txt");

        let rendered = last.render();
        assert!(rendered
            .lines()
            .last()
            .unwrap()
            .ends_with("-data mnist -lr 0.001 -seed 2"));
    }

    #[test]
    fn script_file_name_stays_in_output_directory() {
        let mut config = LaunchConfig::parse(LAUNCH_FILE).unwrap();
        config.resources.job_name = "../x".to_owned();
        assert!(config.preflight_checks());
        assert!(matches!(
            config.descriptors(),
            Err(ConfigErrors::Launch(LaunchError::InvalidResource {
                field: "job_name",
                ..
            }))
        ));

        // undeclared descriptors fall back to the file's job name
        let file_name = config.script_file_name(&LaunchDescriptor::new());
        assert_eq!(file_name, PathBuf::from(".._x.pbs"));
        assert_eq!(file_name.components().count(), 1);
        assert_eq!(
            Path::new("out").join(&file_name).parent(),
            Some(Path::new("out"))
        );
    }

    #[test]
    fn preflight_reports_sweep_problems() {
        let empty = LaunchConfig::parse(&with_sweep("  -lr: []\n")).unwrap();
        assert!(empty.preflight_checks());

        let colliding = LaunchConfig::parse(&with_sweep("  -data: [mnist, cifar10]\n")).unwrap();
        assert!(colliding.preflight_checks());
    }

    #[test]
    fn preflight_reports_bad_submit_settings() {
        let mut config = LaunchConfig::parse(LAUNCH_FILE).unwrap();
        config.submit.command = Some("qsub -V".to_owned());
        assert!(config.preflight_checks());

        config.submit.command = Some("/opt/torque/bin/qsub".to_owned());
        assert!(!config.preflight_checks());

        config.submit.timeout = 0;
        assert!(config.preflight_checks());
    }

    #[test]
    fn preflight_catches_invalid_declarations() {
        let config = LaunchConfig::parse(&LAUNCH_FILE.replace("nodes: 1", "nodes: 0")).unwrap();
        assert!(config.preflight_checks());
        assert!(matches!(
            config.descriptors(),
            Err(ConfigErrors::Launch(LaunchError::InvalidResource {
                field: "node_count",
                ..
            }))
        ));
    }

    #[test]
    fn slurm_dialect_from_file() {
        let config = LaunchConfig::parse(&format!("dialect: slurm\n{LAUNCH_FILE}")).unwrap();

        assert_eq!(config.submit_command(), "sbatch");
        let descriptors = config.descriptors().unwrap();
        assert_eq!(descriptors[0].render().lines()[0], "#SBATCH --nodes=1");
        assert_eq!(
            config.script_file_name(&descriptors[0]),
            PathBuf::from("bayesianAL.sh")
        );
    }
}
