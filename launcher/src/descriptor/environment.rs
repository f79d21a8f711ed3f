use super::LaunchError;
use crate::render::is_shell_safe;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A versioned software module made available before the job runs,
/// written as `name/version`.
///
/// Steps are applied in the order they are declared. Loading the same module
/// twice, or a later version over an earlier one, is left to the module
/// loader.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentStep {
    name: String,
    version: String,
}

impl EnvironmentStep {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, LaunchError> {
        let name = name.into();
        let version = version.into();

        // the loader line is written unquoted, so every character must be inert to the shell
        let is_valid = |part: &str| !part.is_empty() && part.chars().all(is_shell_safe);
        if is_valid(&name) && is_valid(&version) {
            Ok(Self { name, version })
        } else {
            Err(LaunchError::InvalidEnvironmentStep(format!("{name}/{version}")))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// the loader line for this step
    pub fn render(&self) -> String {
        format!("module load {self}")
    }
}

impl FromStr for EnvironmentStep {
    type Err = LaunchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // module names may be nested (`mpi/openmpi/4.1`), the version is the last segment
        match input.trim().rsplit_once('/') {
            Some((name, version)) => Self::new(name, version),
            None => Err(LaunchError::InvalidEnvironmentStep(input.to_owned())),
        }
    }
}

impl TryFrom<String> for EnvironmentStep {
    type Error = LaunchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnvironmentStep> for String {
    fn from(step: EnvironmentStep) -> Self {
        step.to_string()
    }
}

impl fmt::Display for EnvironmentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}
