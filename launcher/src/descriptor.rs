pub mod environment;
pub mod invocation;
pub mod resources;
pub mod walltime;


pub use environment::EnvironmentStep;
pub use invocation::{Argument, InvocationSpec, Scalar};
pub use resources::ResourceRequest;
pub use walltime::Walltime;

use crate::render::{quote_directory, Dialect, RenderedJob};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Invalid resource {field}: {reason}")]
    InvalidResource { field: &'static str, reason: String },
    #[error("Invalid invocation {field}: {reason}")]
    InvalidInvocation { field: &'static str, reason: String },
    #[error("Invalid environment step '{0}', expected name/version")]
    InvalidEnvironmentStep(String),
    #[error("Invalid walltime '{0}', expected H:MM:SS")]
    InvalidWalltime(String),
}

impl LaunchError {
    pub(crate) fn resource(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn invocation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInvocation {
            field,
            reason: reason.into(),
        }
    }
}

/// Declarative description of a single batch job: what it asks the scheduler
/// for, which software it loads and what it finally runs.
///
/// Declarations are validated when they are made, so `render` never fails.
/// The descriptor never talks to the scheduler itself.
#[derive(Debug, Clone, Default)]
pub struct LaunchDescriptor {
    dialect: Dialect,
    resources: Option<ResourceRequest>,
    environment: Vec<EnvironmentStep>,
    invocation: Option<InvocationSpec>,
}

impl LaunchDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// record the resource budget, rejecting non-positive counts and empty identifiers
    /// a rejected request leaves the previous declaration in place
    pub fn declare_resources(&mut self, request: ResourceRequest) -> Result<(), LaunchError> {
        request.validate()?;

        debug!(
            job_name = %request.job_name,
            nodes = request.node_count,
            ppn = request.processors_per_node,
            gpus = request.gpu_count,
            "Declared resources"
        );
        self.resources = Some(request);

        Ok(())
    }

    pub fn add_environment_step(&mut self, step: EnvironmentStep) {
        debug!(step = %step, position = self.environment.len(), "Added environment step");
        self.environment.push(step);
    }

    /// record the target program, rejecting an empty interpreter or script path
    pub fn set_invocation(&mut self, spec: InvocationSpec) -> Result<(), LaunchError> {
        spec.validate()?;

        debug!(
            interpreter = %spec.interpreter,
            script = %spec.script_path,
            arguments = spec.arguments.len(),
            "Set invocation"
        );
        self.invocation = Some(spec);

        Ok(())
    }

    pub fn resources(&self) -> Option<&ResourceRequest> {
        self.resources.as_ref()
    }

    pub fn environment(&self) -> &[EnvironmentStep] {
        &self.environment
    }

    pub fn invocation(&self) -> Option<&InvocationSpec> {
        self.invocation.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.resources.is_some() && self.invocation.is_some()
    }

    /// Serialize the descriptor into the lines of a job script.
    ///
    /// Layout: resource directives in canonical order, the working directory
    /// change, one line per environment step in insertion order and finally
    /// the invocation line. Sections that were never declared are left out.
    pub fn render(&self) -> RenderedJob {
        let mut lines = Vec::new();

        match &self.resources {
            Some(resources) => lines.extend(self.dialect.directives(resources)),
            None => warn!("Rendering without declared resources, the directive block is omitted"),
        }

        if let Some(invocation) = &self.invocation {
            let directory = match &invocation.working_directory {
                Some(path) => quote_directory(&path.to_string_lossy()).into_owned(),
                None => self.dialect.submit_dir_variable().to_owned(),
            };
            lines.push(format!("cd {directory}"));
        }

        lines.extend(self.environment.iter().map(EnvironmentStep::render));

        match &self.invocation {
            Some(invocation) => lines.push(invocation.command_line()),
            None => warn!("Rendering without an invocation, the job will not run anything"),
        }

        RenderedJob::new(lines)
    }
}
