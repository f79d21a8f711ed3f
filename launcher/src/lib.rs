//! Batch job launch descriptors.
//!
//! A [`LaunchDescriptor`] collects the resources a job asks the scheduler for,
//! the software modules it loads and the program it runs, and renders all of
//! it into a PBS or Slurm job script. Launch files ([`config::LaunchConfig`])
//! describe such jobs in YAML, optionally swept over hyperparameters.

pub mod config;
pub mod descriptor;
pub mod render;
pub mod submit;
pub mod sweep;

pub use descriptor::{
    Argument, EnvironmentStep, InvocationSpec, LaunchDescriptor, LaunchError, ResourceRequest,
    Walltime,
};
pub use render::{Dialect, RenderedJob};
