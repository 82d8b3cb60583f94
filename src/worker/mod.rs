//! Worker-side job execution: clone the repository, load its manifest,
//! run the declared steps in containers, report the outcome over RPC.

pub mod container;
mod executor;
mod local;
pub mod vcs;

pub use container::{ContainerConfig, ContainerRuntime, ContainerState, DockerCli, StepContainer};
pub use executor::JobExecutor;
pub use local::LocalRunnerChannel;
pub use vcs::{GitCli, VcsClient};
