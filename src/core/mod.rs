// Public modules
pub mod browser;
pub mod defaults;
pub mod deploy;
pub mod download;
pub mod error;
pub mod extract;
pub mod login;
pub mod manifest;
pub mod mode;
pub mod namespace;
pub mod paths;
pub mod pipeline;
pub mod secrets;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use mode::DeployMode;
pub use deploy::DeploymentOutcome;
pub use pipeline::{Collaborators, PipelineConfig, PipelineReport};
