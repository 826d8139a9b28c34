// Public modules
pub mod config;
pub mod error;
pub mod executor;
pub mod local;
pub mod output;
pub mod pipeline;
pub mod placeholder;
pub mod remote;
pub mod rollback;
pub mod ssh;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use executor::{run_pipelines, ExecutionMode, Executor, PipelineExecutor, PipelineRun};
