// Execution strategy - routes a named pipeline to local or SSH execution.
//
// The caller picks the mode from the --local flag; both strategies expose the
// same contract: aggregated output on success, the first error otherwise.

use crate::config::{Config, Params};
use crate::error::Result;
use crate::local::LocalExecutor;
use crate::placeholder;
use crate::remote::RemoteExecutor;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Local,
    Remote,
}

impl ExecutionMode {
    pub fn from_local_flag(local: bool) -> Self {
        if local {
            ExecutionMode::Local
        } else {
            ExecutionMode::Remote
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Remote => "remote",
        }
    }
}

/// Execute a named pipeline and return its aggregated output.
///
/// On error nothing is returned: output gathered before the failure is
/// discarded.
pub trait PipelineExecutor {
    fn mode(&self) -> ExecutionMode;

    fn execute(&self, pipeline: &str) -> Result<String>;
}

pub enum Executor<'a> {
    Local(LocalExecutor<'a>),
    Remote(RemoteExecutor<'a>),
}

impl<'a> Executor<'a> {
    pub fn new(mode: ExecutionMode, config: &'a Config) -> Self {
        match mode {
            ExecutionMode::Local => Executor::Local(LocalExecutor::new(config)),
            ExecutionMode::Remote => Executor::Remote(RemoteExecutor::new(config)),
        }
    }
}

impl PipelineExecutor for Executor<'_> {
    fn mode(&self) -> ExecutionMode {
        match self {
            Executor::Local(_) => ExecutionMode::Local,
            Executor::Remote(_) => ExecutionMode::Remote,
        }
    }

    fn execute(&self, pipeline: &str) -> Result<String> {
        match self {
            Executor::Local(executor) => executor.execute(pipeline),
            Executor::Remote(executor) => executor.execute(pipeline),
        }
    }
}

/// Render `template` for immediate execution, noting placeholders left as-is.
pub(crate) fn render_command(prefix: &'static str, template: &str, params: &Params) -> String {
    let unresolved = placeholder::unresolved(template, params);
    if !unresolved.is_empty() {
        log_status!(
            "run",
            "{}: unresolved placeholder(s) {} left verbatim",
            prefix,
            unresolved.join(", ")
        );
    }
    placeholder::populate(template, params)
}

/// Result of one successful pipeline execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub pipeline: String,
    pub mode: ExecutionMode,
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub started_at: String,
    pub output: String,
}

/// Run `pipelines` in order, stopping at the first failure.
pub fn run_pipelines<E: PipelineExecutor + ?Sized>(
    executor: &E,
    pipelines: &[String],
) -> Result<Vec<PipelineRun>> {
    let mut runs: Vec<PipelineRun> = Vec::with_capacity(pipelines.len());

    for name in pipelines {
        let started_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        log_status!("run", "Pipeline {} ({})", name, executor.mode().as_str());

        match executor.execute(name) {
            Ok(output) => runs.push(PipelineRun {
                pipeline: name.clone(),
                mode: executor.mode(),
                started_at,
                output,
            }),
            Err(err) if runs.is_empty() => return Err(err),
            Err(err) => {
                let completed: Vec<&str> = runs.iter().map(|r| r.pipeline.as_str()).collect();
                let err = err.with_hint(format!(
                    "Pipelines completed before the failure: {}",
                    completed.join(", ")
                ));
                return Err(match serde_json::to_value(&runs) {
                    Ok(value) => err.with_detail("completedRuns", value),
                    Err(_) => err,
                });
            }
        }
    }

    Ok(runs)
}
