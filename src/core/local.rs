//! Runs pipeline commands as local shell subprocesses.

use crate::config::Config;
use crate::error::{CommandFailedDetails, Error, Result, TargetDetails};
use crate::executor::{render_command, ExecutionMode, PipelineExecutor};
use crate::output::OutputBuffer;
use crate::pipeline;
use crate::utils::process;

/// Executes a pipeline's tasks on this machine. The pipeline's server list
/// is never consulted.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor<'a> {
    config: &'a Config,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn execute(&self, name: &str) -> Result<String> {
        let pipeline = pipeline::resolve(self.config, name)?;
        let mut out = OutputBuffer::new();

        log_status!("local", "Running pipeline {}", name);

        for task in &pipeline.tasks {
            for template in pipeline::task_commands(self.config, name, task)? {
                let command = render_command("local", template, &self.config.params);
                log_status!("local", "[{}] {}", task, command);

                let output = process::run_combined(process::shell_command(&command))
                    .map_err(|e| {
                        Error::command_spawn_failed(&command, TargetDetails::local(), e.to_string())
                    })?;

                if !output.success {
                    return Err(Error::command_failed(CommandFailedDetails {
                        command,
                        exit_code: output.exit_code,
                        output: output.output,
                        target: TargetDetails::local(),
                    }));
                }

                out.push_str(&output.output);
            }
        }

        Ok(out.into_string())
    }
}

impl PipelineExecutor for LocalExecutor<'_> {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Local
    }

    fn execute(&self, pipeline: &str) -> Result<String> {
        LocalExecutor::execute(self, pipeline)
    }
}
