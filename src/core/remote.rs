//! Runs pipeline commands over SSH, one connection per server and one
//! session per command.

use crate::config::{Config, Pipeline};
use crate::error::{CommandFailedDetails, Error, Result};
use crate::executor::{render_command, ExecutionMode, PipelineExecutor};
use crate::output::OutputBuffer;
use crate::pipeline;
use crate::ssh::{
    load_private_key, OpenSshConnector, SshConnection, SshConnector, SshSession, SshTarget,
};

pub struct RemoteExecutor<'a, C: SshConnector = OpenSshConnector> {
    config: &'a Config,
    connector: C,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self::with_connector(config, OpenSshConnector::default())
    }
}

impl<'a, C: SshConnector> RemoteExecutor<'a, C> {
    pub fn with_connector(config: &'a Config, connector: C) -> Self {
        Self { config, connector }
    }

    /// Visit the pipeline's servers in order, running every task on each.
    ///
    /// Servers and tasks are looked up as they are reached, so earlier
    /// servers may already have run commands when a later reference fails.
    /// Any failure aborts the whole run.
    pub fn execute(&self, name: &str) -> Result<String> {
        let pipeline = pipeline::resolve(self.config, name)?;
        let servers = pipeline::require_servers(name, pipeline)?;
        let mut out = OutputBuffer::new();

        for server_name in servers {
            out.push_server_marker(name, server_name);

            let server = pipeline::server(self.config, name, server_name)?;
            let key = load_private_key(server_name, &server.private_key)?;
            let target = SshTarget::from_server(server_name, server);

            let mut connection = self.connector.connect(&target, &key)?;
            let outcome = self.run_tasks(&mut connection, name, pipeline, &target, &mut out);
            let closed = connection.close();

            outcome?;
            closed?;
        }

        Ok(out.into_string())
    }

    fn run_tasks(
        &self,
        connection: &mut C::Connection,
        name: &str,
        pipeline: &Pipeline,
        target: &SshTarget,
        out: &mut OutputBuffer,
    ) -> Result<()> {
        for task in &pipeline.tasks {
            for template in pipeline::task_commands(self.config, name, task)? {
                let command = render_command("ssh", template, &self.config.params);
                log_status!("ssh", "[{}] [{}] {}", target.server_id, task, command);

                let mut session = connection.new_session()?;
                let result = session.combined_output(&command);
                let closed = session.close();
                let output = result?;
                closed?;

                if !output.success {
                    return Err(Error::command_failed(CommandFailedDetails {
                        command,
                        exit_code: output.exit_code,
                        output: output.output,
                        target: target.details(),
                    }));
                }

                out.push_str(&output.output);
            }
        }

        Ok(())
    }
}

impl<C: SshConnector> PipelineExecutor for RemoteExecutor<'_, C> {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Remote
    }

    fn execute(&self, pipeline: &str) -> Result<String> {
        RemoteExecutor::execute(self, pipeline)
    }
}
