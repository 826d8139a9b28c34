use clap::Args;
use serde::Serialize;

use ploy::config::{Config, ConfigIssue};
use ploy::rollback;

use super::{CmdResult, ConfigArgs, GlobalArgs};

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutput {
    pub config: String,
    pub clean: bool,
    pub issues: Vec<ConfigIssue>,
    pub pipelines: Vec<PipelineSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub name: String,
    pub servers: Vec<String>,
    pub tasks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollback_tasks: Vec<String>,
}

pub fn run(args: CheckArgs, _global: &GlobalArgs) -> CmdResult<CheckOutput> {
    let config = args.config.load()?;
    let output = summarize(&config, args.config.config.display().to_string());
    let exit_code = if output.clean { 0 } else { 2 };
    Ok((output, exit_code))
}

fn summarize(config: &Config, path: String) -> CheckOutput {
    let issues = config.validate();
    let pipelines = config
        .pipelines
        .iter()
        .map(|(name, pipeline)| PipelineSummary {
            name: name.clone(),
            servers: pipeline.servers.clone(),
            tasks: pipeline.tasks.clone(),
            rollback_tasks: rollback::available_for_pipeline(config, name)
                .iter()
                .map(|task| rollback::rollback_task_name(task))
                .collect(),
        })
        .collect();

    CheckOutput {
        config: path,
        clean: issues.is_empty(),
        issues,
        pipelines,
    }
}
