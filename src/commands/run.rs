use clap::Args;
use serde::Serialize;

use ploy::executor::{run_pipelines, ExecutionMode, Executor, PipelineRun};
use ploy::pipeline::{self, ExecutionPlan};

use super::{params_from, parse_param, CmdResult, ConfigArgs, GlobalArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Pipelines to execute, in order
    #[arg(required = true, value_name = "PIPELINE")]
    pub pipelines: Vec<String>,

    /// Run the tasks on this machine instead of the pipeline's servers
    #[arg(long, short = 'l')]
    pub local: bool,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override a parameter (repeatable)
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Print the commands that would run without executing them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunOutput {
    Executed { runs: Vec<PipelineRun> },
    Planned { plans: Vec<ExecutionPlan> },
}

pub fn run(args: RunArgs, _global: &GlobalArgs) -> CmdResult<RunOutput> {
    let config = args.config.load()?.with_params(&params_from(&args.params));
    let mode = ExecutionMode::from_local_flag(args.local);

    if args.dry_run {
        let plans = args
            .pipelines
            .iter()
            .map(|name| pipeline::plan(&config, name, mode))
            .collect::<ploy::Result<Vec<_>>>()?;
        return Ok((RunOutput::Planned { plans }, 0));
    }

    let executor = Executor::new(mode, &config);
    let runs = run_pipelines(&executor, &args.pipelines)?;

    Ok((RunOutput::Executed { runs }, 0))
}
