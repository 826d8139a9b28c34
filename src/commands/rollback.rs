use clap::Args;

use ploy::rollback::{self, RollbackReport};

use super::{CmdResult, ConfigArgs, GlobalArgs};

#[derive(Args)]
pub struct RollbackArgs {
    /// Task whose rollback companion should be shown
    pub task: String,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn run(args: RollbackArgs, _global: &GlobalArgs) -> CmdResult<RollbackReport> {
    let config = args.config.load()?;
    let report = rollback::report(&config, &args.task)?;
    Ok((report, 0))
}
