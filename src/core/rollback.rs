//! Rollback task lookup.
//!
//! A task `T` may have a companion `rollback-T`. Lookup only reports the
//! companion's commands; nothing here executes them.

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;

pub const ROLLBACK_PREFIX: &str = "rollback-";

pub fn rollback_task_name(task: &str) -> String {
    format!("{}{}", ROLLBACK_PREFIX, task)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub task: String,
    pub rollback_task: String,
    pub commands: Vec<String>,
}

pub fn lookup(config: &Config, task: &str) -> Option<RollbackReport> {
    let rollback_task = rollback_task_name(task);
    config.task(&rollback_task).map(|commands| RollbackReport {
        task: task.to_string(),
        rollback_task,
        commands: commands.to_vec(),
    })
}

pub fn report(config: &Config, task: &str) -> Result<RollbackReport> {
    lookup(config, task).ok_or_else(|| Error::task_not_found(rollback_task_name(task), None))
}

/// Tasks of `pipeline` that have a rollback companion, in pipeline order.
pub fn available_for_pipeline(config: &Config, pipeline: &str) -> Vec<String> {
    config
        .pipeline(pipeline)
        .map(|p| {
            p.tasks
                .iter()
                .filter(|task| config.has_rollback_task(task))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
