//! Pipeline resolution.
//!
//! Lookups are exposed one at a time so executors can check each server and
//! task only when they reach it. [`plan`] is the eager variant used for dry
//! runs.

use crate::config::{Config, Pipeline, Server};
use crate::error::{Error, Result};
use crate::executor::ExecutionMode;
use crate::placeholder;
use serde::Serialize;

pub fn resolve<'a>(config: &'a Config, name: &str) -> Result<&'a Pipeline> {
    config
        .pipeline(name)
        .ok_or_else(|| Error::pipeline_not_found(name))
}

/// Server names of `pipeline`, failing when there are none.
pub fn require_servers<'a>(name: &str, pipeline: &'a Pipeline) -> Result<&'a [String]> {
    if pipeline.servers.is_empty() {
        return Err(Error::pipeline_no_servers(name));
    }
    Ok(&pipeline.servers)
}

pub fn server<'a>(config: &'a Config, pipeline: &str, name: &str) -> Result<&'a Server> {
    config
        .server(name)
        .ok_or_else(|| Error::server_not_found(name, Some(pipeline.to_string())))
}

pub fn task_commands<'a>(config: &'a Config, pipeline: &str, task: &str) -> Result<&'a [String]> {
    config
        .task(task)
        .ok_or_else(|| Error::task_not_found(task, Some(pipeline.to_string())))
}

/// One command as it would run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUnit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub task: String,
    pub template: String,
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub pipeline: String,
    pub mode: ExecutionMode,
    pub units: Vec<ExecutionUnit>,
}

/// Expand `name` into ordered units, validating every reference up front.
///
/// Commands are rendered at plan time; a real run renders each one again
/// right before it executes.
pub fn plan(config: &Config, name: &str, mode: ExecutionMode) -> Result<ExecutionPlan> {
    let pipeline = resolve(config, name)?;

    let servers: Vec<Option<&str>> = match mode {
        ExecutionMode::Local => vec![None],
        ExecutionMode::Remote => {
            let names = require_servers(name, pipeline)?;
            for server_name in names {
                server(config, name, server_name)?;
            }
            names.iter().map(|s| Some(s.as_str())).collect()
        }
    };

    let mut units = Vec::new();
    for server_name in servers {
        for task in &pipeline.tasks {
            for template in task_commands(config, name, task)? {
                units.push(ExecutionUnit {
                    server: server_name.map(str::to_string),
                    task: task.clone(),
                    template: template.clone(),
                    command: placeholder::populate(template, &config.params),
                    unresolved: placeholder::unresolved(template, &config.params),
                });
            }
        }
    }

    Ok(ExecutionPlan {
        pipeline: name.to_string(),
        mode,
        units,
    })
}
