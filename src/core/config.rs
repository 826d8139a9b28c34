//! Configuration model: servers, tasks, pipelines and run parameters.
//!
//! The document is loaded once per invocation and shared read-only by the
//! executors. Nothing here is validated eagerly; [`Config::validate`] is a
//! report for humans and never gates execution.

use crate::error::{Error, Result};
use crate::utils::io;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Default configuration file, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "configuration.json";

pub type Params = HashMap<String, String>;
pub type Servers = BTreeMap<String, Server>;
pub type Tasks = BTreeMap<String, Vec<String>>;
pub type Pipelines = BTreeMap<String, Pipeline>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(rename = "private-key", default)]
    pub private_key: String,
}

fn default_port() -> u16 {
    22
}

impl Server {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.user.is_empty() {
            missing.push("user");
        }
        if self.private_key.is_empty() {
            missing.push("private-key");
        }
        missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub servers: Servers,
    #[serde(default)]
    pub tasks: Tasks,
    #[serde(default)]
    pub pipelines: Pipelines,
}

/// One problem found by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigIssue {
    pub kind: ConfigIssueKind,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigIssueKind {
    UnknownTask,
    UnknownServer,
    NoServers,
    IncompleteServer,
}

impl Config {
    pub fn has_task(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    pub fn has_rollback_task(&self, task: &str) -> bool {
        self.has_task(&crate::rollback::rollback_task_name(task))
    }

    pub fn task(&self, name: &str) -> Option<&[String]> {
        self.tasks.get(name).map(Vec::as_slice)
    }

    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    /// Copy of this config with `overrides` layered over `params`.
    pub fn with_params(&self, overrides: &Params) -> Config {
        let mut config = self.clone();
        for (key, value) in overrides {
            config.params.insert(key.clone(), value.clone());
        }
        config
    }

    /// Report dangling references and incomplete servers.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (name, pipeline) in &self.pipelines {
            if pipeline.servers.is_empty() {
                issues.push(ConfigIssue {
                    kind: ConfigIssueKind::NoServers,
                    subject: name.clone(),
                    message: format!(
                        "pipeline {} has no servers and can only run with --local",
                        name
                    ),
                });
            }

            for server in &pipeline.servers {
                if !self.servers.contains_key(server) {
                    issues.push(ConfigIssue {
                        kind: ConfigIssueKind::UnknownServer,
                        subject: name.clone(),
                        message: format!("pipeline {} references unknown server {}", name, server),
                    });
                }
            }

            for task in &pipeline.tasks {
                if !self.has_task(task) {
                    issues.push(ConfigIssue {
                        kind: ConfigIssueKind::UnknownTask,
                        subject: name.clone(),
                        message: format!("pipeline {} references unknown task {}", name, task),
                    });
                }
            }
        }

        for (name, server) in &self.servers {
            let missing = server.missing_fields();
            if !missing.is_empty() {
                issues.push(ConfigIssue {
                    kind: ConfigIssueKind::IncompleteServer,
                    subject: name.clone(),
                    message: format!("server {} is missing {}", name, missing.join(", ")),
                });
            }
        }

        issues
    }

    /// The document written by `ploy init`.
    pub fn sample() -> Config {
        let mut config = Config::default();
        config
            .params
            .insert("message".to_string(), "hello, world!".to_string());
        config.servers.insert(
            "staging".to_string(),
            Server {
                host: "111.111.111.111".to_string(),
                port: 22,
                user: "ploy".to_string(),
                private_key: "/home/user/.ssh/id_rsa".to_string(),
            },
        );
        config.tasks.insert(
            "print-message".to_string(),
            vec!["echo '{{message}}'".to_string()],
        );
        config.pipelines.insert(
            "say-hello".to_string(),
            Pipeline {
                servers: vec!["staging".to_string()],
                tasks: vec!["print-message".to_string()],
            },
        );
        config
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension. Unknown extensions are JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn parse(content: &str, format: ConfigFormat, origin: &str) -> Result<Config> {
    match format {
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::config_invalid(origin, e.to_string())),
        ConfigFormat::Yaml => serde_yml::from_str(content)
            .map_err(|e| Error::config_invalid(origin, e.to_string())),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| Error::config_invalid(origin, e.to_string()))
        }
    }
}

pub fn render(config: &Config, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string()))),
        ConfigFormat::Yaml => serde_yml::to_string(config)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string()))),
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string()))),
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let content = io::read_file(path, "read configuration")?;
    parse(
        &content,
        ConfigFormat::from_path(path),
        &path.display().to_string(),
    )
}

pub fn save(path: &Path, config: &Config) -> Result<()> {
    let content = render(config, ConfigFormat::from_path(path))?;
    io::write_file_atomic(path, &content, "write configuration")
}
