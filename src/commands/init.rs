use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use ploy::config::{self, Config};
use ploy::{log_status, Error};

use super::CmdResult;

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the configuration; the extension picks the format
    #[arg(long, value_name = "PATH", default_value = config::DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutput {
    pub command: &'static str,
    pub path: String,
    pub overwritten: bool,
    pub pipelines: Vec<String>,
    pub next_steps: Vec<String>,
}

pub fn run_json(args: InitArgs) -> CmdResult<InitOutput> {
    let path = args.path.display().to_string();
    let exists = args.path.exists();

    if exists && !args.force {
        return Err(Error::config_exists(path));
    }

    let sample = Config::sample();
    config::save(&args.path, &sample)?;
    log_status!("init", "Wrote {}", path);

    let next_steps = vec![
        format!("Edit {} to describe your servers, tasks and pipelines", path),
        "Try it locally: ploy run say-hello --local".to_string(),
    ];

    Ok((
        InitOutput {
            command: "init",
            path,
            overwritten: exists,
            pipelines: sample.pipeline_names(),
            next_steps,
        },
        0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_sample_and_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configuration.json");

        let (output, code) = run_json(InitArgs {
            path: path.clone(),
            force: false,
        })
        .unwrap();
        assert_eq!(code, 0);
        assert!(!output.overwritten);
        assert_eq!(config::load(&path).unwrap(), Config::sample());

        let err = run_json(InitArgs {
            path: path.clone(),
            force: false,
        })
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.exists");

        let (output, _) = run_json(InitArgs { path, force: true }).unwrap();
        assert!(output.overwritten);
    }

    #[test]
    fn yaml_extension_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ploy.yaml");
        run_json(InitArgs {
            path: path.clone(),
            force: false,
        })
        .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("say-hello:"));
        assert_eq!(config::load(&path).unwrap(), Config::sample());
    }
}
