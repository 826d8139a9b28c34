use clap::Args;
use ploy::config::{self, Config, Params};
use std::path::{Path, PathBuf};

pub type CmdResult<T> = ploy::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Configuration file selection shared by commands that read it.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file (.json, .yaml/.yml or .toml)
    #[arg(long, short = 'c', value_name = "PATH", default_value = config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> ploy::Result<Config> {
        load_config(&self.config)
    }
}

pub(crate) fn load_config(path: &Path) -> ploy::Result<Config> {
    if !path.exists() {
        return Err(ploy::Error::config_invalid(
            path.display().to_string(),
            "configuration file not found",
        )
        .with_hint("Run 'ploy init' to write a sample configuration"));
    }
    if path.is_dir() {
        return Err(ploy::Error::validation_invalid_argument(
            "config",
            "expected a file, got a directory",
            Some(path.display().to_string()),
        ));
    }
    config::load(path)
}

/// Parse a `key=value` parameter override.
pub(crate) fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

pub(crate) fn params_from(pairs: &[(String, String)]) -> Params {
    pairs.iter().cloned().collect()
}

pub mod check;
pub mod init;
pub mod rollback;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run_json($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (ploy::Result<serde_json::Value>, i32) {
    crate::tty::status("ploy is working...");

    match command {
        // Commands without global context
        crate::Commands::Init(args) => dispatch!(args, init),

        // Commands with global context
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Rollback(args) => dispatch!(args, global, rollback),
        crate::Commands::Check(args) => dispatch!(args, global, check),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_splits_on_first_equals() {
        assert_eq!(
            parse_param("tag=v1=rc").unwrap(),
            ("tag".to_string(), "v1=rc".to_string())
        );
        assert_eq!(
            parse_param("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn param_requires_name_and_separator() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn later_params_win() {
        let params = params_from(&[
            ("a".to_string(), "1".to_string()),
            ("a".to_string(), "2".to_string()),
        ]);
        assert_eq!(params["a"], "2");
    }

    #[test]
    fn missing_config_points_at_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid");
        assert!(err.hints.iter().any(|h| h.message.contains("ploy init")));
    }

    #[test]
    fn directory_is_not_a_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
        assert_eq!(err.details["field"], "config");
    }
}
