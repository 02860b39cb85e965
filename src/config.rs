use crate::cli::Args;
use crate::error::ErrorContext;
use crate::types::{Config, SubdoError, ToolSpec, TARGET_PLACEHOLDER};
use log::{debug, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of environment variables, swappable so tests never touch the process env.
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

pub fn load_config(config_path: &Path) -> Result<Config, SubdoError> {
    load_config_with(config_path, &process_env)
}

fn load_config_with(config_path: &Path, env: EnvLookup) -> Result<Config, SubdoError> {
    let mut config = Config::default();

    if config_path.exists() {
        let contents = fs::read_to_string(config_path)
            .config_context(|| format!("Failed to read config file {}", config_path.display()))?;
        apply_toml(&mut config, &contents)?;
        debug!("Loaded configuration from {}", config_path.display());
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
    }

    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;

    Ok(config)
}

/// Builds the effective configuration: defaults, file, environment, then flags.
pub fn from_args(args: &Args) -> Result<Config, SubdoError> {
    resolve(args, &process_env)
}

fn resolve(args: &Args, env: EnvLookup) -> Result<Config, SubdoError> {
    let mut config = match &args.config_path {
        Some(path) => load_config_with(path, env)?,
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config, env)?;
            config
        }
    };

    if let Some(timeout) = args.timeout {
        config.base_timeout = Duration::from_secs(timeout);
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone());
    }

    validate_config(&config)?;
    Ok(config)
}

/// stderr is kept unless the config file says otherwise; silent runs drop it.
pub fn include_stderr(config: &Config, silent: bool) -> bool {
    config.include_stderr.unwrap_or(!silent)
}

fn apply_toml(config: &mut Config, contents: &str) -> Result<(), SubdoError> {
    let toml_config: toml::Value =
        toml::from_str(contents).config_context(|| "Failed to parse config file".to_string())?;

    let Some(table) = toml_config.as_table() else {
        return Ok(());
    };

    if let Some(scan) = table.get("scan").and_then(|v| v.as_table()) {
        if let Some(timeout) = scan.get("timeout") {
            let secs = timeout
                .as_integer()
                .filter(|s| *s >= 0)
                .ok_or_else(|| SubdoError::ConfigError("scan.timeout must be a non-negative integer".to_string()))?;
            config.base_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(threads) = scan.get("threads") {
            let threads = threads
                .as_integer()
                .filter(|t| *t >= 0)
                .ok_or_else(|| SubdoError::ConfigError("scan.threads must be a non-negative integer".to_string()))?;
            config.threads = threads as usize;
        }
        if let Some(include) = scan.get("include_stderr") {
            let include = include
                .as_bool()
                .ok_or_else(|| SubdoError::ConfigError("scan.include_stderr must be a boolean".to_string()))?;
            config.include_stderr = Some(include);
        }
        if let Some(dir) = scan.get("output_dir") {
            let dir = dir
                .as_str()
                .ok_or_else(|| SubdoError::ConfigError("scan.output_dir must be a string".to_string()))?;
            config.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(disabled) = scan.get("disabled_tools") {
            config.disabled_tools = disabled
                .as_array()
                .and_then(|names| {
                    names
                        .iter()
                        .map(|v| v.as_str().map(str::to_lowercase))
                        .collect::<Option<Vec<_>>>()
                })
                .ok_or_else(|| {
                    SubdoError::ConfigError("scan.disabled_tools must be a list of tool names".to_string())
                })?;
        }
    }

    if let Some(tools) = table.get("tool").and_then(|v| v.as_array()) {
        for entry in tools {
            let spec: ToolSpec = entry
                .clone()
                .try_into()
                .config_context(|| "Invalid [[tool]] entry".to_string())?;
            register_tool(&mut config.tools, spec);
        }
    }

    let disabled = config.disabled_tools.clone();
    config.tools.retain(|t| !disabled.contains(&t.name));

    Ok(())
}

// Same name replaces in place, new names append in file order
fn register_tool(tools: &mut Vec<ToolSpec>, mut spec: ToolSpec) {
    spec.name = spec.name.to_lowercase();
    match tools.iter_mut().find(|t| t.name == spec.name) {
        Some(existing) => *existing = spec,
        None => tools.push(spec),
    }
}

fn apply_env_overrides(config: &mut Config, env: EnvLookup) -> Result<(), SubdoError> {
    if let Some(timeout) = env("SUBDO_TIMEOUT") {
        let secs: u64 = timeout
            .trim()
            .parse()
            .config_context(|| format!("Invalid SUBDO_TIMEOUT '{}'", timeout))?;
        config.base_timeout = Duration::from_secs(secs);
    }
    if let Some(threads) = env("SUBDO_THREADS") {
        config.threads = threads
            .trim()
            .parse()
            .config_context(|| format!("Invalid SUBDO_THREADS '{}'", threads))?;
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<(), SubdoError> {
    if config.base_timeout.as_secs() == 0 {
        return Err(SubdoError::ConfigError("Timeout must be at least 1 second".to_string()));
    }
    if config.threads == 0 {
        return Err(SubdoError::ConfigError("Threads must be greater than 0".to_string()));
    }
    for tool in &config.tools {
        if tool.command.is_empty() {
            return Err(SubdoError::ConfigError(format!("Tool {} has an empty command", tool.name)));
        }
        if !tool.command.iter().any(|t| t.contains(TARGET_PLACEHOLDER)) {
            return Err(SubdoError::ConfigError(format!(
                "Tool {} command never references {}",
                tool.name, TARGET_PLACEHOLDER
            )));
        }
        if !tool.timeout_multiplier.is_finite() || tool.timeout_multiplier < 0.0 {
            return Err(SubdoError::ConfigError(format!(
                "Tool {} has an invalid timeout multiplier {}",
                tool.name, tool.timeout_multiplier
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fake_env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_timeout, Duration::from_secs(300));
        assert_eq!(config.threads, 8);
        assert_eq!(config.tools.len(), 9);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_overrides_and_custom_tools() {
        let file = write_config(
            r#"
[scan]
timeout = 600
threads = 12
include_stderr = false
output_dir = "results"
disabled_tools = ["FFUF"]

[[tool]]
name = "findomain"
command = ["findomain", "-t", "TARGET", "-q"]
category = "passive"
priority = 1

[[tool]]
name = "subfinder"
command = ["subfinder", "-d", "TARGET"]
timeout_multiplier = 0.5
"#,
        );

        let mut config = Config::default();
        let contents = fs::read_to_string(file.path()).unwrap();
        apply_toml(&mut config, &contents).unwrap();

        assert_eq!(config.base_timeout, Duration::from_secs(600));
        assert_eq!(config.threads, 12);
        assert_eq!(config.include_stderr, Some(false));
        assert_eq!(config.output_dir, Some(PathBuf::from("results")));
        assert!(config.tools.iter().all(|t| t.name != "ffuf"));

        let names: Vec<&str> = config.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"subfinder"));
        assert_eq!(names.last(), Some(&"findomain"));

        let subfinder = &config.tools[0];
        assert_eq!(subfinder.command, vec!["subfinder", "-d", "TARGET"]);
        assert_eq!(subfinder.timeout_multiplier, 0.5);
        assert_eq!(subfinder.category, "general");
    }

    #[test]
    fn test_invalid_files_are_config_errors() {
        let mut config = Config::default();
        assert!(matches!(
            apply_toml(&mut config, "[scan\ntimeout = 1"),
            Err(SubdoError::ConfigError(_))
        ));

        let mut config = Config::default();
        assert!(matches!(
            apply_toml(&mut config, "[[tool]]\nname = \"x\"\n"),
            Err(SubdoError::ConfigError(_))
        ));

        let mut config = Config::default();
        assert!(matches!(
            apply_toml(&mut config, "[scan]\nthreads = \"many\"\n"),
            Err(SubdoError::ConfigError(_))
        ));
    }

    #[test]
    fn test_mistyped_scan_keys_are_config_errors() {
        for contents in [
            "[scan]\ninclude_stderr = \"yes\"\n",
            "[scan]\noutput_dir = 42\n",
            "[scan]\ndisabled_tools = \"ffuf\"\n",
            "[scan]\ndisabled_tools = [\"ffuf\", 3]\n",
        ] {
            let mut config = Config::default();
            assert!(
                matches!(apply_toml(&mut config, contents), Err(SubdoError::ConfigError(_))),
                "accepted: {}",
                contents
            );
        }
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[scan]\ntimeout = 600\nthreads = 12\n");
        let env = fake_env(&[("SUBDO_TIMEOUT", "90"), ("SUBDO_THREADS", " 3 ")]);

        let config = load_config_with(file.path(), &env).unwrap();
        assert_eq!(config.base_timeout, Duration::from_secs(90));
        assert_eq!(config.threads, 3);

        let config = load_config_with(file.path(), &no_env).unwrap();
        assert_eq!(config.base_timeout, Duration::from_secs(600));
        assert_eq!(config.threads, 12);
    }

    #[test]
    fn test_flags_override_environment() {
        let file = write_config("[scan]\ntimeout = 600\nthreads = 12\n");
        let path = file.path().to_string_lossy().to_string();
        let env = fake_env(&[("SUBDO_TIMEOUT", "90"), ("SUBDO_THREADS", "3")]);

        let args = Args::try_parse_from(["subdo", "-t", "example.com", "-c", &path, "--threads", "20"]).unwrap();
        let config = resolve(&args, &env).unwrap();
        assert_eq!(config.threads, 20);
        assert_eq!(config.base_timeout, Duration::from_secs(90));

        let args = Args::try_parse_from(["subdo", "-t", "example.com", "--timeout", "45"]).unwrap();
        let config = resolve(&args, &env).unwrap();
        assert_eq!(config.base_timeout, Duration::from_secs(45));
        assert_eq!(config.threads, 3);
    }

    #[test]
    fn test_bad_environment_values_are_config_errors() {
        let args = Args::try_parse_from(["subdo", "-t", "example.com"]).unwrap();

        let env = fake_env(&[("SUBDO_THREADS", "lots")]);
        assert!(matches!(resolve(&args, &env), Err(SubdoError::ConfigError(_))));

        let env = fake_env(&[("SUBDO_TIMEOUT", "-5")]);
        assert!(matches!(resolve(&args, &env), Err(SubdoError::ConfigError(_))));

        let env = fake_env(&[("SUBDO_THREADS", "0")]);
        assert!(matches!(resolve(&args, &env), Err(SubdoError::ConfigError(_))));
    }

    #[test]
    fn test_include_stderr_precedence() {
        let mut config = Config::default();
        assert!(include_stderr(&config, false));
        assert!(!include_stderr(&config, true));

        config.include_stderr = Some(true);
        assert!(include_stderr(&config, true));

        config.include_stderr = Some(false);
        assert!(!include_stderr(&config, false));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.threads = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.base_timeout = Duration::from_secs(0);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.tools.push(ToolSpec::new("static", &["echo", "hello"]));
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config
            .tools
            .push(ToolSpec::new("neg", &["neg", "TARGET"]).with_timeout_multiplier(-1.0));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_with(&dir.path().join("absent.toml"), &no_env).unwrap();
        assert_eq!(config.tools.len(), 9);
    }
}
