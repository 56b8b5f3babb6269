//! Layered configuration: compiled-in defaults, optional file, environment,
//! then CLI flags win. Mirrors the way orchestration and worker configs are
//! assembled elsewhere in the fabric, just with a much smaller field set.

use std::fmt;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{TaskFabError, TaskFabResult};

const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

/// Placement discipline selected for a dispatcher process; a worker must be
/// started with the matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Push,
    Pull,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Local => "local",
            Mode::Push => "push",
            Mode::Pull => "pull",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Mode {
    type Err = TaskFabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Mode::Local),
            "push" => Ok(Mode::Push),
            "pull" => Ok(Mode::Pull),
            other => Err(TaskFabError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherSettings {
    pub mode: String,
    pub port: u16,
    pub workers: usize,
    #[serde(default)]
    pub store_url: Option<String>,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "taskfab-dispatcher")]
pub struct DispatcherArgs {
    /// Placement discipline.
    #[arg(long)]
    pub mode: Option<Mode>,
    /// Port the dispatcher listens on (push/pull only).
    #[arg(long)]
    pub port: Option<u16>,
    /// Local-mode pool size.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Network-addressable store backend (e.g. `redis://...`); omit to use
    /// an in-process store, which only sees registrations made in this same
    /// process.
    #[arg(long)]
    pub store_url: Option<String>,
    /// Optional local configuration file.
    #[arg(long)]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub mode: Mode,
    pub port: u16,
    pub workers: usize,
    pub store_url: Option<String>,
}

impl DispatcherConfig {
    pub fn load(args: &DispatcherArgs) -> TaskFabResult<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG_TOML,
            config::FileFormat::Toml,
        ));

        if let Some(path) = &args.config_file {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TASKFAB")
                .separator("__")
                .ignore_empty(true),
        );

        let built = builder
            .build()
            .map_err(|e| TaskFabError::config(e.to_string()))?;
        let settings: DispatcherSettings = built
            .get("dispatcher")
            .map_err(|e| TaskFabError::config(e.to_string()))?;

        let mode = args
            .mode
            .map(Ok)
            .unwrap_or_else(|| settings.mode.parse())?;
        let port = args.port.unwrap_or(settings.port);
        let workers = args.workers.unwrap_or(settings.workers);
        let store_url = args.store_url.clone().or(settings.store_url);

        Ok(Self {
            mode,
            port,
            workers,
            store_url,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    pub mode: String,
    pub dispatcher_host: String,
    pub dispatcher_port: u16,
    pub pool_size: usize,
    #[serde(default)]
    pub store_url: Option<String>,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "taskfab-worker")]
pub struct WorkerArgs {
    #[arg(long)]
    pub mode: Option<Mode>,
    #[arg(long)]
    pub dispatcher_host: Option<String>,
    #[arg(long)]
    pub dispatcher_port: Option<u16>,
    /// Bounded execution pool size (P in the fabric's concurrency model).
    #[arg(long)]
    pub pool_size: Option<usize>,
    /// Network-addressable store backend (e.g. `redis://...`); must match
    /// the dispatcher's store for function registrations to be visible.
    #[arg(long)]
    pub store_url: Option<String>,
    #[arg(long)]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub mode: Mode,
    pub dispatcher_host: String,
    pub dispatcher_port: u16,
    pub pool_size: usize,
    pub store_url: Option<String>,
}

impl WorkerConfig {
    pub fn load(args: &WorkerArgs) -> TaskFabResult<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG_TOML,
            config::FileFormat::Toml,
        ));

        if let Some(path) = &args.config_file {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TASKFAB")
                .separator("__")
                .ignore_empty(true),
        );

        let built = builder
            .build()
            .map_err(|e| TaskFabError::config(e.to_string()))?;
        let settings: WorkerSettings = built
            .get("worker")
            .map_err(|e| TaskFabError::config(e.to_string()))?;

        let mode = args
            .mode
            .map(Ok)
            .unwrap_or_else(|| settings.mode.parse())?;
        let dispatcher_host = args
            .dispatcher_host
            .clone()
            .unwrap_or(settings.dispatcher_host);
        let dispatcher_port = args.dispatcher_port.unwrap_or(settings.dispatcher_port);
        let pool_size = args.pool_size.unwrap_or(settings.pool_size);
        let store_url = args.store_url.clone().or(settings.store_url);

        Ok(Self {
            mode,
            dispatcher_host,
            dispatcher_port,
            pool_size,
            store_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("PUSH".parse::<Mode>().unwrap(), Mode::Push);
        assert_eq!("pull".parse::<Mode>().unwrap(), Mode::Pull);
    }

    #[test]
    fn mode_rejects_unknown_string() {
        assert!("sideways".parse::<Mode>().is_err());
    }

    #[test]
    fn dispatcher_config_loads_defaults_with_no_overrides() {
        let args = DispatcherArgs {
            mode: None,
            port: None,
            workers: None,
            store_url: None,
            config_file: None,
        };
        let cfg = DispatcherConfig::load(&args).unwrap();
        assert_eq!(cfg.port, 7878);
        assert_eq!(cfg.store_url, None);
    }

    #[test]
    fn dispatcher_config_cli_flag_overrides_default() {
        let args = DispatcherArgs {
            mode: Some(Mode::Push),
            port: Some(9999),
            workers: None,
            store_url: Some("redis://localhost:6379".to_string()),
            config_file: None,
        };
        let cfg = DispatcherConfig::load(&args).unwrap();
        assert_eq!(cfg.mode, Mode::Push);
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.store_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn worker_config_loads_defaults_with_no_overrides() {
        let args = WorkerArgs {
            mode: None,
            dispatcher_host: None,
            dispatcher_port: None,
            pool_size: None,
            store_url: None,
            config_file: None,
        };
        let cfg = WorkerConfig::load(&args).unwrap();
        assert!(cfg.pool_size > 0);
    }
}
