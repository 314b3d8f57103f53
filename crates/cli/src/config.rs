//! Server configuration: a TOML file overridden from the command line

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use sipwire_registrar_core::RegistrarConfig;
use sipwire_transaction_core::{TimerSettings, TransactionLayerConfig};

use crate::logging::LoggingConfig;

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "sipwire", version, about = "UDP SIP registrar")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SIPWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local address to bind the UDP socket to
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Host name this server answers for; repeat for several
    #[arg(long = "host")]
    pub hosts: Vec<String>,

    /// Registration domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Refuse requests for registered users instead of forwarding them
    #[arg(long)]
    pub no_proxy: bool,
}

/// Timer overrides in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub t1_ms: Option<u64>,
    pub t2_ms: Option<u64>,
    pub t4_ms: Option<u64>,
    pub timer_d_ms: Option<u64>,
}

impl TimerConfig {
    pub fn settings(&self) -> TimerSettings {
        let defaults = TimerSettings::default();
        let or = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        TimerSettings {
            t1: or(self.t1_ms, defaults.t1),
            t2: or(self.t2_ms, defaults.t2),
            t4: or(self.t4_ms, defaults.t4),
            timer_d: or(self.timer_d_ms, defaults.timer_d),
        }
    }
}

/// Everything the binary needs to run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Host names for Via headers and response matching; empty means the
    /// bound IP address, which then must not be a wildcard
    pub hosts: Vec<String>,
    /// Advertised port, `0` for the bound one
    pub port: u16,
    pub registrar: RegistrarConfig,
    /// Forward requests other than REGISTER to the registered contacts
    pub proxy: bool,
    pub timers: TimerConfig,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5060)),
            hosts: Vec::new(),
            port: 0,
            registrar: RegistrarConfig::default(),
            proxy: true,
            timers: TimerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Reads a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Configuration file named by `cli`, or defaults, with the command-line
    /// overrides applied
    pub fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the layer could not run or advertise with
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() && self.bind.ip().is_unspecified() {
            bail!(
                "bind address {} is a wildcard; set `hosts` (or --host) to the name peers reach this server by",
                self.bind
            );
        }
        if self.hosts.iter().any(|host| host.trim().is_empty()) {
            bail!("`hosts` entries must not be empty");
        }
        self.timers
            .settings()
            .validate()
            .context("invalid [timers] section")?;
        Ok(())
    }

    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(bind) = cli.bind {
            self.bind = bind;
        }
        if !cli.hosts.is_empty() {
            self.hosts = cli.hosts.clone();
        }
        if let Some(domain) = &cli.domain {
            self.registrar.domain = domain.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if cli.json_logs {
            self.logging.json = true;
        }
        if cli.no_proxy {
            self.proxy = false;
        }
        self
    }

    pub fn layer_config(&self) -> TransactionLayerConfig {
        TransactionLayerConfig {
            hosts: self.hosts.clone(),
            port: self.port,
            timers: self.timers.settings(),
        }
    }
}
