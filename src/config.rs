use crate::provider::{AwsAuthMode, ProviderKind};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use once_cell::sync::Lazy;
use std::fmt;
use std::time::Duration;

// Returns a reference to a lazily created Config object.
static CONFIG: Lazy<Config> = Lazy::new(|| {
    if cfg!(test) {
        Config {
            log_level: LevelFilter::Error,
            api_url: String::from("http://moove:8080"),
            api_token: Some(String::from("_some_token_")),
            workspace_id: None,
            probe_mode: ProbeMode::Direct,
            probe_timeout: 10,
            command: None,
        }
    } else {
        Config::parse()
    }
});

pub fn get_config() -> &'static Config {
    &CONFIG
}

/// Where connection probes are executed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Call each provider's management API from this process
    Direct,
    /// Ask the platform's validation endpoint to probe on our behalf
    Platform,
}

#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Log level (error, warn, info, debug and trace), defaults to info
    #[arg(short, long, default_value("info"), env("LOG_LEVEL"))]
    pub log_level: LevelFilter,

    #[arg(long, default_value("http://127.0.0.1:8080"), env("RG_API_URL"))]
    pub api_url: String,

    #[arg(long, env("RG_API_TOKEN"), hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long, env("RG_WORKSPACE_ID"))]
    pub workspace_id: Option<String>,

    #[arg(long, value_enum, default_value("direct"), env("RG_PROBE_MODE"))]
    pub probe_mode: ProbeMode,

    /// Probe budget in seconds
    #[arg(long, default_value("10"), env("RG_PROBE_TIMEOUT"))]
    pub probe_timeout: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("workspace_id", &self.workspace_id)
            .field("probe_mode", &self.probe_mode)
            .field("probe_timeout", &self.probe_timeout)
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the fields a provider asks for
    Schema(ProviderArgs),
    /// Check field values without probing
    Validate(CredentialArgs),
    /// Run a connection test
    Test(CredentialArgs),
    /// Run a connection test and persist the registry when it passes
    Create(CredentialArgs),
    /// Re-check a persisted registry configuration
    Revalidate {
        configuration_id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    #[arg(short, long, value_enum)]
    pub provider: ProviderKind,

    /// Only meaningful for AWS
    #[arg(long, value_enum)]
    pub aws_auth_mode: Option<AwsAuthMode>,
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Field value as key=value, repeatable
    #[arg(short, long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))
}
