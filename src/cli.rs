//! Command line interface of the `wsload` binary.

use std::time::Duration;

use clap::{CommandFactory, Parser};

use crate::config::{DEFAULT_RATE, Protocol, RunConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::report::OutputFormat;

/// Single-dash `-name=value` flags accepted for compatibility.
const LEGACY_FLAGS: &[&str] = &["url", "connections", "duration", "rate"];

/// Generate WebSocket / Socket.IO load against a server.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "wsload", version, about, long_about = None)]
#[command(after_help = "Examples:\n  \
    wsload --url=http://localhost:3030 --connections=500 --duration=30\n  \
    wsload -url=http://localhost:3030 -connections=1000 -duration=60 -rate=2")]
pub struct Args {
    /// Server URL (http, https, ws or wss)
    #[arg(long)]
    pub url: Option<String>,

    /// Number of simultaneous connections
    #[arg(long)]
    pub connections: Option<usize>,

    /// Test duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Messages per second per connection
    #[arg(long, default_value_t = DEFAULT_RATE)]
    pub rate: u32,

    /// Protocol spoken on each connection
    #[arg(long, value_enum, default_value_t = Protocol::SocketIo)]
    pub protocol: Protocol,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub connect_timeout: u64,

    /// Print the final report as one JSON line, without progress lines
    #[arg(long)]
    pub json: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Parse process arguments, accepting the legacy `-name=value` form.
    ///
    /// Exits the process with usage on malformed arguments.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }

    /// Validate into run and transport settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or zero values and
    /// [`Error::InvalidUrl`] for a malformed URL.
    pub fn into_config(&self) -> Result<(RunConfig, TransportConfig)> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("server URL is required".into()))?;
        let connections = self.connections.ok_or_else(|| {
            Error::Config("number of connections is required and must be greater than 0".into())
        })?;
        let duration = self.duration.ok_or_else(|| {
            Error::Config("duration is required and must be greater than 0".into())
        })?;
        if self.connect_timeout == 0 {
            return Err(Error::Config("connect timeout must be greater than 0".into()));
        }

        let run = RunConfig::new(url, connections, duration, self.rate)?;
        let transport = TransportConfig::default()
            .with_protocol(self.protocol)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));
        Ok((run, transport))
    }

    /// Requested report format.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Full help text, printed after a configuration error.
#[must_use]
pub fn usage() -> String {
    Args::command().render_help().to_string()
}

/// Rewrite `-url=…`, `-connections=…`, `-duration=…` and `-rate=…` to their
/// double-dash form. Everything else passes through untouched.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.strip_prefix('-') {
            Some(rest)
                if !rest.starts_with('-')
                    && LEGACY_FLAGS.contains(&rest.split('=').next().unwrap_or_default()) =>
            {
                format!("-{arg}")
            }
            _ => arg,
        })
        .collect()
}
