//! Layered server configuration.
//!
//! Values come from an ordered list of [`ConfigSource`]s where later
//! sources override earlier ones key by key. The binary uses
//! defaults < INI file < environment < command line.

use std::{
    collections::HashMap,
    net::{IpAddr, ToSocketAddrs},
    path::{Path, PathBuf},
};

use ini::Ini;
use log::debug;
use thiserror::Error;

use crate::format::LogFormat;

pub const DEFAULT_LISTEN_PORT: u16 = 50_000;
pub const DEFAULT_LOG_FILE: &str = "./test.log";
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Keys recognised by [`ServerConfig::merge`], in their canonical form.
pub const CONFIG_KEYS: [&str; 5] = [
    "listen_port",
    "log_file",
    "interface",
    "max_connections",
    "log_format",
];

/// Key naming the INI file to load before the environment.
pub const CONFIG_FILE_KEY: &str = "config_file";

/// Lookup of a single configuration value by canonical key.
pub trait ConfigSource {
    fn config_value(&self, key: &str) -> Option<String>;
}

/// Errors raised while assembling a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("interface {0:?} does not resolve to an address")]
    UnresolvableInterface(String),
    #[error("failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
}

/// `--key-with-dashes=value` command-line flags.
#[derive(Clone, Debug, Default)]
pub struct ArgsConfigSource {
    args: Vec<String>,
}

impl ArgsConfigSource {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigSource for ArgsConfigSource {
    fn config_value(&self, key: &str) -> Option<String> {
        let prefix = format!("--{}=", key.replace('_', "-"));
        self.args
            .iter()
            .find_map(|arg| arg.strip_prefix(&prefix).map(str::to_owned))
    }
}

/// Environment variables named after the upper-cased key.
///
/// [`EnvConfigSource::process`] reads the live environment; tests inject a
/// map with [`EnvConfigSource::from_map`].
#[derive(Clone, Debug, Default)]
pub struct EnvConfigSource {
    overrides: Option<HashMap<String, String>>,
}

impl EnvConfigSource {
    pub fn process() -> Self {
        Self { overrides: None }
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            overrides: Some(vars),
        }
    }

    fn variable_name(key: &str) -> String {
        key.replace('-', "_").to_ascii_uppercase()
    }
}

impl ConfigSource for EnvConfigSource {
    fn config_value(&self, key: &str) -> Option<String> {
        let name = Self::variable_name(key);
        match &self.overrides {
            Some(vars) => vars.get(&name).cloned(),
            None => std::env::var(&name).ok(),
        }
    }
}

/// INI file parsed with `rust-ini`.
///
/// Keys are matched upper-cased, first in the general section and then in
/// `[server]`.
#[derive(Debug)]
pub struct IniConfigSource {
    ini: Ini,
}

impl IniConfigSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { ini })
    }

    pub fn parse(text: &str) -> Result<Self, ini::ParseError> {
        Ok(Self {
            ini: Ini::load_from_str(text)?,
        })
    }

    fn lookup(&self, section: Option<&str>, name: &str) -> Option<String> {
        let props = self.ini.section(section)?;
        props
            .iter()
            .find(|(key, _)| key.replace('-', "_").eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim().to_owned())
    }
}

impl ConfigSource for IniConfigSource {
    fn config_value(&self, key: &str) -> Option<String> {
        let name = key.replace('-', "_").to_ascii_uppercase();
        self.lookup(None, &name)
            .or_else(|| self.lookup(Some("server"), &name))
    }
}

/// Settings of one `logwire-server` process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub log_file: PathBuf,
    /// Bind only this address; `None` listens on all interfaces.
    pub interface: Option<IpAddr>,
    pub max_connections: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            interface: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Apply every key present in `source` on top of `self`.
    pub fn merge(&mut self, source: &dyn ConfigSource) -> Result<(), ConfigError> {
        if let Some(raw) = source.config_value("listen_port") {
            self.listen_port = raw.trim().parse().map_err(|err| invalid("listen_port", &raw, err))?;
        }
        if let Some(raw) = source.config_value("log_file") {
            if raw.trim().is_empty() {
                return Err(invalid("log_file", &raw, "path is empty"));
            }
            self.log_file = PathBuf::from(raw);
        }
        if let Some(raw) = source.config_value("interface") {
            self.interface = resolve_interface(&raw)?;
        }
        if let Some(raw) = source.config_value("max_connections") {
            let max: usize = raw
                .trim()
                .parse()
                .map_err(|err| invalid("max_connections", &raw, err))?;
            if max == 0 {
                return Err(invalid("max_connections", &raw, "must be at least 1"));
            }
            self.max_connections = max;
        }
        if let Some(raw) = source.config_value("log_format") {
            self.log_format = raw.parse().map_err(|err| invalid("log_format", &raw, err))?;
        }
        Ok(())
    }

    /// Defaults overridden by each source in turn.
    pub fn from_sources(sources: &[&dyn ConfigSource]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for source in sources {
            config.merge(*source)?;
        }
        Ok(config)
    }

    /// Resolve the configuration the way the server binary does.
    ///
    /// The INI file is named by `--config-file=` or `CONFIG_FILE`; the
    /// command line wins over the environment when both name one.
    pub fn resolve(args: &ArgsConfigSource, env: &EnvConfigSource) -> Result<Self, ConfigError> {
        let file = args
            .config_value(CONFIG_FILE_KEY)
            .or_else(|| env.config_value(CONFIG_FILE_KEY))
            .map(IniConfigSource::load)
            .transpose()?;
        let mut config = Self::default();
        if let Some(file) = &file {
            config.merge(file)?;
        }
        config.merge(env)?;
        config.merge(args)?;
        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

/// IP literal, OS interface name (`lo`, `eth0`) or host name, tried in
/// that order. An empty value clears the restriction.
fn resolve_interface(raw: &str) -> Result<Option<IpAddr>, ConfigError> {
    let name = raw.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(Some(ip));
    }
    if let Some(ip) = interface_address(name) {
        return Ok(Some(ip));
    }
    (name, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| Some(addr.ip()))
        .ok_or_else(|| ConfigError::UnresolvableInterface(name.to_owned()))
}

/// First address of the host interface called `name`, preferring IPv4.
fn interface_address(name: &str) -> Option<IpAddr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            debug!("ServerConfig: cannot list network interfaces: {err}");
            return None;
        }
    };
    let mut addrs: Vec<IpAddr> = interfaces
        .iter()
        .filter(|iface| iface.name == name)
        .map(|iface| iface.ip())
        .collect();
    addrs.sort_by_key(|ip| !ip.is_ipv4());
    addrs.into_iter().next()
}
