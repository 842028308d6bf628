//! Bridge configuration.
//!
//! Loaded once at startup from the gateway-bridge TOML file and immutable
//! afterwards. Every failure here is fatal for the process.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DOWNLINK_QUEUE_SIZE_DEFAULT, ETH_NAME_DEFAULT, LOG_LEVEL_DEFAULT, RECONNECT_MAX_DEFAULT,
    RECONNECT_MAX_LIMIT,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported backend type `{0}`, only semtech_udp is driven by this bridge")]
    UnsupportedBackend(String),

    #[error("unsupported mqtt auth type `{0}`, only generic is supported")]
    UnsupportedAuth(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub backend: BackendConfig,
    pub integration: IntegrationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: u32,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Network interface the gateway identity is derived from.
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_log_level() -> u32 {
    LOG_LEVEL_DEFAULT
}

fn default_interface() -> String {
    ETH_NAME_DEFAULT.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            interface: default_interface(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    SemtechUdp,
    BasicStation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    pub semtech_udp: SemtechUdpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemtechUdpConfig {
    pub udp_bind: String,
    pub skip_crc_check: bool,
    pub fake_rx_time: bool,
    #[serde(default = "default_queue_size")]
    pub downlink_queue_size: usize,
}

fn default_queue_size() -> usize {
    DOWNLINK_QUEUE_SIZE_DEFAULT
}

impl SemtechUdpConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.udp_bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("udp_bind `{}` is not host:port", self.udp_bind)))
    }
}

/// Shape of the events published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Renamed and restructured event schema for network servers.
    #[default]
    #[serde(alias = "json")]
    Enriched,
    /// The forwarder's own JSON, re-serialized verbatim.
    Passthrough,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub marshaler: OutputFormat,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub event_topic_template: String,
    pub command_topic_template: String,
    #[serde(default)]
    pub max_reconnect_interval: Option<String>,
    pub auth: MqttAuthConfig,
}

impl MqttConfig {
    pub fn max_reconnect_interval(&self) -> Result<Duration, ConfigError> {
        match &self.max_reconnect_interval {
            Some(text) => {
                let interval = parse_duration(text)?;
                if interval > RECONNECT_MAX_LIMIT {
                    return Err(ConfigError::Invalid(format!(
                        "max_reconnect_interval `{text}` exceeds {}h",
                        RECONNECT_MAX_LIMIT.as_secs() / 3600
                    )));
                }
                Ok(interval)
            }
            None => Ok(RECONNECT_MAX_DEFAULT),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttAuthConfig {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub generic: GenericAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenericAuthConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    pub qos: u8,
    pub clean_session: bool,
    pub client_id: String,
    pub ca_cert: String,
    pub tls_cert: String,
    pub tls_key: String,
    #[serde(default)]
    pub tls_pass_phrase: Option<String>,
}

impl GenericAuthConfig {
    pub fn broker(&self) -> Result<BrokerAddress, ConfigError> {
        BrokerAddress::parse(&self.server)
    }

    /// Credentials are only applied when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// TLS is only applied when CA, certificate and key are all configured.
    pub fn tls(&self) -> Option<TlsFiles<'_>> {
        if self.ca_cert.is_empty() || self.tls_cert.is_empty() || self.tls_key.is_empty() {
            return None;
        }
        Some(TlsFiles {
            ca_cert: Path::new(&self.ca_cert),
            tls_cert: Path::new(&self.tls_cert),
            tls_key: Path::new(&self.tls_key),
            pass_phrase: self.tls_pass_phrase.as_deref().filter(|p| !p.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsFiles<'a> {
    pub ca_cert: &'a Path,
    pub tls_cert: &'a Path,
    pub tls_key: &'a Path,
    pub pass_phrase: Option<&'a str>,
}

/// Broker endpoint split out of `[scheme://]host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: Option<String>,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn parse(server: &str) -> Result<Self, ConfigError> {
        let (scheme, rest) = match server.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, server),
        };
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::Invalid(format!("mqtt server `{server}` has no port")))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(format!("mqtt server `{server}` has an invalid port")))?;
        if host.is_empty() {
            return Err(ConfigError::Invalid(format!("mqtt server `{server}` has no host")));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// Server URI handed to the MQTT client. An explicit scheme wins.
    pub fn uri(&self, tls: bool) -> String {
        let scheme = match &self.scheme {
            Some(scheme) => scheme.as_str(),
            None if tls => "ssl",
            None => "tcp",
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.backend_type == BackendType::BasicStation {
            return Err(ConfigError::UnsupportedBackend("basic_station".into()));
        }
        self.backend.semtech_udp.bind_addr()?;
        if self.backend.semtech_udp.downlink_queue_size == 0 {
            return Err(ConfigError::Invalid("downlink_queue_size must be at least 1".into()));
        }

        let mqtt = &self.integration.mqtt;
        if mqtt.auth.auth_type != "generic" {
            return Err(ConfigError::UnsupportedAuth(mqtt.auth.auth_type.clone()));
        }
        let generic = &mqtt.auth.generic;
        if generic.qos > 2 {
            return Err(ConfigError::Invalid(format!("qos {} is out of range 0..=2", generic.qos)));
        }
        generic.broker()?;
        mqtt.max_reconnect_interval()?;
        Ok(())
    }

    pub fn mqtt(&self) -> &GenericAuthConfig {
        &self.integration.mqtt.auth.generic
    }
}

/// Parse the bridge's `XhYmZs` duration text (`"1m0s"`, `"30s"`, `"2h"`).
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("`{text}` is not a duration like 1m30s"));
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid());
    }

    let mut seconds = 0u64;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        seconds = value
            .checked_mul(unit)
            .and_then(|v| seconds.checked_add(v))
            .ok_or_else(invalid)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(seconds))
}
