//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. Every variable has a
//! default; malformed values are rejected at startup rather than silently
//! replaced.

use crate::media::{ListenIp, WebRtcTransportOptions, DEFAULT_VIDEO_START_BITRATE};

use common::config::{LogFormat, ObservabilityConfig};
use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Default signaling (WebSocket) bind address.
pub const DEFAULT_SIGNALING_BIND_ADDRESS: &str = "0.0.0.0:3016";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default media listen IP.
pub const DEFAULT_LISTEN_IP: &str = "0.0.0.0";

/// Default per-peer notification queue capacity.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

/// Default RC instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Room Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signaling WebSocket server bind address (default: "0.0.0.0:3016").
    pub signaling_bind_address: SocketAddr,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: SocketAddr,

    /// Unique identifier for this RC instance.
    pub rc_id: String,

    /// IP the media engine binds transports to.
    pub listen_ip: IpAddr,

    /// Public IP announced in ICE candidates (behind NAT).
    pub announced_ip: Option<IpAddr>,

    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,

    /// `x-google-start-bitrate` hint for the video codec (default: 1000).
    pub video_start_bitrate: u32,

    /// Capacity of each peer's notification queue (default: 256).
    pub notification_buffer: usize,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let signaling_bind_address = parse_or(
            vars,
            "RC_SIGNALING_BIND_ADDRESS",
            DEFAULT_SIGNALING_BIND_ADDRESS,
        )?;

        let health_bind_address =
            parse_or(vars, "RC_HEALTH_BIND_ADDRESS", DEFAULT_HEALTH_BIND_ADDRESS)?;

        let listen_ip = parse_or(vars, "RC_LISTEN_IP", DEFAULT_LISTEN_IP)?;

        let announced_ip = match vars.get("RC_ANNOUNCED_IP").map(|s| s.trim()) {
            Some(value) if !value.is_empty() => Some(value.parse::<IpAddr>().map_err(|e| {
                ConfigError::InvalidValue(format!("RC_ANNOUNCED_IP={value}: {e}"))
            })?),
            _ => None,
        };

        let enable_udp = parse_bool(vars, "RC_ENABLE_UDP", true)?;
        let enable_tcp = parse_bool(vars, "RC_ENABLE_TCP", true)?;
        let prefer_udp = parse_bool(vars, "RC_PREFER_UDP", true)?;

        if !enable_udp && !enable_tcp {
            return Err(ConfigError::InvalidValue(
                "RC_ENABLE_UDP and RC_ENABLE_TCP cannot both be false".to_string(),
            ));
        }

        let video_start_bitrate = parse_or(
            vars,
            "RC_VIDEO_START_BITRATE",
            &DEFAULT_VIDEO_START_BITRATE.to_string(),
        )?;

        let notification_buffer: usize = parse_or(
            vars,
            "RC_NOTIFICATION_BUFFER",
            &DEFAULT_NOTIFICATION_BUFFER.to_string(),
        )?;
        if notification_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "RC_NOTIFICATION_BUFFER must be greater than zero".to_string(),
            ));
        }

        let log_format = match vars.get("RC_LOG_FORMAT") {
            Some(value) => LogFormat::parse(value).ok_or_else(|| {
                ConfigError::InvalidValue(format!("RC_LOG_FORMAT={value}: expected text or json"))
            })?,
            None => LogFormat::default(),
        };

        // Generate RC instance ID
        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            signaling_bind_address,
            health_bind_address,
            rc_id,
            listen_ip,
            announced_ip,
            enable_udp,
            enable_tcp,
            prefer_udp,
            video_start_bitrate,
            notification_buffer,
            observability: ObservabilityConfig {
                log_format,
                ..ObservabilityConfig::default()
            },
        })
    }

    /// Transport options handed to the media engine for every transport.
    #[must_use]
    pub fn transport_options(&self) -> WebRtcTransportOptions {
        WebRtcTransportOptions {
            listen_ips: vec![ListenIp {
                ip: self.listen_ip,
                announced_ip: self.announced_ip,
            }],
            enable_udp: self.enable_udp,
            enable_tcp: self.enable_tcp,
            prefer_udp: self.prefer_udp,
        }
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = vars.get(key).map_or(default, String::as_str);
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{key}={raw}: {e}")))
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(value) => match value.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key}={value}: expected a boolean"
            ))),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = HashMap::new();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(
            config.signaling_bind_address,
            DEFAULT_SIGNALING_BIND_ADDRESS.parse().unwrap()
        );
        assert_eq!(
            config.health_bind_address,
            DEFAULT_HEALTH_BIND_ADDRESS.parse().unwrap()
        );
        assert_eq!(config.listen_ip, DEFAULT_LISTEN_IP.parse::<IpAddr>().unwrap());
        assert_eq!(config.announced_ip, None);
        assert!(config.enable_udp);
        assert!(config.enable_tcp);
        assert!(config.prefer_udp);
        assert_eq!(config.video_start_bitrate, DEFAULT_VIDEO_START_BITRATE);
        assert_eq!(config.notification_buffer, DEFAULT_NOTIFICATION_BUFFER);
        assert_eq!(config.observability.log_format, LogFormat::Text);
        // RC ID should be auto-generated
        assert!(config.rc_id.starts_with("rc-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "RC_SIGNALING_BIND_ADDRESS".to_string(),
                "127.0.0.1:4000".to_string(),
            ),
            (
                "RC_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:8082".to_string(),
            ),
            ("RC_ID".to_string(), "rc-custom-001".to_string()),
            ("RC_LISTEN_IP".to_string(), "10.0.0.5".to_string()),
            ("RC_ANNOUNCED_IP".to_string(), "203.0.113.9".to_string()),
            ("RC_ENABLE_TCP".to_string(), "false".to_string()),
            ("RC_PREFER_UDP".to_string(), "0".to_string()),
            ("RC_VIDEO_START_BITRATE".to_string(), "600".to_string()),
            ("RC_NOTIFICATION_BUFFER".to_string(), "32".to_string()),
            ("RC_LOG_FORMAT".to_string(), "json".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.signaling_bind_address.port(), 4000);
        assert_eq!(config.health_bind_address.port(), 8082);
        assert_eq!(config.rc_id, "rc-custom-001");
        assert_eq!(config.listen_ip.to_string(), "10.0.0.5");
        assert_eq!(config.announced_ip.unwrap().to_string(), "203.0.113.9");
        assert!(config.enable_udp);
        assert!(!config.enable_tcp);
        assert!(!config.prefer_udp);
        assert_eq!(config.video_start_bitrate, 600);
        assert_eq!(config.notification_buffer, 32);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_bind_address_rejected() {
        let vars = HashMap::from([(
            "RC_SIGNALING_BIND_ADDRESS".to_string(),
            "not-an-address".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("RC_SIGNALING_BIND_ADDRESS"))
        );
    }

    #[test]
    fn test_invalid_ip_rejected() {
        let vars = HashMap::from([("RC_ANNOUNCED_IP".to_string(), "300.1.1.1".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let vars = HashMap::from([("RC_LISTEN_IP".to_string(), "localhost".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let vars = HashMap::from([("RC_ENABLE_UDP".to_string(), "maybe".to_string())]);
        assert!(
            matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(msg)) if msg.contains("RC_ENABLE_UDP"))
        );
    }

    #[test]
    fn test_udp_and_tcp_cannot_both_be_disabled() {
        let vars = HashMap::from([
            ("RC_ENABLE_UDP".to_string(), "false".to_string()),
            ("RC_ENABLE_TCP".to_string(), "false".to_string()),
        ]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_notification_buffer_rejected() {
        let vars = HashMap::from([("RC_NOTIFICATION_BUFFER".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_empty_announced_ip_means_unset() {
        let vars = HashMap::from([("RC_ANNOUNCED_IP".to_string(), "  ".to_string())]);
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.announced_ip, None);
    }

    #[test]
    fn test_transport_options_from_config() {
        let vars = HashMap::from([
            ("RC_LISTEN_IP".to_string(), "10.0.0.5".to_string()),
            ("RC_ANNOUNCED_IP".to_string(), "203.0.113.9".to_string()),
            ("RC_ENABLE_TCP".to_string(), "no".to_string()),
        ]);
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let options = config.transport_options();
        assert_eq!(options.listen_ips.len(), 1);
        assert_eq!(options.listen_ips[0].ip.to_string(), "10.0.0.5");
        assert_eq!(
            options.listen_ips[0].announced_ip.map(|ip| ip.to_string()),
            Some("203.0.113.9".to_string())
        );
        assert!(options.enable_udp);
        assert!(!options.enable_tcp);
    }
}
