//! Gateway configuration
//!
//! Every setting comes from a `KOPI_*` environment variable with a default
//! that matches the local development network:
//!
//! | Variable | Default |
//! |---|---|
//! | `KOPI_PORT` | `3001` |
//! | `KOPI_LOG_LEVEL` | `info` |
//! | `KOPI_WALLET_PATH` | `./wallet` |
//! | `KOPI_PROFILES_DIR` | `fablo-target/fabric-config/connection-profiles` |
//! | `KOPI_CHANNEL` | `mychannel` |
//! | `KOPI_CHAINCODE` | `kopi` |
//! | `KOPI_LISTENER_IDENTITY` | `PetaniUser` |
//! | `KOPI_SETTLEMENT_DELAY_MS` | `2000` |
//! | `KOPI_ENROLL_RESET` | `true` |
//! | `KOPI_DESCRIPTOR_TTL_SECS` | `300` |
//! | `KOPI_COMMIT_TIMEOUT_SECS` | `60` |

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_PROFILES_DIR: &str = "fablo-target/fabric-config/connection-profiles";
pub const DEFAULT_CHANNEL: &str = "mychannel";
pub const DEFAULT_CHAINCODE: &str = "kopi";
pub const DEFAULT_LISTENER_IDENTITY: &str = "PetaniUser";
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_DESCRIPTOR_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration shared by the gateway and the enrollment tool
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub log_level: Level,
    pub wallet_path: PathBuf,
    pub profiles_dir: PathBuf,
    pub channel: String,
    pub chaincode: String,
    /// Identity the contract event listener subscribes as
    pub listener_identity: String,
    /// Simulated latency of the external banking system
    pub settlement_delay: Duration,
    /// Wipe the wallet before provisioning
    pub reset_wallet_on_enroll: bool,
    /// How long a parsed connection descriptor is reused
    pub descriptor_ttl: Duration,
    /// How long a submitted transaction may take to commit
    pub commit_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: Level::INFO,
            wallet_path: PathBuf::from("./wallet"),
            profiles_dir: PathBuf::from(DEFAULT_PROFILES_DIR),
            channel: DEFAULT_CHANNEL.into(),
            chaincode: DEFAULT_CHAINCODE.into(),
            listener_identity: DEFAULT_LISTENER_IDENTITY.into(),
            settlement_delay: DEFAULT_SETTLEMENT_DELAY,
            reset_wallet_on_enroll: true,
            descriptor_ttl: DEFAULT_DESCRIPTOR_TTL,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("KOPI_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "KOPI_PORT",
                expected: "a valid port number",
                value,
            })?,
            None => defaults.port,
        };

        // Unparseable levels fall back to info rather than failing startup
        let log_level = lookup("KOPI_LOG_LEVEL")
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.log_level);

        let settlement_delay = match lookup("KOPI_SETTLEMENT_DELAY_MS") {
            Some(value) => value
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    var: "KOPI_SETTLEMENT_DELAY_MS",
                    expected: "a number of milliseconds",
                    value,
                })?,
            None => defaults.settlement_delay,
        };

        let reset_wallet_on_enroll = match lookup("KOPI_ENROLL_RESET") {
            Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
                var: "KOPI_ENROLL_RESET",
                expected: "true or false",
                value,
            })?,
            None => defaults.reset_wallet_on_enroll,
        };

        let descriptor_ttl = match lookup("KOPI_DESCRIPTOR_TTL_SECS") {
            Some(value) => parse_secs("KOPI_DESCRIPTOR_TTL_SECS", value)?,
            None => defaults.descriptor_ttl,
        };
        let commit_timeout = match lookup("KOPI_COMMIT_TIMEOUT_SECS") {
            Some(value) => parse_secs("KOPI_COMMIT_TIMEOUT_SECS", value)?,
            None => defaults.commit_timeout,
        };

        Ok(Self {
            port,
            log_level,
            wallet_path: lookup("KOPI_WALLET_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.wallet_path),
            profiles_dir: lookup("KOPI_PROFILES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.profiles_dir),
            channel: lookup("KOPI_CHANNEL").unwrap_or(defaults.channel),
            chaincode: lookup("KOPI_CHAINCODE").unwrap_or(defaults.chaincode),
            listener_identity: lookup("KOPI_LISTENER_IDENTITY")
                .unwrap_or(defaults.listener_identity),
            settlement_delay,
            reset_wallet_on_enroll,
            descriptor_ttl,
            commit_timeout,
        })
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.parse() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(ConfigError::Invalid {
            var,
            expected: "a number of seconds",
            value,
        }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
