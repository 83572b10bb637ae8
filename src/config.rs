// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup into
//! [`RelayerConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LEDGER_MODE` | `rpc` (EVM node) or `local` (in-process ledger) | `rpc` |
//! | `RPC_URL` | JSON-RPC endpoint of the ledger | Sepolia public RPC |
//! | `RELAYER_PRIVATE_KEY` | Hex secp256k1 key paying relay fees | Required for `rpc` (or PEM) |
//! | `RELAYER_KEY_PEM` | Path to a PEM file holding the relayer key | Optional |
//! | `PROXY_ARTIFACT_PATH` | Foundry artifact of `UserProxy` | [`DEFAULT_PROXY_ARTIFACT_PATH`] |
//! | `DATA_DIR` | Directory of the relay database | `./data` |
//! | `FINALITY_TIMEOUT_SECS` | Wait before reporting `pending` | `120` |
//! | `RECEIPT_POLL_INTERVAL_MS` | Receipt polling cadence | `1000` |
//! | `CONFIRMATIONS` | Blocks required for finality | `1` |
//! | `NONCE_CACHE_CAPACITY` | Proxy nonce LRU size | `1024` |
//! | `NONCE_CACHE_TTL_SECS` | Proxy nonce LRU TTL | `15` |
//! | `PENDING_POLL_INTERVAL_SECS` | Pending relay poller interval | `15` |
//! | `TLS_CERT_PATH` | PEM certificate chain; enables HTTPS with `TLS_KEY_PATH` | Optional |
//! | `TLS_KEY_PATH` | PEM private key for HTTPS | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::SEPOLIA;
use crate::relay::FinalityPolicy;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LEDGER_MODE_ENV: &str = "LEDGER_MODE";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const RELAYER_PRIVATE_KEY_ENV: &str = "RELAYER_PRIVATE_KEY";
pub const RELAYER_KEY_PEM_ENV: &str = "RELAYER_KEY_PEM";
pub const PROXY_ARTIFACT_PATH_ENV: &str = "PROXY_ARTIFACT_PATH";

/// Environment variable name for the relay database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const FINALITY_TIMEOUT_SECS_ENV: &str = "FINALITY_TIMEOUT_SECS";
pub const RECEIPT_POLL_INTERVAL_MS_ENV: &str = "RECEIPT_POLL_INTERVAL_MS";
pub const CONFIRMATIONS_ENV: &str = "CONFIRMATIONS";
pub const NONCE_CACHE_CAPACITY_ENV: &str = "NONCE_CACHE_CAPACITY";
pub const NONCE_CACHE_TTL_SECS_ENV: &str = "NONCE_CACHE_TTL_SECS";
pub const PENDING_POLL_INTERVAL_SECS_ENV: &str = "PENDING_POLL_INTERVAL_SECS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_PROXY_ARTIFACT_PATH: &str = "contracts/out/UserProxy.sol/UserProxy.json";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required{context}")]
    Missing { var: &'static str, context: &'static str },

    #[error("Invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which ledger backend the relayer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// An EVM node over JSON-RPC.
    Rpc,
    /// The in-process ledger with the demo faucet token.
    Local,
}

impl FromStr for LedgerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(LedgerMode::Rpc),
            "local" => Ok(LedgerMode::Local),
            _ => Err("expected `rpc` or `local`".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err("expected `json` or `pretty`".to_string()),
        }
    }
}

/// Source of the fee-paying key.
#[derive(Clone, PartialEq, Eq)]
pub enum RelayerKey {
    Hex(String),
    PemFile(PathBuf),
}

impl std::fmt::Debug for RelayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayerKey::Hex(_) => f.write_str("Hex(<redacted>)"),
            RelayerKey::PemFile(path) => f.debug_tuple("PemFile").field(path).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerConfig {
    pub host: String,
    pub port: u16,
    pub ledger_mode: LedgerMode,
    pub rpc_url: String,
    /// `None` only in local mode, where an ephemeral key is generated.
    pub relayer_key: Option<RelayerKey>,
    pub proxy_artifact_path: PathBuf,
    pub data_dir: PathBuf,
    pub finality: FinalityPolicy,
    pub nonce_cache_capacity: usize,
    pub nonce_cache_ttl: Duration,
    pub pending_poll_interval: Duration,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl RelayerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let ledger_mode = parse_or(&get, LEDGER_MODE_ENV, LedgerMode::Rpc)?;

        let relayer_key = match (get(RELAYER_PRIVATE_KEY_ENV), get(RELAYER_KEY_PEM_ENV)) {
            (Some(hex), _) => Some(RelayerKey::Hex(hex)),
            (None, Some(path)) => Some(RelayerKey::PemFile(PathBuf::from(path))),
            (None, None) if ledger_mode == LedgerMode::Rpc => {
                return Err(ConfigError::Missing {
                    var: RELAYER_PRIVATE_KEY_ENV,
                    context: " (or RELAYER_KEY_PEM) when LEDGER_MODE=rpc",
                });
            }
            (None, None) => None,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    var: TLS_KEY_PATH_ENV,
                    context: " when TLS_CERT_PATH is set",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    var: TLS_CERT_PATH_ENV,
                    context: " when TLS_KEY_PATH is set",
                })
            }
        };

        let confirmations: u64 = parse_or(&get, CONFIRMATIONS_ENV, 1)?;
        if confirmations == 0 {
            return Err(ConfigError::Invalid {
                var: CONFIRMATIONS_ENV,
                value: "0".to_string(),
                reason: "at least one confirmation is required".to_string(),
            });
        }

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, PORT_ENV, 8080)?,
            ledger_mode,
            rpc_url: get(RPC_URL_ENV).unwrap_or_else(|| SEPOLIA.rpc_url.to_string()),
            relayer_key,
            proxy_artifact_path: get(PROXY_ARTIFACT_PATH_ENV)
                .unwrap_or_else(|| DEFAULT_PROXY_ARTIFACT_PATH.to_string())
                .into(),
            data_dir: get(DATA_DIR_ENV).unwrap_or_else(|| "./data".to_string()).into(),
            finality: FinalityPolicy {
                timeout: Duration::from_secs(parse_or(&get, FINALITY_TIMEOUT_SECS_ENV, 120)?),
                poll_interval: Duration::from_millis(parse_or(
                    &get,
                    RECEIPT_POLL_INTERVAL_MS_ENV,
                    1000,
                )?),
                confirmations,
            },
            nonce_cache_capacity: parse_or(&get, NONCE_CACHE_CAPACITY_ENV, 1024)?,
            nonce_cache_ttl: Duration::from_secs(parse_or(&get, NONCE_CACHE_TTL_SECS_ENV, 15)?),
            pending_poll_interval: Duration::from_secs(parse_or(
                &get,
                PENDING_POLL_INTERVAL_SECS_ENV,
                15,
            )?),
            tls,
            log_format: parse_or(&get, LOG_FORMAT_ENV, LogFormat::default())?,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: HOST_ENV,
                value: self.host.clone(),
                reason: e.to_string(),
            })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
