//! Environment-based service configuration, parsed once at startup.

use http::Uri;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Logical name of this link, used as the request span name.
const CHAIN_SERVICE_NAME: &str = "CHAIN_SERVICE_NAME";
const CHAIN_SERVICE_NAME_DEFAULT: &str = "rust-chain";
/// Socket address the server binds.
const CHAIN_LISTEN_ADDR: &str = "CHAIN_LISTEN_ADDR";
/// Path the chain handler is mounted on.
const CHAIN_ROUTE: &str = "CHAIN_ROUTE";
const CHAIN_ROUTE_DEFAULT: &str = "/rust-chain";
/// Absolute URL of the next link's entry route; unset makes this link the
/// terminal one.
const CHAIN_NEXT_HOP: &str = "CHAIN_NEXT_HOP";
/// Synthetic local-work delay in milliseconds; zero disables the work span.
const CHAIN_WORK_DELAY_MS: &str = "CHAIN_WORK_DELAY_MS";
const CHAIN_WORK_DELAY_MS_DEFAULT: u64 = 0;
/// Per-request timeout for the downstream hop in milliseconds; unset means
/// the hop waits as long as the transport does.
const CHAIN_DOWNSTREAM_TIMEOUT_MS: &str = "CHAIN_DOWNSTREAM_TIMEOUT_MS";

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "unparseable value, ignoring");
            None
        }
    }
}

fn next_hop_from_env() -> Option<Uri> {
    let uri: Uri = env_opt(CHAIN_NEXT_HOP)?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        warn!(var = CHAIN_NEXT_HOP, uri = %uri, "next hop must be an absolute URL, ignoring");
        return None;
    }
    Some(uri)
}

/// Configuration of one chain link.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Service name reported on every request span.
    pub service_name: String,
    /// Address the hyper server listens on.
    pub listen_addr: SocketAddr,
    /// Request path served by the chain handler.
    pub route: String,
    /// Entry URL of the next link, if any.
    pub next_hop: Option<Uri>,
    /// Simulated local-work duration; zero skips the work span.
    pub work_delay: Duration,
    /// Timeout applied to the downstream call, if any.
    pub downstream_timeout: Option<Duration>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            service_name: CHAIN_SERVICE_NAME_DEFAULT.to_string(),
            listen_addr: default_listen_addr(),
            route: CHAIN_ROUTE_DEFAULT.to_string(),
            next_hop: None,
            work_delay: Duration::from_millis(CHAIN_WORK_DELAY_MS_DEFAULT),
            downstream_timeout: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 43000))
}

impl ChainConfig {
    /// Reads the configuration from `CHAIN_*` environment variables,
    /// falling back to defaults (with a warning) for unparseable values.
    pub fn from_env() -> Self {
        ChainConfig {
            service_name: env::var(CHAIN_SERVICE_NAME)
                .unwrap_or_else(|_| CHAIN_SERVICE_NAME_DEFAULT.to_string()),
            listen_addr: env_or(CHAIN_LISTEN_ADDR, default_listen_addr()),
            route: env::var(CHAIN_ROUTE).unwrap_or_else(|_| CHAIN_ROUTE_DEFAULT.to_string()),
            next_hop: next_hop_from_env(),
            work_delay: Duration::from_millis(env_or(
                CHAIN_WORK_DELAY_MS,
                CHAIN_WORK_DELAY_MS_DEFAULT,
            )),
            downstream_timeout: env_opt::<u64>(CHAIN_DOWNSTREAM_TIMEOUT_MS)
                .map(Duration::from_millis),
        }
    }
}
