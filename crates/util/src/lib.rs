pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, CompletionConfig, ConfigError, Environment, LineConfig};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the address the HTTP server should bind to.
///
/// The value is resolved from the `APP_BIND_ADDR` environment variable. When
/// it is not set but `PORT` is (as on most container platforms), the server
/// listens on all interfaces at that port. Otherwise [`DEFAULT_BIND_ADDR`]
/// is used.
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    let value = env::var("APP_BIND_ADDR")
        .or_else(|_| env::var("PORT").map(|port| format!("0.0.0.0:{}", port.trim())))
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    value.parse()
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
