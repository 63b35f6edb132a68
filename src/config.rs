use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use dotenvy::Error as DotenvError;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8710;
const PORT_ENV: &str = "EDGESIDE_PORT";
const FALLBACK_PORT_ENV: &str = "PORT";
const ADDR_ENV: &str = "EDGESIDE_ADDR";

/// Configuration consumed by the runtime before spinning up Axum.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
}

impl RuntimeConfig {
    /// Loads configuration from `EDGESIDE_*` environment variables.
    ///
    /// Values from a local `.env` file (parsed via [`dotenvy::dotenv_override`]) override whatever is already set in
    /// the process environment, which makes local development workflows predictable. `PORT` is honored as a fallback
    /// when `EDGESIDE_PORT` is unset so the runtime slots into generic hosting setups unchanged.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_overrides()?;

        let port = resolve_port();

        let addr = env::var(ADDR_ENV)
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Ok(Self {
            bind_addr: SocketAddr::new(addr, port),
        })
    }

    /// Returns a builder for programmatic overrides.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }
}

impl Default for RuntimeConfig {
    /// Binds to `0.0.0.0:8710`, the port the bundled smoke tooling expects.
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
        }
    }
}

/// Builder type for [`RuntimeConfig`].
#[derive(Default, Clone, Debug)]
pub struct RuntimeConfigBuilder {
    bind_addr: Option<SocketAddr>,
}

impl RuntimeConfigBuilder {
    /// Sets the address for the embedded Axum listener.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self
                .bind_addr
                .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), resolve_port())),
        }
    }
}

/// Errors that can occur while building [`RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load .env overrides: {0}")]
    Dotenv(#[from] DotenvError),
}

fn load_env_overrides() -> Result<(), ConfigError> {
    match dotenvy::dotenv_override() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err)),
    }
}

fn resolve_port() -> u16 {
    env::var(PORT_ENV)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .or_else(|| {
            env::var(FALLBACK_PORT_ENV)
                .ok()
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn builder_overrides_defaults() {
        let _guard = env_lock().lock().unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8)), 9999);
        let config = RuntimeConfig::builder().bind_addr(addr).build();

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn defaults_to_unspecified_addr_and_gallery_port() {
        let _guard = env_lock().lock().unwrap();
        unsafe {
            std::env::remove_var(PORT_ENV);
            std::env::remove_var(FALLBACK_PORT_ENV);
        }

        let config = RuntimeConfig::default();
        assert_eq!(
            config.bind_addr,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8710)
        );
    }

    #[test]
    fn reads_env_configuration() {
        let _guard = env_lock().lock().unwrap();
        unsafe {
            std::env::set_var(PORT_ENV, "9000");
            std::env::set_var(ADDR_ENV, "127.0.0.2");
        }

        let config = RuntimeConfig::from_env().expect("config");
        assert_eq!(
            config.bind_addr,
            SocketAddr::new("127.0.0.2".parse().unwrap(), 9000)
        );

        unsafe {
            std::env::remove_var(PORT_ENV);
            std::env::remove_var(ADDR_ENV);
        }
    }

    #[test]
    fn falls_back_to_generic_port_env() {
        let _guard = env_lock().lock().unwrap();
        unsafe {
            std::env::remove_var(PORT_ENV);
            std::env::remove_var(ADDR_ENV);
            std::env::set_var(FALLBACK_PORT_ENV, "1234");
        }

        let config = RuntimeConfig::from_env().expect("config");
        assert_eq!(
            config.bind_addr,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 1234)
        );

        unsafe {
            std::env::remove_var(FALLBACK_PORT_ENV);
        }
    }

    #[test]
    fn ignores_unparseable_port_values() {
        let _guard = env_lock().lock().unwrap();
        unsafe {
            std::env::set_var(PORT_ENV, "not-a-port");
            std::env::remove_var(FALLBACK_PORT_ENV);
        }

        let config = RuntimeConfig::from_env().expect("config");
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);

        unsafe {
            std::env::remove_var(PORT_ENV);
        }
    }
}
