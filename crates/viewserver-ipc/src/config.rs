use std::env;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Port the view server listens on inside the device.
pub const DEFAULT_SERVER_PORT: u16 = 4939;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;
const DEFAULT_START_RETRY_DELAY_SECS: u64 = 2;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address the forwarded ports are bound to on this machine.
    pub host: IpAddr,
    pub remote_port: u16,
    /// First local port handed out by the forwarding table.
    pub first_local_port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Pause before the second attempt to start the view server.
    pub start_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            remote_port: DEFAULT_SERVER_PORT,
            first_local_port: DEFAULT_SERVER_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            start_retry_delay: Duration::from_secs(DEFAULT_START_RETRY_DELAY_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_parse("VIEWSERVER_HOST").unwrap_or(defaults.host),
            remote_port: env_parse("VIEWSERVER_REMOTE_PORT").unwrap_or(defaults.remote_port),
            first_local_port: env_parse("VIEWSERVER_LOCAL_PORT")
                .unwrap_or(defaults.first_local_port),
            connect_timeout: env_parse("VIEWSERVER_CONNECT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            read_timeout: env_parse("VIEWSERVER_READ_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            start_retry_delay: env_parse("VIEWSERVER_START_RETRY_DELAY")
                .map(Duration::from_secs)
                .unwrap_or(defaults.start_retry_delay),
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    pub fn with_first_local_port(mut self, port: u16) -> Self {
        self.first_local_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_start_retry_delay(mut self, delay: Duration) -> Self {
        self.start_retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.remote_port, 4939);
        assert_eq!(config.first_local_port, 4939);
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.start_retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::default()
            .with_remote_port(5000)
            .with_first_local_port(6000)
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(5))
            .with_start_retry_delay(Duration::ZERO);

        assert_eq!(config.remote_port, 5000);
        assert_eq!(config.first_local_port, 6000);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.start_retry_delay, Duration::ZERO);
    }
}
