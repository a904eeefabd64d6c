use serde::{Deserialize, Serialize};

/// Server configuration.
///
/// All values take effect only before [`Server::start`](crate::server::Server::start);
/// changing them afterwards has no effect on a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the listener binds to, e.g. "127.0.0.1:8080".
    pub listen_addr: String,
    /// Number of connection-group reactor threads.
    pub connection_threads: usize,
    /// Number of worker threads processing requests.
    pub pool_threads: usize,
    /// Per-connection read timeout in seconds. 0 means no timeout.
    pub read_timeout_secs: u64,
    /// Per-connection write timeout in seconds. 0 means no timeout.
    pub write_timeout_secs: u64,
    /// Keep a registry of live connections so the server can broadcast
    /// to all of them. Off by default.
    pub store_connections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            connection_threads: 10,
            pool_threads: 25,
            read_timeout_secs: 0,
            write_timeout_secs: 0,
            store_connections: false,
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// Reads a YAML file from the path in `IMPELLER_CONFIG` if set, then
    /// applies the `LISTEN` environment variable on top.
    pub fn load() -> Self {
        let mut config = match std::env::var("IMPELLER_CONFIG") {
            Ok(path) => Config::from_file(&path).unwrap_or_else(|error| {
                tracing::warn!(error = %error, path = %path, "failed to load config file, using defaults");
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        if let Ok(addr) = std::env::var("LISTEN") {
            config.listen_addr = addr;
        }

        config
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
