use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/ws";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Broker endpoint, `http(s)://` or `ws(s)://`.
    pub endpoint: String,
    /// Endpoint is registered with SockJS; talk to its raw `/websocket` transport.
    pub sockjs: bool,
    pub topic: String,
    /// Destination for JOIN/LEAVE announcements.
    pub join_destination: String,
    /// Destination for chat messages.
    pub send_destination: String,
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for the broker's DISCONNECT receipt.
    pub leave_timeout_ms: u64,
    /// Offered heart-beat interval in both directions; 0 disables.
    pub heartbeat_ms: u64,
    pub clear_history_on_disconnect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            sockjs: true,
            topic: "/topic/public".to_string(),
            join_destination: "/app/chat.addUser".to_string(),
            send_destination: "/app/chat.sendMessage".to_string(),
            connect_timeout_ms: 10_000,
            leave_timeout_ms: 2_000,
            heartbeat_ms: 10_000,
            clear_history_on_disconnect: false,
        }
    }
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }

    /// WebSocket URL derived from `endpoint`.
    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.endpoint).map_err(|err| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: err.to_string(),
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;

        if self.sockjs {
            let path = format!("{}/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "missing host".to_string(),
            });
        }
        Ok(url)
    }
}

/// Read the config file at `path`.
///
/// A missing file yields [`AppConfig::default`] unless `required` is set, in
/// which case it is an error like any other read failure. A file that exists
/// but is not valid config JSON is always an error.
pub fn load_config(path: &Path, required: bool) -> Result<AppConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
            log::info!("No config at {}; using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write `config` as pretty JSON, creating missing parent directories.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(config)?)
    };
    write().map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockjs_endpoint_maps_to_raw_websocket() {
        let config = AppConfig::default();
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://localhost:8080/ws/websocket"
        );

        let config = AppConfig {
            endpoint: "https://chat.example.com/ws/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://chat.example.com/ws/websocket"
        );
    }

    #[test]
    fn plain_websocket_endpoint_is_kept() {
        let config = AppConfig {
            endpoint: "ws://127.0.0.1:9000/stomp".to_string(),
            sockjs: false,
            ..AppConfig::default()
        };
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "ws://127.0.0.1:9000/stomp"
        );
    }

    #[test]
    fn bad_endpoints_are_rejected() {
        let config = AppConfig {
            endpoint: "not a url".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.websocket_url(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = AppConfig {
            endpoint: "ftp://localhost/ws".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.websocket_url(),
            Err(ConfigError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[test]
    fn partial_file_falls_back_to_defaults_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        fs::write(&path, r#"{ "endpoint": "http://broker:8080/ws", "heartbeat_ms": 0 }"#)
            .unwrap();

        let config = load_config(&path, true).unwrap();
        assert_eq!(config.endpoint, "http://broker:8080/ws");
        assert_eq!(config.heartbeat_ms, 0);
        assert_eq!(config.topic, "/topic/public");
        assert!(config.sockjs);
    }

    #[test]
    fn missing_file_is_only_fine_when_optional() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");

        assert_eq!(load_config(&missing, false).unwrap(), AppConfig::default());
        assert!(matches!(
            load_config(&missing, true),
            Err(ConfigError::Read { path, .. }) if path == missing
        ));
    }

    #[test]
    fn broken_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ nope").unwrap();

        for required in [false, true] {
            let err = load_config(&broken, required).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
            assert!(err.to_string().contains("broken.json"));
        }
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chat.json");
        let config = AppConfig {
            clear_history_on_disconnect: true,
            ..AppConfig::default()
        };

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path, true).unwrap(), config);
    }
}
