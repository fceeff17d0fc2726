use std::fmt;
use std::time::Duration;

use base64::Engine as _;

/// HTTP Basic credentials sent with every request and the WebSocket upgrade.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header: `Basic base64(user:password)`.
    pub fn authorization(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a [`ComfyClient`](crate::ComfyClient) session.
///
/// Use [`ClientConfig::builder()`] for ergonomic construction, or
/// [`ClientConfig::new()`] when only the address and client id matter.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address without scheme, e.g. `127.0.0.1:8188` or `host/comfy`.
    pub server_address: String,

    /// Identifier attached to every request and the WebSocket URL.
    pub client_id: String,

    /// Use `https`/`wss` instead of `http`/`ws`.
    pub secure: bool,

    /// Optional Basic authentication.
    pub credentials: Option<Credentials>,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// How long to wait for the server's close reply when disconnecting.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:8188".to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            secure: false,
            credentials: None,
            request_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Config for the given server and client id, defaults elsewhere.
    ///
    /// An `http://` or `https://` prefix on the address is stripped and
    /// decides the transport security flag.
    pub fn new(server_address: impl Into<String>, client_id: impl Into<String>) -> Self {
        let mut config = Self::default().with_address(server_address.into());
        config.client_id = client_id.into();
        config
    }

    /// Start building a config with the builder pattern.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// `http` or `https`.
    pub fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// `ws` or `wss`.
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// `Authorization` header value when credentials are configured.
    pub fn authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(Credentials::authorization)
    }

    fn with_address(mut self, address: String) -> Self {
        let (secure, host) = split_scheme(&address);
        if let Some(secure) = secure {
            self.secure = secure;
        }
        self.server_address = host.trim_end_matches('/').to_string();
        self
    }
}

fn split_scheme(address: &str) -> (Option<bool>, &str) {
    if let Some(rest) = address.strip_prefix("https://") {
        (Some(true), rest)
    } else if let Some(rest) = address.strip_prefix("http://") {
        (Some(false), rest)
    } else {
        (None, address)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server address. A scheme prefix sets the security flag.
    pub fn with_server_address(mut self, address: impl Into<String>) -> Self {
        self.config = self.config.with_address(address.into());
        self
    }

    /// Set the client id used for WebSocket filtering and prompt association.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    /// Use TLS for both HTTP and WebSocket traffic.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// Attach HTTP Basic credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set how long a disconnect waits for the close handshake.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_address, "127.0.0.1:8188");
        assert!(!config.secure);
        assert!(config.credentials.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(uuid::Uuid::parse_str(&config.client_id).is_ok());
    }

    #[test]
    fn test_default_client_ids_differ() {
        assert_ne!(ClientConfig::default().client_id, ClientConfig::default().client_id);
    }

    #[test]
    fn test_scheme_prefix_is_stripped() {
        let config = ClientConfig::new("https://comfy.example.com/", "me");
        assert_eq!(config.server_address, "comfy.example.com");
        assert!(config.secure);
        assert_eq!(config.http_scheme(), "https");
        assert_eq!(config.ws_scheme(), "wss");

        let config = ClientConfig::new("http://localhost:8188///", "me");
        assert_eq!(config.server_address, "localhost:8188");
        assert!(!config.secure);
        assert_eq!(config.ws_scheme(), "ws");
    }

    #[test]
    fn test_bare_address_keeps_security_flag() {
        let config = ClientConfig::builder()
            .with_secure(true)
            .with_server_address("10.0.0.2:8188")
            .build();
        assert!(config.secure);
        assert_eq!(config.server_address, "10.0.0.2:8188");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .with_server_address("host:1234")
            .with_client_id("my-app")
            .with_credentials(Credentials::new("user", "pass"))
            .with_request_timeout(Duration::from_secs(3))
            .with_close_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(config.client_id, "my-app");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.close_timeout, Duration::from_millis(250));
        assert_eq!(config.authorization().as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let shown = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }
}
