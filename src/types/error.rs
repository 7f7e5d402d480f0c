use thiserror::Error;

/// Errors that can occur in the realtime connection manager and the HTTP status poller.
///
/// None of these cross the public API as panics: connection failures are reported to
/// Connection callbacks, malformed messages are logged and dropped, and HTTP failures
/// are returned to the caller of the failing request.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered the socket connect with a refusal (connect error packet).
    /// Retrying with the same identity will not help.
    #[error("Connection refused by server: {0}")]
    ConnectionRefused(String),

    /// The transport dropped or refused a frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// No vehicle identity is available to authenticate the connection
    #[error("Authentication error: no vehicle identity configured")]
    AuthMissing,

    /// Configured server address cannot be turned into `scheme://host[:port]`
    #[error("Invalid server URL: '{0}'")]
    InvalidServerUrl(String),

    /// Options rejected when building a manager or poller
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Inbound payload did not match the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network failure on the HTTP fallback path
    #[error("Status request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status on the fallback path
    #[error("Status request failed with HTTP {0}")]
    HttpStatus(u16),

    /// Session expired or missing on the fallback path
    #[error("Status request failed: session unauthorized")]
    Unauthorized,

    /// Login endpoint answered but refused the credentials
    #[error("Login failed: {0}")]
    LoginRejected(String),

    /// Server answered `success: false` or omitted the data block
    #[error("Status request failed: {0}")]
    Api(String),

    /// Operation timed out (transport connect)
    #[error("Timeout error")]
    Timeout,

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,

    /// Automatic reconnection gave up; `force_reconnect` is required to resume
    #[error("Reconnect budget exhausted after {attempts} attempts")]
    BudgetExhausted { attempts: u32 },
}

impl RealtimeError {
    /// Whether the server explicitly rejected the connection, as opposed to the
    /// network failing.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// Whether the error came from the HTTP fallback path rather than the live transport.
    pub fn is_http(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::HttpStatus(_)
                | Self::Unauthorized
                | Self::LoginRejected(_)
                | Self::Api(_)
        )
    }
}

/// Convenience type alias for `Result<T, RealtimeError>`.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_errors_are_distinguishable() {
        assert!(RealtimeError::HttpStatus(500).is_http());
        assert!(RealtimeError::Unauthorized.is_http());
        assert!(RealtimeError::LoginRejected("bad".into()).is_http());
        assert!(!RealtimeError::Timeout.is_http());
        assert!(!RealtimeError::AuthMissing.is_http());
        assert!(!RealtimeError::Connection("refused".into()).is_http());
        assert!(!RealtimeError::ConnectionRefused("unknown vehicle".into()).is_http());
        assert!(!RealtimeError::Transport("poll failed".into()).is_http());
    }

    #[test]
    fn test_messages_name_the_failing_path() {
        assert_eq!(
            RealtimeError::HttpStatus(503).to_string(),
            "Status request failed with HTTP 503"
        );
        assert_eq!(
            RealtimeError::BudgetExhausted { attempts: 10 }.to_string(),
            "Reconnect budget exhausted after 10 attempts"
        );
    }
}
