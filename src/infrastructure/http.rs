use crate::types::{RealtimeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// Login used to bootstrap the HTTP session.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub role: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role: "admin".to_string(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Cookie-backed session against the parking dashboard's HTTP API.
///
/// The cookie jar lives in the `reqwest::Client`; `has_session` is only the local
/// marker that a login succeeded and has not since been rejected.
pub struct HttpSession {
    client: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    session: AtomicBool,
}

impl HttpSession {
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        connect_timeout: Duration,
        read_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
            session: AtomicBool::new(false),
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        if self.session.swap(false, Ordering::SeqCst) {
            tracing::debug!("HTTP session invalidated");
        }
    }

    /// Logs in and marks the session established.
    pub async fn login(&self) -> Result<()> {
        let url = self.base_url.join(crate::types::constants::LOGIN_PATH)?;
        tracing::debug!("Logging in at {} as {}", url, self.credentials.username);

        let response = self.client.post(url).json(&self.credentials).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if body.get("success").and_then(Value::as_bool) == Some(true) {
            self.session.store(true, Ordering::SeqCst);
            tracing::info!("HTTP session established");
            return Ok(());
        }

        let message = body
            .get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(RealtimeError::LoginRejected(message))
    }

    /// GETs `path` and returns the JSON body. 401 invalidates the session.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate();
            return Err(RealtimeError::Unauthorized);
        }
        if !status.is_success() {
            return Err(RealtimeError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| RealtimeError::Api(format!("unparsable response body: {e}")))
    }

    /// GETs an enveloped endpoint (`{success, data}`) and returns `data`.
    pub async fn get_data(&self, path: &str) -> Result<Value> {
        let mut body = self.get_json(path).await?;

        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("server reported failure");
            return Err(RealtimeError::Api(message.to_string()));
        }
        match body.get_mut("data").map(Value::take) {
            Some(data) if data.is_object() => Ok(data),
            _ => Err(RealtimeError::Api("response has no data block".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> HttpSession {
        HttpSession::new(
            Url::parse(&server.uri()).unwrap(),
            Credentials::new("operator", "secret"),
            Duration::from_secs(5),
            Duration::from_secs(5),
            "ParkingApp/1.0",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_sets_session_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({
                "username": "operator",
                "password": "secret",
                "role": "admin"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "user": { "username": "operator" }
            })))
            .mount(&server)
            .await;

        let session = session(&server).await;
        assert!(!session.has_session());
        session.login().await.unwrap();
        assert!(session.has_session());

        session.invalidate();
        assert!(!session.has_session());
    }

    #[tokio::test]
    async fn test_login_rejection_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "error": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let err = session(&server).await.login().await.unwrap_err();
        assert!(matches!(err, RealtimeError::LoginRejected(ref m) if m == "Invalid credentials"));
        assert!(err.is_http());
    }

    #[tokio::test]
    async fn test_get_data_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/failing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "detector offline"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = session(&server).await;
        assert!(matches!(
            session.get_data("/failing").await,
            Err(RealtimeError::Api(ref m)) if m == "detector offline"
        ));
        assert!(matches!(session.get_data("/broken").await, Err(RealtimeError::Api(_))));
        assert!(matches!(
            session.get_data("/down").await,
            Err(RealtimeError::HttpStatus(503))
        ));
    }
}
