//! HTTP fallback for parking status.
//!
//! The poller pulls the same [`ParkingStatus`] shape the live stream pushes, so a
//! consumer can feed both paths into one Status callback (see
//! [`CallbackRegistry::status_sink`](crate::CallbackRegistry::status_sink)).

use crate::client::{ConnectionState, validate_server_url};
use crate::infrastructure::{Credentials, HttpSession};
use crate::messaging::decode_parking_status;
use crate::types::constants::{
    HTTP_CONNECT_TIMEOUT, HTTP_READ_TIMEOUT, HTTP_USER_AGENT, PARKING_SUMMARY_PATH,
    QUICK_STATUS_PATH, STATUS_REFRESH_INTERVAL,
};
use crate::types::{ParkingStatus, QuickStatus, RealtimeError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub interval: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
    /// Skip ticks while the live stream reports `Connected`
    pub skip_while_connected: bool,
    /// Login used to bootstrap the session cookie
    pub credentials: Credentials,
}

impl PollerOptions {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            interval: Duration::from_millis(STATUS_REFRESH_INTERVAL),
            connect_timeout: Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            read_timeout: Duration::from_millis(HTTP_READ_TIMEOUT),
            user_agent: HTTP_USER_AGENT.to_string(),
            skip_while_connected: false,
            credentials,
        }
    }
}

/// Periodic, session-bootstrapped status fetcher.
pub struct StatusPoller {
    session: Arc<HttpSession>,
    interval: Duration,
    skip_while_connected: bool,
    connection_state: Option<watch::Receiver<ConnectionState>>,
    run: Mutex<Option<PollRun>>,
}

/// One started periodic loop. The flag is checked before every delivery so a
/// tick racing `stop_periodic_updates` never reaches the callback.
struct PollRun {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    pub fn new(server_url: &str, options: PollerOptions) -> Result<Self> {
        if options.interval.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        let base_url = validate_server_url(server_url)?;
        let session = HttpSession::new(
            base_url,
            options.credentials,
            options.connect_timeout,
            options.read_timeout,
            &options.user_agent,
        )?;

        Ok(Self {
            session: Arc::new(session),
            interval: options.interval,
            skip_while_connected: options.skip_while_connected,
            connection_state: None,
            run: Mutex::new(None),
        })
    }

    /// Observe the live stream's state, e.g. from
    /// [`ConnectionManager::subscribe_state`](crate::ConnectionManager::subscribe_state).
    pub fn with_connection_state(mut self, state: watch::Receiver<ConnectionState>) -> Self {
        self.connection_state = Some(state);
        self
    }

    pub fn has_session(&self) -> bool {
        self.session.has_session()
    }

    /// Fetches the parking summary, logging in first when no session exists.
    ///
    /// An expired session (401) triggers exactly one re-login and refetch; the
    /// refetch's outcome is returned as is.
    pub async fn login_and_get_status(&self) -> Result<ParkingStatus> {
        with_session(&self.session, fetch_summary).await
    }

    pub async fn get_quick_status(&self) -> Result<QuickStatus> {
        with_session(&self.session, fetch_quick_status).await
    }

    /// Starts polling every interval, first tick immediately. Returns `false`
    /// if a loop is already running.
    pub fn start_periodic_updates<F>(&self, on_update: F) -> bool
    where
        F: Fn(Result<ParkingStatus>) + Send + Sync + 'static,
    {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            tracing::debug!("Periodic status updates already running");
            return false;
        }

        let active = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.session),
            self.interval,
            self.skip_while_connected,
            self.connection_state.clone(),
            Arc::clone(&active),
            on_update,
        ));
        *run = Some(PollRun { active, handle });

        tracing::info!("Periodic status updates started every {:?}", self.interval);
        true
    }

    /// Safe to call when nothing is running.
    pub fn stop_periodic_updates(&self) {
        let run = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(run) = run {
            run.active.store(false, Ordering::SeqCst);
            run.handle.abort();
            tracing::info!("Periodic status updates stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop_periodic_updates();
    }
}

async fn poll_loop<F>(
    session: Arc<HttpSession>,
    interval: Duration,
    skip_while_connected: bool,
    connection_state: Option<watch::Receiver<ConnectionState>>,
    active: Arc<AtomicBool>,
    on_update: F,
) where
    F: Fn(Result<ParkingStatus>) + Send + Sync + 'static,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !active.load(Ordering::SeqCst) {
            break;
        }

        if skip_while_connected
            && connection_state
                .as_ref()
                .is_some_and(|rx| *rx.borrow() == ConnectionState::Connected)
        {
            tracing::debug!("Live stream connected; skipping status poll");
            continue;
        }

        let result = with_session(&session, fetch_summary).await;
        if let Err(e) = &result {
            tracing::warn!("Status poll failed: {}", e);
        }
        if !active.load(Ordering::SeqCst) {
            break;
        }
        on_update(result);
    }
}

/// Runs `fetch` inside a logged-in session, re-logging in once on 401.
async fn with_session<T, F, Fut>(session: &Arc<HttpSession>, fetch: F) -> Result<T>
where
    F: Fn(Arc<HttpSession>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !session.has_session() {
        session.login().await?;
    }

    match fetch(Arc::clone(session)).await {
        Err(RealtimeError::Unauthorized) => {
            tracing::warn!("HTTP session expired; logging in again");
            session.login().await?;
            fetch(Arc::clone(session)).await
        }
        other => other,
    }
}

async fn fetch_summary(session: Arc<HttpSession>) -> Result<ParkingStatus> {
    let data = session.get_data(PARKING_SUMMARY_PATH).await?;
    decode_parking_status(&data).map_err(|e| RealtimeError::Api(e.to_string()))
}

async fn fetch_quick_status(session: Arc<HttpSession>) -> Result<QuickStatus> {
    let body = session.get_json(QUICK_STATUS_PATH).await?;
    serde_json::from_value(body).map_err(|e| RealtimeError::Api(format!("bad quick status: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn summary_body() -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "parking_status": {
                    "total": 50,
                    "available": 12,
                    "occupied": 38,
                    "percentage_full": 76.0
                },
                "status_message": "Almost full",
                "last_updated": "2024-05-01T08:00:00Z",
                "color_indicator": "orange"
            }
        })
    }

    async fn mount_login(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "user": { "role": "admin" } })),
            )
            .expect(times)
            .mount(server)
            .await;
    }

    fn poller(server: &MockServer, options: PollerOptions) -> StatusPoller {
        StatusPoller::new(&server.uri(), options).unwrap()
    }

    fn options() -> PollerOptions {
        PollerOptions::new(Credentials::new("operator", "secret"))
    }

    #[tokio::test]
    async fn test_logs_in_once_then_reuses_session() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(2)
            .mount(&server)
            .await;

        let poller = poller(&server, options());
        let status = poller.login_and_get_status().await.unwrap();
        assert_eq!(status.snapshot.available, 12);
        assert_eq!(status.snapshot.total, 50);
        assert_eq!(status.color_indicator, "orange");
        assert!(poller.has_session());

        poller.login_and_get_status().await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_relogs_in_exactly_once() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(1)
            .mount(&server)
            .await;

        let status = poller(&server, options()).login_and_get_status().await.unwrap();
        assert_eq!(status.snapshot.occupied, 38);
    }

    #[tokio::test]
    async fn test_failed_retry_surfaces_retry_error() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = poller(&server, options())
            .login_and_get_status()
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::HttpStatus(503)));
        assert!(err.is_http());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = poller(&server, options())
            .login_and_get_status()
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_unparsable_body_is_api_error() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = poller(&server, options())
            .login_and_get_status()
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Api(_)));
    }

    #[tokio::test]
    async fn test_login_rejection_stops_before_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "success": false, "error": "Invalid credentials" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(0)
            .mount(&server)
            .await;

        let err = poller(&server, options())
            .login_and_get_status()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Login failed: Invalid credentials");
    }

    #[tokio::test]
    async fn test_quick_status() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/quick-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "available": 3,
                "total": 20,
                "has_space": true,
                "timestamp": "2024-05-01T08:00:00Z"
            })))
            .mount(&server)
            .await;

        let quick = poller(&server, options()).get_quick_status().await.unwrap();
        assert_eq!(
            quick,
            QuickStatus {
                available: 3,
                total: 20,
                has_space: true
            }
        );
    }

    #[tokio::test]
    async fn test_periodic_updates_are_idempotent_and_stoppable() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .mount(&server)
            .await;

        let poller = poller(
            &server,
            PollerOptions {
                interval: Duration::from_millis(50),
                ..options()
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(poller.start_periodic_updates(move |result| {
            let _ = tx.send(result.map(|status| status.snapshot.available));
        }));
        assert!(!poller.start_periodic_updates(|_| {}));
        assert!(poller.is_running());

        for _ in 0..2 {
            let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(update.unwrap(), 12);
        }

        poller.stop_periodic_updates();
        poller.stop_periodic_updates();
        assert!(!poller.is_running());

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tick_failures_keep_loop_alive() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let poller = poller(
            &server,
            PollerOptions {
                interval: Duration::from_millis(30),
                ..options()
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        poller.start_periodic_updates(move |result| {
            let _ = tx.send(result.is_err());
        });

        for _ in 0..3 {
            let failed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(failed);
        }
        assert!(poller.is_running());
    }

    #[tokio::test]
    async fn test_skips_ticks_while_stream_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/mobile/parking-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
            .expect(0)
            .mount(&server)
            .await;

        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let poller = poller(
            &server,
            PollerOptions {
                interval: Duration::from_millis(20),
                skip_while_connected: true,
                ..options()
            },
        )
        .with_connection_state(state_rx);

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        poller.start_periodic_updates(move |_| {
            let _ = tx.send(());
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        poller.stop_periodic_updates();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            StatusPoller::new("", options()),
            Err(RealtimeError::InvalidServerUrl(_))
        ));
    }
}
