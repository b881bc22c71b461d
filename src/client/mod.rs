/// Client-side session keeping
///
/// [`RefreshCoordinator`] is the single-flight gate every outbound request
/// passes through: at most one network refresh call per expiry window, with
/// concurrent requests parked on a FIFO waiter queue until the flight lands.
/// [`SessionWatchdog`] is the low-frequency advisory timer that lets idle
/// clients notice expiry; it never refreshes anything itself.

mod http;

pub use http::HttpSessionTransport;

use crate::account::AuthSession;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Seconds of access-token lifetime left below which a refresh is attempted
const REFRESH_MARGIN_SECS: i64 = 300;

/// Watchdog tick period
const WATCHDOG_PERIOD: std::time::Duration = std::time::Duration::from_secs(30);

/// Terminal session failure: the refresh token no longer works. The caller
/// must send the user back through login; retrying is pointless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Session expired; sign in again")]
pub struct SessionExpired;

/// Failure modes of the refresh transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server rejected the refresh token (revoked/expired/unknown)
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// Network or server fault
    #[error("transport failure: {0}")]
    Failure(String),
}

/// Transport seam for the refresh call
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, TransportError>;
}

/// Advisory signals raised by the watchdog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// Access token lifetime at or below the refresh margin
    ExpiringSoon { remaining_secs: i64 },
    /// Access token fully expired; local session state has been cleared
    Expired,
}

struct FlightState {
    refreshing: bool,
    /// Parked requests, woken in arrival order
    waiters: VecDeque<oneshot::Sender<Result<String, SessionExpired>>>,
}

/// Single-flight refresh coordinator, constructed once per client instance
/// and owned by its request pipeline.
pub struct RefreshCoordinator {
    transport: Arc<dyn SessionTransport>,
    refresh_margin: Duration,
    session: RwLock<Option<AuthSession>>,
    state: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self::with_margin(transport, Duration::seconds(REFRESH_MARGIN_SECS))
    }

    pub fn with_margin(transport: Arc<dyn SessionTransport>, refresh_margin: Duration) -> Self {
        Self {
            transport,
            refresh_margin,
            session: RwLock::new(None),
            state: Mutex::new(FlightState {
                refreshing: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Store the session obtained from a login response
    pub async fn install_session(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }

    /// Drop local session state (logout, or terminal expiry)
    pub async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    /// Snapshot of the stored session
    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Produce the bearer token for an outbound request.
    ///
    /// Returns `Ok(None)` when no session is stored (caller policy decides
    /// whether to proceed unauthenticated), `Ok(Some(token))` with a token
    /// guaranteed to be outside the expiry window, or `Err(SessionExpired)`
    /// when the refresh failed; every concurrent request in the same window
    /// receives the same result.
    pub async fn bearer_for_request(&self) -> Result<Option<String>, SessionExpired> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        if self.is_fresh(&session.access_token) {
            return Ok(Some(session.access_token));
        }

        // Within the margin: join the in-flight refresh or start one
        let waiter = {
            let mut state = self.state.lock().await;
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(Ok(token)) => Ok(Some(token)),
                Ok(Err(err)) => Err(err),
                // Refresher dropped without resolving; treat as terminal
                Err(_) => Err(SessionExpired),
            };
        }

        self.run_refresh().await.map(Some)
    }

    /// Execute the one network refresh for this window. Caller holds the
    /// `refreshing` flag.
    async fn run_refresh(&self) -> Result<String, SessionExpired> {
        // Re-read under the flag: another flight may have landed between
        // our staleness check and winning the flag.
        let session = self.current_session().await;

        if let Some(ref session) = session {
            if self.is_fresh(&session.access_token) {
                let token = session.access_token.clone();
                self.finish_flight(Ok(token.clone())).await;
                return Ok(token);
            }
        }

        let Some(session) = session else {
            self.finish_flight(Err(SessionExpired)).await;
            return Err(SessionExpired);
        };

        match self.transport.refresh(&session.refresh_token).await {
            Ok(new_session) => {
                let token = new_session.access_token.clone();
                self.install_session(new_session).await;
                self.finish_flight(Ok(token.clone())).await;
                Ok(token)
            }
            Err(err) => {
                tracing::warn!("session refresh failed: {}", err);
                self.clear_session().await;
                self.finish_flight(Err(SessionExpired)).await;
                Err(SessionExpired)
            }
        }
    }

    /// Clear the flag and wake every parked request, in arrival order, with
    /// the flight's result.
    async fn finish_flight(&self, result: Result<String, SessionExpired>) {
        let waiters = {
            let mut state = self.state.lock().await;
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }

    fn is_fresh(&self, access_token: &str) -> bool {
        match access_token_expiry(access_token) {
            Some(expires_at) => expires_at - Utc::now() > self.refresh_margin,
            // Undecodable token: force it through the refresh path
            None => false,
        }
    }
}

/// Advisory expiry timer so idle clients (making no requests) still notice
/// the session dying.
pub struct SessionWatchdog {
    coordinator: Arc<RefreshCoordinator>,
    period: std::time::Duration,
    margin: Duration,
}

impl SessionWatchdog {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            coordinator,
            period: WATCHDOG_PERIOD,
            margin: Duration::seconds(REFRESH_MARGIN_SECS),
        }
    }

    pub fn with_period(mut self, period: std::time::Duration) -> Self {
        self.period = period;
        self
    }

    /// Start the timer. Signals are advisory; the watchdog performs no
    /// refresh itself. `Expired` clears the stored session before it is
    /// broadcast, so receivers can redirect straight to login.
    pub fn spawn(self) -> (broadcast::Receiver<SessionSignal>, JoinHandle<()>) {
        let (tx, rx) = broadcast::channel(16);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let Some(session) = self.coordinator.current_session().await else {
                    continue;
                };

                let Some(expires_at) = access_token_expiry(&session.access_token) else {
                    continue;
                };

                let remaining = (expires_at - Utc::now()).num_seconds();
                if remaining <= 0 {
                    self.coordinator.clear_session().await;
                    if tx.send(SessionSignal::Expired).is_err() {
                        // No receivers left
                        return;
                    }
                } else if remaining <= self.margin.num_seconds() {
                    let _ = tx.send(SessionSignal::ExpiringSoon {
                        remaining_secs: remaining,
                    });
                }
            }
        });

        (rx, handle)
    }
}

/// Decode the expiry claim of an access token without verifying the
/// signature; the server remains the authority, this only schedules the
/// refresh.
fn access_token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims_b64 = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(claims_b64).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;

    Utc.timestamp_opt(exp, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport double: counts refresh calls, optionally fails, and holds
    /// each flight long enough for concurrent requests to pile up.
    struct FakeTransport {
        calls: AtomicUsize,
        fail: bool,
        next_access_ttl_secs: i64,
    }

    impl FakeTransport {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                next_access_ttl_secs: 3600,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
                next_access_ttl_secs: 3600,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn refresh(&self, _refresh_token: &str) -> Result<AuthSession, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Let the waiter queue fill while the flight is airborne
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;

            if self.fail {
                return Err(TransportError::Rejected("refresh token revoked".to_string()));
            }

            Ok(session_with_ttl(self.next_access_ttl_secs))
        }
    }

    /// Unsigned-but-well-formed JWT carrying only an exp claim
    fn token_with_ttl(ttl_secs: i64) -> String {
        let exp = (Utc::now() + Duration::seconds(ttl_secs)).timestamp();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"acct-1","exp":{}}}"#, exp));
        format!("{}.{}.sig", header, claims)
    }

    fn session_with_ttl(ttl_secs: i64) -> AuthSession {
        AuthSession {
            access_token: token_with_ttl(ttl_secs),
            refresh_token: "refresh-1".to_string(),
            account_id: "acct-1".to_string(),
            display_name: Some("Player".to_string()),
            status: AccountStatus::Active,
            profile_setup_required: false,
        }
    }

    #[tokio::test]
    async fn test_no_session_proceeds_unauthenticated() {
        let transport = FakeTransport::succeeding();
        let coordinator = RefreshCoordinator::new(transport.clone());

        assert_eq!(coordinator.bearer_for_request().await, Ok(None));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_token_attached_without_refresh() {
        let transport = FakeTransport::succeeding();
        let coordinator = RefreshCoordinator::new(transport.clone());

        let session = session_with_ttl(3600);
        let expected = session.access_token.clone();
        coordinator.install_session(session).await;

        let token = coordinator.bearer_for_request().await.unwrap();
        assert_eq!(token.as_deref(), Some(expected.as_str()));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_refresh() {
        let transport = FakeTransport::succeeding();
        let coordinator = Arc::new(RefreshCoordinator::new(transport.clone()));

        // 60s left: inside the 5-minute margin
        coordinator.install_session(session_with_ttl(60)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                coordinator.bearer_for_request().await
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap().unwrap());
        }

        // Exactly one network call; every request got the same new token
        assert_eq!(transport.call_count(), 1);
        let first = &tokens[0];
        assert!(tokens.iter().all(|t| t == first));

        let stored = coordinator.current_session().await.unwrap();
        assert_eq!(&stored.access_token, first);
    }

    #[tokio::test]
    async fn test_failed_refresh_fails_all_waiters_and_clears_session() {
        let transport = FakeTransport::failing();
        let coordinator = Arc::new(RefreshCoordinator::new(transport.clone()));

        coordinator.install_session(session_with_ttl(60)).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                coordinator.bearer_for_request().await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(SessionExpired));
        }

        assert_eq!(transport.call_count(), 1);
        assert!(coordinator.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_next_window_refreshes_again() {
        let transport = Arc::new(FakeTransport {
            calls: AtomicUsize::new(0),
            fail: false,
            // New tokens land already inside the margin, so each window
            // triggers its own flight
            next_access_ttl_secs: 60,
        });
        let coordinator = Arc::new(RefreshCoordinator::new(transport.clone()));

        coordinator.install_session(session_with_ttl(60)).await;

        coordinator.bearer_for_request().await.unwrap();
        coordinator.bearer_for_request().await.unwrap();

        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_watchdog_reports_expiring_soon() {
        let transport = FakeTransport::succeeding();
        let coordinator = Arc::new(RefreshCoordinator::new(transport));

        coordinator.install_session(session_with_ttl(120)).await;

        let (mut rx, handle) = SessionWatchdog::new(Arc::clone(&coordinator))
            .with_period(std::time::Duration::from_millis(10))
            .spawn();

        match rx.recv().await.unwrap() {
            SessionSignal::ExpiringSoon { remaining_secs } => {
                assert!(remaining_secs > 0 && remaining_secs <= 120);
            }
            other => panic!("Expected ExpiringSoon, got {:?}", other),
        }

        // Advisory only: the session is still there
        assert!(coordinator.current_session().await.is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_watchdog_expired_clears_session() {
        let transport = FakeTransport::succeeding();
        let coordinator = Arc::new(RefreshCoordinator::new(transport));

        coordinator.install_session(session_with_ttl(-10)).await;

        let (mut rx, handle) = SessionWatchdog::new(Arc::clone(&coordinator))
            .with_period(std::time::Duration::from_millis(10))
            .spawn();

        assert_eq!(rx.recv().await.unwrap(), SessionSignal::Expired);
        assert!(coordinator.current_session().await.is_none());
        handle.abort();
    }

    #[test]
    fn test_expiry_decoding_tolerates_garbage() {
        assert!(access_token_expiry("garbage").is_none());
        assert!(access_token_expiry("a.b.c").is_none());
        assert!(access_token_expiry("").is_none());

        let token = token_with_ttl(600);
        let expires_at = access_token_expiry(&token).unwrap();
        let remaining = (expires_at - Utc::now()).num_seconds();
        assert!((595..=600).contains(&remaining));
    }
}
