//! Forced-logout broadcaster
//!
//! Network-layer code cannot reach into UI state, and it must not call the
//! session manager's `logout` directly either: every system-initiated logout
//! funnels through this single channel so it can be guarded, deduplicated,
//! and observed in one place.
//!
//! The guard gives the clear/notify sequence at-most-one-concurrent-execution
//! semantics and clears itself after a grace window, so a run that failed
//! partway can never lock the channel permanently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

type LogoutFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type LogoutHandler = Arc<dyn Fn() -> LogoutFuture + Send + Sync>;

/// Process-wide forced-logout signal.
pub struct ForcedLogoutBroadcaster {
    notify_tx: broadcast::Sender<()>,
    in_flight: Arc<AtomicBool>,
    grace: Duration,
    handler: std::sync::RwLock<Option<LogoutHandler>>,
}

impl std::fmt::Debug for ForcedLogoutBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForcedLogoutBroadcaster")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("grace", &self.grace)
            .finish()
    }
}

impl ForcedLogoutBroadcaster {
    /// Create a broadcaster with the given guard grace window.
    pub fn new(grace: Duration) -> Self {
        let (notify_tx, _) = broadcast::channel(8);
        Self {
            notify_tx,
            in_flight: Arc::new(AtomicBool::new(false)),
            grace,
            handler: std::sync::RwLock::new(None),
        }
    }

    /// Install the logout operation this broadcaster delegates to.
    ///
    /// Wired once by the session manager at construction, mirroring how the
    /// network layer receives its refresh callback.
    pub fn set_logout_handler<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: LogoutHandler = Arc::new(move || Box::pin(handler()) as LogoutFuture);
        *self.handler.write().expect("handler lock poisoned") = Some(handler);
    }

    /// Subscribe to the payload-less session-ended notification.
    ///
    /// UI code listens here to transition the visible screen to the login
    /// flow. At most one emission occurs per logout cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify_tx.subscribe()
    }

    /// Emit the session-ended notification.
    ///
    /// Called exactly once from inside the logout clear sequence; nothing
    /// else may emit on this channel.
    pub(crate) fn emit(&self) {
        // No receivers is fine; UI may not have subscribed yet.
        let _ = self.notify_tx.send(());
    }

    /// Request a forced logout.
    ///
    /// Safe to call from any context, including with no active session (the
    /// delegated logout is a no-op then). A second invocation while one is in
    /// flight, or within the grace window after one, is dropped.
    pub async fn trigger(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("forced logout already in flight, dropping trigger");
            return;
        }

        // The guard clears on a timer rather than on completion: if the
        // handler fails partway the channel must still recover.
        let flag = Arc::clone(&self.in_flight);
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            flag.store(false, Ordering::SeqCst);
        });

        let handler = self
            .handler
            .read()
            .expect("handler lock poisoned")
            .clone();
        match handler {
            Some(handler) => handler().await,
            None => warn!("forced logout triggered before a handler was installed"),
        }
    }
}

/// Paths on which a 401 means "that login attempt failed", not "this session
/// died". Substring matching is a known-fragile heuristic (differently-named
/// endpoints produce false negatives); preserved as-is.
const AUTH_PATH_MARKERS: &[&str] = &["/login", "/register", "/auth"];

/// Whether `path` belongs to the login/registration/authentication flow.
pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

/// Whether an HTTP response demands a forced logout: a 401 from any endpoint
/// that is not itself part of the authentication flow.
pub fn response_demands_logout(status: u16, path: &str) -> bool {
    status == 401 && !is_auth_endpoint(path)
}

/// Host suffixes behind a gateway known to strip CORS headers off auth
/// rejections, turning a 401 into an opaque network error on web builds.
const GATEWAY_HOST_MARKERS: &[&str] = &["api.", "gateway."];

/// Whether an opaque transport error against `url` is operationally
/// indistinguishable from an unreported 401. Heuristic by endpoint/domain
/// pattern, not a reliable status code.
pub fn transport_error_demands_logout(url: &url::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if is_auth_endpoint(url.path()) {
        return false;
    }
    GATEWAY_HOST_MARKERS
        .iter()
        .any(|marker| host.starts_with(marker))
}
