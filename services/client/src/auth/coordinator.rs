//! Refresh Coordinator
//!
//! Renews the access credential when a request is rejected with `401`. Only one
//! renewal is ever outstanding: callers that arrive while it runs are queued and
//! all receive its outcome, in the order they arrived.
//!
//! A failed renewal ends the session. The credential store is cleared, every
//! queued caller receives `None`, the user is told their session expired and,
//! after a short pause, sent to the sign-in route.

use super::store::{CredentialStore, mask_credential};
use crate::transport::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Notice shown when the session can no longer be renewed.
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired, please sign in again";

/// The credential pair returned by a successful renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewedCredentials {
    pub access_credential: String,
    pub refresh_credential: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error("no refresh credential is stored")]
    MissingRefreshCredential,
    #[error("renewal endpoint returned HTTP {0}")]
    Status(u16),
    #[error("renewal rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("renewal response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Exchanges a refresh credential for a new credential pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRenewer: Send + Sync {
    async fn renew(&self, refresh_credential: &str) -> Result<RenewedCredentials, RenewalError>;
}

/// Receives the user-facing side effects of an expired session.
pub trait SessionExpiryHandler: Send + Sync {
    fn notify(&self, notice: &str);
    fn redirect(&self, route: &str);
}

/// Default handler: writes the notice and the redirect target to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExpiryHandler;

impl SessionExpiryHandler for LoggingExpiryHandler {
    fn notify(&self, notice: &str) {
        warn!("{}", notice);
    }

    fn redirect(&self, route: &str) {
        info!(%route, "Re-authentication required");
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<Option<String>>>,
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    renewer: Arc<dyn CredentialRenewer>,
    expiry: Arc<dyn SessionExpiryHandler>,
    redirect_delay: Duration,
    login_route: String,
    state: Mutex<RefreshState>,
    renewals: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        renewer: Arc<dyn CredentialRenewer>,
        expiry: Arc<dyn SessionExpiryHandler>,
        redirect_delay: Duration,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            store,
            renewer,
            expiry,
            redirect_delay,
            login_route: login_route.into(),
            state: Mutex::new(RefreshState::default()),
            renewals: AtomicU64::new(0),
        }
    }

    /// Number of times the renewal endpoint has been called.
    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Number of callers waiting on the renewal in flight.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Returns an access credential that is fresher than `rejected`, renewing
    /// it if needed. `None` means the session is over and cleanup has already
    /// happened.
    ///
    /// If the store already holds a different credential than the one that was
    /// rejected, another caller renewed in the meantime and that credential is
    /// returned without a new renewal.
    pub async fn ensure_fresh_credential(self: &Arc<Self>, rejected: Option<&str>) -> Option<String> {
        let outcome = {
            let mut state = self.state.lock();
            if !state.in_flight {
                if let Some(current) = self.store.access_credential() {
                    if rejected != Some(current.as_str()) {
                        debug!("Access credential was already renewed");
                        return Some(current);
                    }
                }
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            if !state.in_flight {
                state.in_flight = true;
                // Spawned so the renewal settles even if every caller goes away.
                tokio::spawn(Arc::clone(self).renew());
            }
            rx
        };
        outcome.await.ok().flatten()
    }

    async fn renew(self: Arc<Self>) {
        let result = match self.store.refresh_credential() {
            Some(refresh) => {
                self.renewals.fetch_add(1, Ordering::SeqCst);
                debug!(refresh = %mask_credential(&refresh), "Renewing access credential");
                self.renewer.renew(&refresh).await
            }
            None => Err(RenewalError::MissingRefreshCredential),
        };

        let fresh = match result {
            Ok(renewed) => {
                // A persistence failure is logged by the store; the new pair is still in memory.
                let _ = self
                    .store
                    .apply_renewal(&renewed.access_credential, &renewed.refresh_credential);
                info!("Access credential renewed");
                Some(renewed.access_credential)
            }
            Err(e) => {
                warn!(error = %e, "Credential renewal failed, ending session");
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear durable credentials");
                }
                None
            }
        };

        let waiters = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), renewed = fresh.is_some(), "Resolving renewal waiters");
        for waiter in waiters {
            let _ = waiter.send(fresh.clone());
        }

        if fresh.is_none() {
            self.expire_session();
        }
    }

    fn expire_session(&self) {
        self.expiry.notify(SESSION_EXPIRED_NOTICE);
        let expiry = Arc::clone(&self.expiry);
        let route = self.login_route.clone();
        let delay = self.redirect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            expiry.redirect(&route);
        });
    }
}
