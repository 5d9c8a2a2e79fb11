//! Client Facade
//!
//! `AgentFlowClient` is built once at startup and owns every shared piece:
//! the configuration, the credential store, the HTTP transport, the refresh
//! coordinator, the request executor and the account API.

use crate::{
    auth::{
        AuthApi, CredentialStore, Identity, JsonFileStore, LoggingExpiryHandler, RefreshCoordinator,
        SessionExpiryHandler,
    },
    config::ClientConfig,
    error::ClientError,
    executor::RequestExecutor,
    models::RegisterRequest,
    stream::{StreamEndpoint, StreamHandle, StreamObserver, StreamQuery, StreamSession},
    transport::{HttpTransport, ReqwestTransport},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AgentFlowClient {
    pub config: Arc<ClientConfig>,
    store: Arc<CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    coordinator: Arc<RefreshCoordinator>,
    executor: RequestExecutor,
    auth: AuthApi,
}

impl AgentFlowClient {
    /// Production wiring: `reqwest` transport, credentials persisted to
    /// `config.credentials_path`, expiry notices written to the log.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config)?);
        let store = Arc::new(CredentialStore::open(Box::new(JsonFileStore::new(
            config.credentials_path.clone(),
        ))));
        Ok(Self::with_parts(
            config,
            transport,
            store,
            Arc::new(LoggingExpiryHandler),
        ))
    }

    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        expiry: Arc<dyn SessionExpiryHandler>,
    ) -> Self {
        let auth = AuthApi::new(transport.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            Arc::new(auth.clone()),
            expiry,
            config.reauth_delay,
            config.login_route.clone(),
        ));
        let executor = RequestExecutor::new(transport.clone(), store.clone(), coordinator.clone());
        Self {
            config: Arc::new(config),
            store,
            transport,
            coordinator,
            executor,
            auth,
        }
    }

    pub async fn send_code(&self, email: &str) -> Result<(), ClientError> {
        self.auth.send_code(email).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<i64, ClientError> {
        self.auth.register(request).await
    }

    /// Signs in and stores the resulting credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ClientError> {
        let login = self.auth.login(email, password).await?;
        self.store.set_login(&login)?;
        Ok(Identity::from(&login))
    }

    /// Revokes the refresh credential on the server and forgets every stored
    /// credential. Local state is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(refresh) = self.store.refresh_credential() {
            if let Err(e) = self.auth.logout(&refresh).await {
                warn!(error = %e, "Server-side sign-out failed, clearing local credentials anyway");
            }
        }
        self.store.clear()?;
        info!("Signed out");
        Ok(())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Executor for every authenticated request/response endpoint.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Opens a stream with the access credential held at open time.
    ///
    /// A process that starts with only a stored refresh credential renews once
    /// first, so the stream is not opened anonymously. The credential is never
    /// renewed once the stream is running.
    pub async fn open_stream<O: StreamObserver>(
        &self,
        endpoint: StreamEndpoint,
        query: StreamQuery,
        observer: O,
    ) -> StreamHandle {
        let credential = match self.store.access_credential() {
            Some(credential) => Some(credential),
            None if self.store.is_authenticated() => {
                debug!("No access credential held, renewing before opening the stream");
                self.coordinator.ensure_fresh_credential(None).await
            }
            None => None,
        };
        StreamSession::open(self.transport.clone(), endpoint, query, credential, observer)
    }
}
