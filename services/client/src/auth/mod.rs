//! Credentials and the account endpoints that produce them.

pub mod api;
pub mod coordinator;
pub mod store;

pub use api::AuthApi;
pub use coordinator::{
    CredentialRenewer, LoggingExpiryHandler, RefreshCoordinator, RenewalError, RenewedCredentials,
    SESSION_EXPIRED_NOTICE, SessionExpiryHandler,
};
pub use store::{
    CredentialSnapshot, CredentialStore, DurableCredentials, DurableStore, Identity,
    JsonFileStore, MemoryStore, StoreError,
};
