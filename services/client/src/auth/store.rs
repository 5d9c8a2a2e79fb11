//! Credential Store
//!
//! Holds the credentials of the signed-in user in two tiers:
//!
//! - the session tier lives in process memory and holds the short-lived access
//!   credential. It is never written anywhere and disappears with the process.
//! - the durable tier holds the long-lived refresh credential and the cached
//!   identity, behind the [`DurableStore`] trait so it survives restarts.
//!
//! The two tiers are only ever cleared together.

use crate::models::{LoginResponse, deserialize_id};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("credential document is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Cached profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: String,
}

impl From<&LoginResponse> for Identity {
    fn from(login: &LoginResponse) -> Self {
        Self {
            id: login.user_id,
            email: login.email.clone(),
            display_name: login.user_name.clone(),
            avatar: login.user_avatar.clone(),
            role: login.user_role.clone(),
        }
    }
}

/// The document kept by the durable tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableCredentials {
    #[serde(default)]
    pub refresh_credential: Option<String>,
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// A point-in-time copy of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub access_credential: Option<String>,
    pub refresh_credential: Option<String>,
    pub identity: Option<Identity>,
}

impl CredentialSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.refresh_credential.is_some()
    }
}

/// Storage that outlives the process.
pub trait DurableStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<DurableCredentials>, StoreError>;
    fn save(&self, credentials: &DurableCredentials) -> Result<(), StoreError>;
    fn remove(&self) -> Result<(), StoreError>;
}

/// Keeps the durable tier as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self) -> Result<Option<DurableCredentials>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, credentials: &DurableCredentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written document behind.
        let staging = self.staging_path();
        write_private(&staging, &serde_json::to_vec_pretty(credentials)?)?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), "Durable credentials saved");
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `contents` to a file readable only by its owner.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}

/// Durable tier that is not durable at all. Used by tests and by callers that
/// do not want anything written to disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<DurableCredentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> Result<Option<DurableCredentials>, StoreError> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, credentials: &DurableCredentials) -> Result<(), StoreError> {
        *self.document.lock() = Some(credentials.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        *self.document.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tiers {
    access_credential: Option<String>,
    durable: DurableCredentials,
}

/// The process-wide credential store.
///
/// Every mutation updates memory first and then writes the durable tier while
/// still holding the lock, so readers never observe a half-applied change.
pub struct CredentialStore {
    tiers: Mutex<Tiers>,
    durable: Box<dyn DurableStore>,
}

impl CredentialStore {
    /// Hydrates the store from `durable`. A document that cannot be read is
    /// treated as if the user had never signed in.
    pub fn open(durable: Box<dyn DurableStore>) -> Self {
        let document = match durable.load() {
            Ok(document) => document.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable durable credentials");
                DurableCredentials::default()
            }
        };
        Self {
            tiers: Mutex::new(Tiers {
                access_credential: None,
                durable: document,
            }),
            durable,
        }
    }

    /// A store with nothing persisted and no durable backing.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStore::new()))
    }

    /// Records a successful sign-in.
    pub fn set_login(&self, login: &LoginResponse) -> Result<(), StoreError> {
        let mut tiers = self.tiers.lock();
        tiers.access_credential = Some(login.access_token.clone());
        tiers.durable = DurableCredentials {
            refresh_credential: Some(login.refresh_token.clone()),
            identity: Some(Identity::from(login)),
        };
        self.durable.save(&tiers.durable)
    }

    /// Replaces both credentials after a renewal. The renewal endpoint rotates
    /// the refresh credential, so both must be kept.
    pub fn apply_renewal(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        let mut tiers = self.tiers.lock();
        tiers.access_credential = Some(access.to_string());
        tiers.durable.refresh_credential = Some(refresh.to_string());
        self.durable.save(&tiers.durable).inspect_err(|e| {
            warn!(error = %e, "Renewed credentials are held in memory only");
        })
    }

    pub fn access_credential(&self) -> Option<String> {
        self.tiers.lock().access_credential.clone()
    }

    pub fn refresh_credential(&self) -> Option<String> {
        self.tiers.lock().durable.refresh_credential.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tiers.lock().durable.identity.clone()
    }

    /// Signed in means holding a refresh credential. An access credential on its own does not count.
    pub fn is_authenticated(&self) -> bool {
        self.tiers.lock().durable.refresh_credential.is_some()
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        let tiers = self.tiers.lock();
        CredentialSnapshot {
            access_credential: tiers.access_credential.clone(),
            refresh_credential: tiers.durable.refresh_credential.clone(),
            identity: tiers.durable.identity.clone(),
        }
    }

    /// Forgets everything in both tiers.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut tiers = self.tiers.lock();
        *tiers = Tiers::default();
        self.durable.remove()
    }
}

/// Shortens a credential for log output.
pub fn mask_credential(credential: &str) -> String {
    let prefix: String = credential.chars().take(6).collect();
    format!("{prefix}...")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    pub(crate) fn login_response(access: &str, refresh: &str) -> LoginResponse {
        LoginResponse {
            user_id: 42,
            email: "ada@example.com".to_string(),
            user_name: "Ada".to_string(),
            user_avatar: None,
            user_role: "user".to_string(),
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_in: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    /// A signed-in store backed by memory only.
    pub(crate) fn signed_in_store(access: &str, refresh: &str) -> Arc<CredentialStore> {
        let store = CredentialStore::in_memory();
        store.set_login(&login_response(access, refresh)).unwrap();
        Arc::new(store)
    }

    struct FailingStore;

    impl DurableStore for FailingStore {
        fn load(&self) -> Result<Option<DurableCredentials>, StoreError> {
            Ok(None)
        }
        fn save(&self, _: &DurableCredentials) -> Result<(), StoreError> {
            Err(io::Error::other("disk full").into())
        }
        fn remove(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_login_populates_both_tiers() {
        let store = CredentialStore::in_memory();
        assert!(!store.is_authenticated());

        store.set_login(&login_response("a1", "r1")).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.access_credential.as_deref(), Some("a1"));
        assert_eq!(snapshot.refresh_credential.as_deref(), Some("r1"));
        assert_eq!(snapshot.identity.unwrap().display_name, "Ada");
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_access_credential_alone_is_not_authenticated() {
        let snapshot = CredentialSnapshot {
            access_credential: Some("a1".to_string()),
            ..Default::default()
        };
        assert!(!snapshot.is_authenticated());
    }

    #[test]
    fn test_renewal_rotates_both_credentials() {
        let store = signed_in_store("a1", "r1");
        store.apply_renewal("a2", "r2").unwrap();

        assert_eq!(store.access_credential().as_deref(), Some("a2"));
        assert_eq!(store.refresh_credential().as_deref(), Some("r2"));
        assert_eq!(store.identity().unwrap().id, 42);
    }

    #[test]
    fn test_renewal_kept_in_memory_when_persisting_fails() {
        let store = CredentialStore::open(Box::new(FailingStore));
        assert!(store.apply_renewal("a2", "r2").is_err());
        assert_eq!(store.access_credential().as_deref(), Some("a2"));
        assert_eq!(store.refresh_credential().as_deref(), Some("r2"));
    }

    #[test]
    fn test_clear_forgets_both_tiers() {
        let store = signed_in_store("a1", "r1");
        store.clear().unwrap();
        assert_eq!(store.snapshot(), CredentialSnapshot::default());
    }

    #[test]
    fn test_file_store_survives_restart_without_access_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        store.set_login(&login_response("a1", "r1")).unwrap();
        assert!(path.exists());

        let reopened = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        assert_eq!(reopened.access_credential(), None);
        assert_eq!(reopened.refresh_credential().as_deref(), Some("r1"));
        assert_eq!(reopened.identity().unwrap().email, "ada@example.com");
        assert!(reopened.is_authenticated());

        reopened.clear().unwrap();
        assert!(!path.exists());
        // Clearing an already-empty store is fine.
        reopened.clear().unwrap();
    }

    #[test]
    fn test_access_credential_is_never_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        store.set_login(&login_response("secret-access", "r1")).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret-access"));
        assert!(raw.contains("refreshCredential"));
    }

    #[cfg(unix)]
    #[test]
    fn test_document_is_readable_by_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        store.set_login(&login_response("a1", "r1")).unwrap();
        store.apply_renewal("a2", "r2").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_document_with_text_identity_id_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(
            &path,
            r#"{"refreshCredential":"r1","identity":{"id":"1234567890123456789","email":"ada@example.com","displayName":"Ada"}}"#,
        )
        .unwrap();

        let store = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        assert!(store.is_authenticated());
        assert_eq!(store.identity().unwrap().id, 1_234_567_890_123_456_789);
    }

    #[test]
    fn test_corrupt_document_is_treated_as_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ not json").unwrap();

        let store = CredentialStore::open(Box::new(JsonFileStore::new(&path)));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_mask_credential() {
        assert_eq!(mask_credential("eyJhbGciOiJIUzI1NiJ9"), "eyJhbG...");
        assert_eq!(mask_credential("abc"), "abc...");
    }
}
