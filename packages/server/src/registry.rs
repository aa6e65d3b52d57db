//! Handle-addressed registry of authenticated sessions.
//!
//! Every successful login registers its [`Session`] under an opaque handle.
//! Later calls resolve the handle and run against the shared session. The
//! map sits behind one [`RwLock`] that is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use azubiheft_scraper::{AzubiheftError, HttpTransport, Session};
use azubiheft_scraper_models::Credentials;

/// Handle of the session opened from the environment credentials.
pub const DEFAULT_HANDLE: &str = "default";

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No session is registered under the handle.
    #[error("Invalid session ID '{handle}'; log in first")]
    InvalidHandle {
        /// The handle that was looked up.
        handle: String,
    },

    /// Opening or authenticating the session failed.
    #[error(transparent)]
    Session(#[from] AzubiheftError),
}

/// Opens fresh, unauthenticated sessions.
pub trait SessionFactory: Send + Sync {
    /// Creates a new session with its own cookie state.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError`] if the session cannot be constructed.
    fn open(&self) -> Result<Session, AzubiheftError>;
}

impl<F> SessionFactory for F
where
    F: Fn() -> Result<Session, AzubiheftError> + Send + Sync,
{
    fn open(&self) -> Result<Session, AzubiheftError> {
        self()
    }
}

/// [`SessionFactory`] opening HTTP sessions against one base URL.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    base_url: String,
}

impl HttpSessionFactory {
    /// Creates a factory for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Validation`] if `base_url` is not a valid
    /// URL.
    pub fn new(base_url: &str) -> Result<Self, AzubiheftError> {
        HttpTransport::new(base_url)?;
        Ok(Self {
            base_url: base_url.to_string(),
        })
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self) -> Result<Session, AzubiheftError> {
        Session::new(&self.base_url)
    }
}

/// Map from handle to authenticated session.
pub struct SessionRegistry {
    factory: Box<dyn SessionFactory>,
    sessions: RwLock<BTreeMap<String, Arc<Session>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates an empty registry that opens sessions through `factory`.
    #[must_use]
    pub fn new(factory: impl SessionFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Logs in with `credentials` and registers the session under a fresh
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Session`] if the login fails; nothing is
    /// registered in that case.
    pub async fn create(&self, credentials: &Credentials) -> Result<String, RegistryError> {
        let handle = uuid::Uuid::new_v4().to_string();
        self.create_with_handle(&handle, credentials).await?;
        Ok(handle)
    }

    /// Logs in with `credentials` and registers the session under `handle`,
    /// replacing any session registered there before.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Session`] if the login fails.
    pub async fn create_with_handle(
        &self,
        handle: &str,
        credentials: &Credentials,
    ) -> Result<(), RegistryError> {
        let session = self.factory.open()?;
        session.login(credentials).await?;

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.to_string(), Arc::new(session));

        log::info!("Registered session {handle} for {}", credentials.username);
        Ok(())
    }

    /// Resolves `handle`, or the default session if `handle` is `None` or
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] if nothing is registered
    /// under the handle.
    pub fn resolve(&self, handle: Option<&str>) -> Result<Arc<Session>, RegistryError> {
        let handle = handle.filter(|h| !h.is_empty()).unwrap_or(DEFAULT_HANDLE);

        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .ok_or_else(|| RegistryError::InvalidHandle {
                handle: handle.to_string(),
            })
    }

    /// Drops the session registered under `handle`, returning it if there
    /// was one. In-flight operations holding the session finish normally.
    pub fn remove(&self, handle: &str) -> Option<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle);
        if removed.is_some() {
            log::info!("Removed session {handle}");
        }
        removed
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
