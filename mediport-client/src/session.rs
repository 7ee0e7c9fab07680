use std::fmt;
use std::sync::Arc;

use mediport_types::{Permission, Role, auth};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::action::{Action, InFlight};
use crate::authorized::Authorized;
use crate::storage::SessionStorage;
use crate::{AuthError, Client, Error, StorageError, token};

/// The authorization scheme used when the backend does not name one.
pub const DEFAULT_SCHEME: &str = "Bearer";

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_owned()
}

/// Loads the stored session, treating a malformed record as no session.
fn load_or_discard(storage: &dyn SessionStorage) -> crate::Result<Session> {
    match storage.load() {
        Ok(session) => Ok(session.unwrap_or_default()),
        Err(StorageError::Json(error)) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "discarding unreadable session record"
            );
            Ok(Session::default())
        }
        Err(error) => Err(error.into()),
    }
}

/// An opaque signed access token issued by the backend.
///
/// The `Debug` implementation does not reveal the token.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[redacted, {} bytes]", self.0.len())
    }
}

/// The client-held record of the current authentication.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Session {
    /// The access token, if logged in.
    #[serde(default)]
    pub token: Option<AccessToken>,

    /// The authorization scheme to send with the token.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Whether the user is logged in.
    pub logged_in: bool,

    /// The role decoded from the token.
    ///
    /// `None` if the token carried no recognizable role. All permission checks deny in that
    /// case.
    #[serde(default)]
    pub role: Option<Role>,

    /// The remembered username, kept across logouts.
    #[serde(default)]
    pub username: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: None,
            scheme: default_scheme(),
            logged_in: false,
            role: None,
            username: None,
        }
    }
}

impl Session {
    /// Returns `true` if this session is logged in and holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.logged_in && self.token.as_ref().is_some_and(|token| !token.is_empty())
    }

    /// Renders the value of the `Authorization` header, if there is a token.
    pub fn authorization(&self) -> Option<String> {
        self.token
            .as_ref()
            .filter(|token| !token.is_empty())
            .map(|token| format!("{} {}", self.scheme, token.as_str()))
    }

    /// Checks whether the session's role is granted `permission`.
    pub fn can(&self, permission: Permission) -> bool {
        auth::has_permission(self.role, permission)
    }

    /// Returns a logged out session that keeps only the remembered username.
    fn logged_out(&self) -> Session {
        Session {
            username: self.username.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    client: Client,
    storage: Box<dyn SessionStorage>,
    state: watch::Sender<Session>,
    in_flight: InFlight,
}

/// The session service shared by every part of an application.
///
/// `SessionContext` is the only writer of the session: [`login`](Self::login) sets it,
/// [`logout`](Self::logout) clears it, and requests rejected with `401 Unauthorized` expire it.
/// Everything else reads the current [`Session`] or [`subscribe`](Self::subscribe)s to changes.
///
/// Protected operations start with [`require`](Self::require), which fails with
/// [`AuthError::LoginRequired`] before any request is made if there is no authenticated session.
///
/// Clones share the same state.
#[derive(Clone, Debug)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

impl SessionContext {
    /// Creates a context for `client`, loading the stored session from `storage`.
    pub fn new(client: Client, storage: impl SessionStorage + 'static) -> crate::Result<Self> {
        let session = load_or_discard(&storage)?;
        tracing::debug!(logged_in = session.logged_in, role = ?session.role, "loaded session");

        Ok(Self {
            inner: Arc::new(ContextInner {
                client,
                storage: Box::new(storage),
                state: watch::Sender::new(session),
                in_flight: InFlight::default(),
            }),
        })
    }

    /// Returns the client used by this context.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Returns the current session.
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Re-reads the session from storage.
    ///
    /// This picks up logins and logouts performed by other contexts sharing the same storage.
    /// An unreadable record counts as logged out and is replaced by the next write.
    pub fn reload(&self) -> crate::Result<Session> {
        let session = load_or_discard(self.inner.storage.as_ref())?;
        self.publish(session.clone());
        Ok(session)
    }

    /// Logs in with `username` and `password`.
    ///
    /// On success the token, its scheme and the role decoded from the token are stored as a
    /// single record. A token without a recognizable role still logs in, with a session that
    /// has no role.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if a credential is blank. Nothing is sent in that case.
    /// - [`Error::InFlight`] if another login is pending.
    /// - [`AuthError::InvalidCredentials`] if the backend rejects the credentials.
    /// - [`AuthError::MissingToken`] if the response carries no token. The stored session is
    ///   left unchanged.
    pub async fn login(&self, username: &str, password: &str) -> crate::Result<Session> {
        self.authenticate(username, password, false).await
    }

    /// Like [`login`](Self::login), and additionally remembers the username across logouts.
    pub async fn login_remembered(&self, username: &str, password: &str) -> crate::Result<Session> {
        self.authenticate(username, password, true).await
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> crate::Result<Session> {
        if username.trim().is_empty() {
            return Err(Error::Validation { field: "username" });
        }
        if password.trim().is_empty() {
            return Err(Error::Validation { field: "password" });
        }

        let _permit = self.inner.in_flight.begin(Action::Login)?;
        tracing::info!(username, password_length = password.len(), "logging in");

        let response = self.inner.client.login(username, password).await?;
        let token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        tracing::debug!(
            token_length = token.len(),
            token_type = ?response.token_type,
            "received token"
        );

        let role = match token::decode_role(&token) {
            Ok(role) => Some(role),
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to decode role from token, continuing without role"
                );
                None
            }
        };

        let username = if remember {
            Some(username.to_owned())
        } else {
            self.session().username
        };

        let session = Session {
            token: Some(AccessToken::new(token)),
            scheme: response
                .token_type
                .filter(|scheme| !scheme.is_empty())
                .unwrap_or_else(default_scheme),
            logged_in: true,
            role,
            username,
        };

        self.inner.storage.store(&session)?;
        self.publish(session.clone());
        tracing::info!(role = ?session.role, "logged in");

        Ok(session)
    }

    /// Logs out, discarding the token and role.
    ///
    /// Only the remembered username is kept.
    pub fn logout(&self) -> crate::Result<()> {
        let session = self.session().logged_out();
        self.persist(&session)?;
        self.publish(session);
        tracing::info!("logged out");
        Ok(())
    }

    /// Checks that there is an authenticated session and returns a handle for protected
    /// operations.
    ///
    /// The session is re-read from storage first. No request is made if the check fails.
    pub fn require(&self) -> crate::Result<Authorized> {
        let session = self.reload()?;
        if !session.is_authenticated() {
            tracing::debug!(logged_in = session.logged_in, "no authenticated session");
            return Err(AuthError::LoginRequired.into());
        }

        Authorized::new(self.clone(), session)
    }

    /// Clears the session after the backend rejected `token`.
    ///
    /// Nothing happens if the stored session has moved on to a different token in the meantime.
    pub(crate) fn expire(&self, token: &AccessToken) -> crate::Result<()> {
        let current = load_or_discard(self.inner.storage.as_ref())?;
        if current.token.as_ref() != Some(token) {
            tracing::debug!("ignoring rejection of a replaced token");
            return Ok(());
        }

        tracing::warn!("backend rejected the access token, clearing session");
        let session = current.logged_out();
        self.persist(&session)?;
        self.publish(session);
        Ok(())
    }

    /// Writes a logged out `session`, removing the record entirely if it has nothing to keep.
    fn persist(&self, session: &Session) -> crate::Result<()> {
        if *session == Session::default() {
            self.inner.storage.clear()?;
        } else {
            self.inner.storage.store(session)?;
        }
        Ok(())
    }

    pub(crate) fn in_flight(&self) -> &InFlight {
        &self.inner.in_flight
    }

    fn publish(&self, session: Session) {
        self.inner.state.send_if_modified(|current| {
            if *current == session {
                return false;
            }
            *current = session;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStorage, MemoryStorage};

    fn context(storage: MemoryStorage) -> SessionContext {
        let client = Client::builder("http://localhost:1/").build().unwrap();
        SessionContext::new(client, storage).unwrap()
    }

    fn authenticated() -> Session {
        Session {
            token: Some(AccessToken::new("t0ken")),
            scheme: "Bearer".into(),
            logged_in: true,
            role: Some(Role::Pharmacist),
            username: Some("ana".into()),
        }
    }

    #[test]
    fn authorization_header() {
        assert_eq!(authenticated().authorization().as_deref(), Some("Bearer t0ken"));
        assert_eq!(Session::default().authorization(), None);
    }

    #[test]
    fn token_is_redacted() {
        let debug = format!("{:?}", authenticated());
        assert!(!debug.contains("t0ken"));
    }

    #[test]
    fn session_permissions() {
        let session = authenticated();
        assert!(session.can(Permission::ManageMedications));
        assert!(!session.can(Permission::ManageUsers));
        assert!(!Session::default().can(Permission::ViewLogs));
    }

    #[test]
    fn require_without_token() {
        let storage = MemoryStorage::new();
        storage
            .store(&Session {
                logged_in: true,
                ..Default::default()
            })
            .unwrap();

        let result = context(storage).require();
        assert!(matches!(result, Err(Error::Auth(AuthError::LoginRequired))));
    }

    #[test]
    fn require_logged_out() {
        let storage = MemoryStorage::new();
        storage
            .store(&Session {
                logged_in: false,
                ..authenticated()
            })
            .unwrap();

        let result = context(storage).require();
        assert!(matches!(result, Err(Error::Auth(AuthError::LoginRequired))));
    }

    #[test]
    fn require_authenticated() {
        let storage = MemoryStorage::new();
        storage.store(&authenticated()).unwrap();

        let authorized = context(storage).require().unwrap();
        assert_eq!(authorized.role(), Some(Role::Pharmacist));
    }

    #[test]
    fn logout_keeps_username_only() {
        let storage = MemoryStorage::new();
        storage.store(&authenticated()).unwrap();
        let context = context(storage.clone());
        let mut changes = context.subscribe();

        context.logout().unwrap();

        let expected = Session {
            username: Some("ana".into()),
            ..Default::default()
        };
        assert_eq!(storage.load().unwrap(), Some(expected.clone()));
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), expected);
    }

    #[test]
    fn reload_observes_other_writers() {
        let storage = MemoryStorage::new();
        let first = context(storage.clone());
        let second = context(storage.clone());

        storage.store(&authenticated()).unwrap();
        assert!(!first.session().is_authenticated());
        assert!(first.reload().unwrap().is_authenticated());

        second.logout().unwrap();
        assert!(matches!(first.require(), Err(Error::Auth(AuthError::LoginRequired))));
    }

    #[test]
    fn expire_ignores_replaced_token() {
        let storage = MemoryStorage::new();
        storage.store(&authenticated()).unwrap();
        let context = context(storage.clone());

        context.expire(&AccessToken::new("old token")).unwrap();
        assert!(context.session().is_authenticated());

        context.expire(&AccessToken::new("t0ken")).unwrap();
        assert!(!context.session().is_authenticated());
        assert_eq!(storage.load().unwrap().unwrap().token, None);
    }

    #[tokio::test]
    async fn login_rejects_blank_credentials() {
        let context = context(MemoryStorage::new());

        let result = context.login("  ", "secret").await;
        assert!(matches!(result, Err(Error::Validation { field: "username" })));

        let result = context.login("ana", "").await;
        assert!(matches!(result, Err(Error::Validation { field: "password" })));
    }

    #[test]
    fn logout_without_username_clears_storage() {
        let storage = MemoryStorage::new();
        storage
            .store(&Session {
                username: None,
                ..authenticated()
            })
            .unwrap();
        let context = context(storage.clone());

        context.logout().unwrap();

        assert_eq!(storage.load().unwrap(), None);
        assert_eq!(context.session(), Session::default());
    }

    #[test]
    fn discards_unreadable_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"token": "t0ken", "logged_"#).unwrap();

        let client = Client::builder("http://localhost:1/").build().unwrap();
        let context = SessionContext::new(client, FileStorage::new(&path)).unwrap();
        assert!(!context.session().is_authenticated());
        assert!(!context.reload().unwrap().is_authenticated());
        assert!(matches!(
            context.require(),
            Err(Error::Auth(AuthError::LoginRequired))
        ));

        // The next write replaces the broken record.
        context.logout().unwrap();
        assert!(!path.exists());
    }
}
