use mediport_types::{Permission, Role, auth};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use url::Url;

use crate::action::{Action, ActionPermit};
use crate::client::unexpected_status;
use crate::session::{AccessToken, Session, SessionContext};
use crate::{AuthError, Error};

/// A handle for operations that need an authenticated session.
///
/// Obtained from [`SessionContext::require`]. The handle carries a snapshot of the session taken
/// at that point; every request it sends uses that snapshot's token.
///
/// The permission helpers ([`can`](Self::can) and friends) decide which actions to offer. The
/// backend still authorizes every request on its own.
#[derive(Clone, Debug)]
pub struct Authorized {
    context: SessionContext,
    session: Session,
    token: AccessToken,
    authorization: String,
}

impl Authorized {
    pub(crate) fn new(context: SessionContext, session: Session) -> crate::Result<Self> {
        let (Some(token), Some(authorization)) = (session.token.clone(), session.authorization())
        else {
            return Err(AuthError::LoginRequired.into());
        };

        Ok(Self {
            context,
            session,
            token,
            authorization,
        })
    }

    /// Returns the session this handle was created with.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the role of the logged in user, if known.
    pub fn role(&self) -> Option<Role> {
        self.session.role
    }

    /// Checks whether the user's role is granted `permission`.
    pub fn can(&self, permission: Permission) -> bool {
        auth::has_permission(self.role(), permission)
    }

    /// Checks whether the user's role is granted at least one of `permissions`.
    pub fn can_any(&self, permissions: &[Permission]) -> bool {
        auth::has_any_permission(self.role(), permissions)
    }

    /// Checks whether the user's role is granted all of `permissions`.
    pub fn can_all(&self, permissions: &[Permission]) -> bool {
        auth::has_all_permissions(self.role(), permissions)
    }

    pub(crate) fn begin(&self, action: Action) -> crate::Result<ActionPermit> {
        self.context.in_flight().begin(action)
    }

    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> crate::Result<reqwest::RequestBuilder> {
        let url: Url = self.context.client().endpoint(segments)?;
        tracing::debug!(%method, %url, "sending request");

        Ok(self
            .context
            .client()
            .reqwest()
            .request(method, url)
            .header(AUTHORIZATION, &self.authorization))
    }

    /// Sends a request and applies the response policy.
    ///
    /// `401 Unauthorized` expires the session. Other unsuccessful statuses are returned as
    /// [`Error::UnexpectedStatus`]. Nothing is retried.
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> crate::Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.context.expire(&self.token)?;
            return Err(AuthError::SessionExpired.into());
        }
        if !status.is_success() {
            return Err(unexpected_status(response).await);
        }

        Ok(response)
    }

    pub(crate) async fn get_json<T>(&self, segments: &[&str]) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.request(reqwest::Method::GET, segments)?;
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }
}

/// Required-field validation, performed before a record is sent.
pub trait Validate {
    /// Fails with [`Error::Validation`] naming the first missing field.
    fn validate(&self) -> crate::Result<()>;
}

pub(crate) fn required(field: &'static str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation { field });
    }
    Ok(())
}
