use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AuthError;

const USER_AGENT: &str = concat!("mediport-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
struct ClientBuilderInner {
    service_url: Url,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder(crate::Result<ClientBuilderInner>);

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`], configured with the given `service_url`.
    ///
    /// All endpoints are resolved relative to the service URL, so a service mounted under a path
    /// prefix works as long as the URL ends with a slash.
    pub fn new(service_url: impl reqwest::IntoUrl) -> Self {
        let service_url = match service_url.into_url() {
            Ok(url) => url,
            Err(err) => return Self(Err(err.into())),
        };

        let reqwest_builder = reqwest::Client::builder()
            // The backend is reached over the public network, so these are generous. They can be
            // overridden by the caller.
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            service_url,
            reqwest_builder,
        }))
    }

    /// Sets both the connect and the read timeout for the [`reqwest::Client`].
    /// For more fine-grained configuration, use [`Self::configure_reqwest`].
    pub fn timeout(self, timeout: Duration) -> Self {
        self.configure_reqwest(|builder| builder.connect_timeout(timeout).read_timeout(timeout))
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let Ok(inner) = self.0 else { return self };
        Self(Ok(ClientBuilderInner {
            service_url: inner.service_url,
            reqwest_builder: closure(inner.reqwest_builder),
        }))
    }

    /// Returns a [`Client`] that uses this [`ClientBuilder`] configuration.
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - the given `service_url` is invalid or cannot be a base URL
    /// - the [`reqwest::Client`] fails to build. Refer to [`reqwest::ClientBuilder::build`] for
    ///   more information on when this can happen.
    pub fn build(self) -> crate::Result<Client> {
        let inner = self.0?;
        if inner.service_url.cannot_be_a_base() {
            return Err(crate::Error::InvalidUrl {
                message: format!("`{}` cannot be used as service URL", inner.service_url),
            });
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                reqwest: inner.reqwest_builder.build()?,
                service_url: inner.service_url,
            }),
        })
    }
}

#[derive(Debug)]
struct ClientInner {
    reqwest: reqwest::Client,
    service_url: Url,
}

/// A client for the MediPort backend. Use [`Client::builder`] to configure and construct this.
///
/// To perform operations, wrap the client in a [`SessionContext`](crate::SessionContext), log in,
/// and use the [`Authorized`](crate::Authorized) handle returned by
/// [`require`](crate::SessionContext::require).
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    detail: Option<serde_json::Value>,
}

impl Client {
    /// Convenience function to create a [`ClientBuilder`].
    pub fn builder(service_url: impl reqwest::IntoUrl) -> ClientBuilder {
        ClientBuilder::new(service_url)
    }

    /// Returns the URL all endpoints are resolved against.
    pub fn service_url(&self) -> &Url {
        &self.inner.service_url
    }

    pub(crate) fn reqwest(&self) -> &reqwest::Client {
        &self.inner.reqwest
    }

    /// Resolves an endpoint from path segments.
    ///
    /// Segments are percent-encoded. A trailing empty segment produces a trailing slash.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> crate::Result<Url> {
        let mut url = self.inner.service_url.clone();
        url.path_segments_mut()
            .map_err(|()| crate::Error::InvalidUrl {
                message: format!("`{}` cannot be used as service URL", self.inner.service_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends the credentials to the authentication endpoint.
    pub(crate) async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> crate::Result<LoginResponse> {
        let url = self.endpoint(&["login"])?;
        tracing::debug!(%url, "sending login request");

        let response = self
            .inner
            .reqwest
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = error_message(response)
                .await
                .unwrap_or_else(|| "invalid credentials".to_owned());
            return Err(AuthError::InvalidCredentials(message).into());
        }
        if !status.is_success() {
            return Err(unexpected_status(response).await);
        }

        Ok(response.json().await?)
    }
}

/// Extracts the error message from a JSON error body.
///
/// Both `{"message": ...}` and `{"detail": ...}` bodies are understood.
pub(crate) async fn error_message(response: reqwest::Response) -> Option<String> {
    let body: ErrorBody = response.json().await.ok()?;
    match (body.message, body.detail) {
        (Some(message), _) => Some(message),
        (None, Some(serde_json::Value::String(detail))) => Some(detail),
        (None, Some(detail)) => Some(detail.to_string()),
        (None, None) => None,
    }
}

/// Converts a non-successful response into [`Error::UnexpectedStatus`](crate::Error).
pub(crate) async fn unexpected_status(response: reqwest::Response) -> crate::Error {
    let status = response.status();
    let message = error_message(response).await;
    tracing::debug!(%status, ?message, "unexpected response");
    crate::Error::UnexpectedStatus { status, message }
}
