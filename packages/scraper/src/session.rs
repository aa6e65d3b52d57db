//! The authenticated session and its login state.

use azubiheft_scraper_models::Credentials;
use scraper::Html;

use crate::transport::{FormRequest, HttpTransport, RawResponse, Transport};
use crate::{AzubiheftError, tokens};

/// Login form page.
pub(crate) const LOGIN_PATH: &str = "/Login.aspx";
/// Landing page that is only reachable while logged in.
pub(crate) const PROBE_PATH: &str = "/Azubi/Default.aspx";
/// Logout endpoint.
pub(crate) const LOGOUT_PATH: &str = "/Azubi/Abmelden.aspx";

/// Markup of the logout control, present on every page of a logged-in user.
const LOGOUT_MARKER: &str = r#"id="Abmelden""#;

/// Whether `body` is a page rendered for a logged-in user.
///
/// This is the only place that knows how the remote application signals an
/// authenticated page.
#[must_use]
pub fn is_authenticated(body: &str) -> bool {
    body.contains(LOGOUT_MARKER)
}

/// One authenticated connection to the remote application.
///
/// A session is safe to share between tasks. Operations are not serialized:
/// concurrent writes race at the remote server exactly as two browser tabs
/// would.
pub struct Session {
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("origin", &self.transport.origin())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an unauthenticated session against `base_url` using the HTTP
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str) -> Result<Self, AzubiheftError> {
        Ok(Self::with_transport(HttpTransport::new(base_url)?))
    }

    /// Creates a session on top of an arbitrary transport.
    #[must_use]
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// GETs `path`, mapping transport failures to [`AzubiheftError::Transport`].
    pub(crate) async fn fetch(
        &self,
        path: &str,
        step: &'static str,
    ) -> Result<RawResponse, AzubiheftError> {
        self.transport
            .get(path)
            .await
            .map_err(|e| AzubiheftError::transport(step, e))
    }

    /// GETs `path` and requires a 2xx status.
    pub(crate) async fn fetch_page(
        &self,
        path: &str,
        step: &'static str,
    ) -> Result<RawResponse, AzubiheftError> {
        let response = self.fetch(path, step).await?;
        ensure_success(response, step)
    }

    /// POSTs `request`, mapping transport failures to
    /// [`AzubiheftError::Transport`]. The status is not checked.
    pub(crate) async fn submit(
        &self,
        request: &FormRequest,
        step: &'static str,
    ) -> Result<RawResponse, AzubiheftError> {
        self.transport
            .post_form(request)
            .await
            .map_err(|e| AzubiheftError::transport(step, e))
    }

    /// Logs in with `credentials`.
    ///
    /// The login response is not trusted (the site answers 200 on failure
    /// too); success is confirmed by probing an authenticated page.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Authentication`] if the probe after the
    /// login post does not show a logged-in page, and
    /// [`AzubiheftError::Transport`] if a request fails.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), AzubiheftError> {
        let page = self.fetch(LOGIN_PATH, "fetching login page").await?;
        let form_tokens = tokens::extract_tokens(&Html::parse_document(&page.body));

        let request = FormRequest::new(LOGIN_PATH)
            .with_fields(form_tokens.into_fields())
            .with_field(
                "ctl00$ContentPlaceHolder1$txt_Benutzername",
                credentials.username.as_str(),
            )
            .with_field(
                "ctl00$ContentPlaceHolder1$txt_Passwort",
                credentials.password.as_str(),
            )
            .with_field("ctl00$ContentPlaceHolder1$chk_Persistent", "on")
            .with_field("ctl00$ContentPlaceHolder1$cmd_Login", "Anmelden")
            .with_field("ctl00$ContentPlaceHolder1$HiddenField_isMobile", "false");

        let response = self.submit(&request, "submitting login form").await?;
        log::debug!("Login form answered with status {}", response.status);

        if !self.is_logged_in().await {
            return Err(AzubiheftError::Authentication {
                message: format!("invalid credentials for user '{}'", credentials.username),
            });
        }

        log::info!("Logged in as {}", credentials.username);
        Ok(())
    }

    /// Ends the session on the remote side.
    ///
    /// Best effort: the response is not inspected.
    ///
    /// # Errors
    ///
    /// Returns [`AzubiheftError::Transport`] if the request fails.
    pub async fn logout(&self) -> Result<(), AzubiheftError> {
        let response = self.fetch(LOGOUT_PATH, "logging out").await?;
        log::debug!("Logout answered with status {}", response.status);
        Ok(())
    }

    /// Whether the remote application currently considers this session
    /// logged in. A failed probe counts as logged out.
    pub async fn is_logged_in(&self) -> bool {
        match self.transport.get(PROBE_PATH).await {
            Ok(response) => is_authenticated(&response.body),
            Err(e) => {
                log::warn!("Login probe failed: {e}");
                false
            }
        }
    }
}

/// Turns a non-2xx response into [`AzubiheftError::RemoteRequest`].
pub(crate) fn ensure_success(
    response: RawResponse,
    step: &'static str,
) -> Result<RawResponse, AzubiheftError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(AzubiheftError::RemoteRequest {
            step,
            status: response.status,
            body: response.body,
        })
    }
}
