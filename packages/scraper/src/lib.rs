#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stateful scraping client for the Azubiheft report book.
//!
//! Azubiheft is an ASP.NET WebForms application without a public API. A
//! [`Session`] drives it the way a browser does: it round-trips the hidden
//! view-state fields ([`tokens`]), keeps the session cookie in the
//! transport's cookie jar ([`transport`]) and posts the exact form and AJAX
//! payloads the site's own JavaScript would send.
//!
//! Operations are grouped by page:
//!
//! * authentication ([`Session::login`], [`Session::logout`],
//!   [`Session::is_logged_in`])
//! * subjects ([`subjects`])
//! * week resolution ([`weeks`])
//! * report entries ([`reports`])
//!
//! Nothing is cached and nothing is retried: every call hits the remote
//! application and the first failure is returned to the caller.

mod html;
pub mod reports;
mod session;
pub mod subjects;
pub mod tokens;
pub mod transport;
pub mod weeks;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use azubiheft_scraper_models as models;
pub use session::{Session, is_authenticated};
pub use transport::{FormRequest, HttpTransport, RawResponse, Transport, TransportFailure};

/// Public address of the remote application.
pub const DEFAULT_BASE_URL: &str = "https://www.azubiheft.de";

/// Errors returned by [`Session`] operations.
#[derive(Debug, thiserror::Error)]
pub enum AzubiheftError {
    /// The HTTP exchange itself failed (DNS, TLS, connection, body read).
    #[error("Transport error while {step}: {source}")]
    Transport {
        /// The sub-step that was being performed.
        step: &'static str,
        /// Underlying transport error.
        #[source]
        source: TransportFailure,
    },

    /// The fetched page did not have the expected structure.
    #[error("Parse error while {step}: {message}")]
    Parse {
        /// The sub-step that was being performed.
        step: &'static str,
        /// Description of what was missing.
        message: String,
    },

    /// The credentials were rejected or the post-login probe failed.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of the failure.
        message: String,
    },

    /// No week tile matched the requested date.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was looked up.
        message: String,
    },

    /// A caller-supplied argument was out of range or malformed.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the invalid argument.
        message: String,
    },

    /// The remote application answered with a non-success status.
    #[error("Remote request failed while {step}: status {status}, body: {body}")]
    RemoteRequest {
        /// The sub-step that was being performed.
        step: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnosis.
        body: String,
    },
}

impl AzubiheftError {
    pub(crate) fn transport(step: &'static str, source: TransportFailure) -> Self {
        Self::Transport { step, source }
    }

    pub(crate) fn parse(step: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            step,
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
