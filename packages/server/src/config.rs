//! Start-up configuration read from the environment.

use azubiheft_scraper::DEFAULT_BASE_URL;
use azubiheft_scraper_models::Credentials;

/// Username for the auto-login default session.
pub const USERNAME_VAR: &str = "AZUBIHEFT_USERNAME";
/// Password for the auto-login default session.
pub const PASSWORD_VAR: &str = "AZUBIHEFT_PASSWORD";
/// Overrides the remote application's address.
pub const BASE_URL_VAR: &str = "AZUBIHEFT_BASE_URL";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address of the remote application.
    pub base_url: String,
    /// Credentials for the default session, if both variables are set.
    pub default_credentials: Option<Credentials>,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let default_credentials = match (get(USERNAME_VAR), get(PASSWORD_VAR)) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            (Some(_), None) | (None, Some(_)) => {
                log::warn!("Only one of {USERNAME_VAR}/{PASSWORD_VAR} is set, skipping auto-login");
                None
            }
            (None, None) => None,
        };

        Self {
            base_url: get(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            default_credentials,
        }
    }
}
