#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tool server for the Azubiheft report book.
//!
//! Exposes the scraping client as JSON-RPC tools over stdin/stdout, one
//! message per line. Sessions are opened by the `azubiheft_login` tool and
//! addressed by the returned handle; when credentials are configured in the
//! environment a `default` session is opened at start-up and used whenever
//! a call omits the handle.

pub mod config;
pub mod registry;
pub mod server;
pub mod service;

use std::sync::Arc;

pub use config::Config;
pub use registry::{
    DEFAULT_HANDLE, HttpSessionFactory, RegistryError, SessionFactory, SessionRegistry,
};
pub use server::serve;
pub use service::{AzubiheftService, ServiceError};

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configured base URL is unusable.
    #[error("Invalid configuration: {0}")]
    Config(#[from] azubiheft_scraper::AzubiheftError),

    /// Reading stdin or writing stdout failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the tool server on stdin/stdout until stdin closes.
///
/// Logging goes to stderr. A failed auto-login is logged and the server
/// starts without a default session.
///
/// # Errors
///
/// Returns [`StartupError`] if the base URL is invalid or stdio fails.
pub async fn run_server() -> Result<(), StartupError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = Config::from_env();
    log::info!("Using remote application at {}", config.base_url);

    let factory = HttpSessionFactory::new(&config.base_url)?;
    let service = Arc::new(AzubiheftService::new(factory));

    if let Some(credentials) = &config.default_credentials {
        match service.login_default(credentials).await {
            Ok(()) => log::info!("Default session ready for {}", credentials.username),
            Err(e) => log::error!("Auto-login for {} failed: {e}", credentials.username),
        }
    }

    log::info!("Serving tools on stdio");
    serve(service, tokio::io::stdin(), tokio::io::stdout()).await?;
    log::info!("Input closed, shutting down");
    Ok(())
}
