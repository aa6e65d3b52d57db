#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Binary entry point for the Azubiheft tool server.

#[tokio::main]
async fn main() -> Result<(), azubiheft_server::StartupError> {
    azubiheft_server::run_server().await
}
