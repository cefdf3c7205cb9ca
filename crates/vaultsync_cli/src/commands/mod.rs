//! CLI command implementations.

pub mod audit;
pub mod migrate;
pub mod sync;

use crate::config::ConfigFile;
use crate::http_client::ReqwestClient;
use vaultsync_engine::HttpSourceClient;

/// Builds the repository client described by the configuration.
pub fn source_client(
    config: &ConfigFile,
) -> Result<HttpSourceClient<ReqwestClient>, Box<dyn std::error::Error>> {
    Ok(HttpSourceClient::new(config.source_config()?, ReqwestClient::new()?))
}
