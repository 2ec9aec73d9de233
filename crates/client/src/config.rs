//! Layered client configuration loading.

use crate::error::UploadResult;
use bundler_core::ClientConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::path::Path;

/// Environment variable prefix; nested keys use `__` (`BUNDLER_RETRY__RETRIES`).
pub const ENV_PREFIX: &str = "BUNDLER_";

/// Load configuration from defaults, an optional TOML file, then the
/// environment, and validate the result.
pub fn load_config(path: Option<&Path>) -> UploadResult<ClientConfig> {
    let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));

    if let Some(path) = path
        && path.exists()
    {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: ClientConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
