use std::path::{Path, PathBuf};

use rust_cli_config::builder::DefaultState;
use rust_cli_config::{ConfigBuilder, File};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::{Environment, UnknownEnvironment};

/// Directory containing configuration files, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// File stem of the always-loaded base configuration.
const BASE_CONFIG_STEM: &str = "base";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator for nested configuration keys in environment variables.
///
/// `APP_INGEST__LOOKBACK_STEP_DAYS=30` overrides `ingest.lookback_step_days`.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The runtime environment name was not recognized.
    #[error(transparent)]
    Environment(#[from] UnknownEnvironment),
    /// Reading or deserializing the configuration sources failed.
    #[error("failed to load configuration: {0}")]
    Config(#[from] rust_cli_config::ConfigError),
}

/// Loads a configuration value of type `T` from layered sources.
///
/// Sources are applied in order of increasing precedence:
/// 1. `configuration/base.yaml` (optional),
/// 2. `configuration/{dev|prod}.yaml` for the current [`Environment`] (optional),
/// 3. `APP`-prefixed environment variables.
pub fn load_config<T>() -> Result<T, LoadError>
where
    T: DeserializeOwned,
{
    let environment = Environment::load()?;
    let configuration_dir = PathBuf::from(CONFIGURATION_DIR);

    let mut builder = ConfigBuilder::<DefaultState>::default();
    builder = add_config_file(builder, &configuration_dir, BASE_CONFIG_STEM);
    builder = add_config_file(builder, &configuration_dir, environment.as_str());
    builder = builder.add_source(
        rust_cli_config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
    );

    let settings = builder.build()?;

    Ok(settings.try_deserialize::<T>()?)
}

fn add_config_file(
    builder: ConfigBuilder<DefaultState>,
    dir: &Path,
    stem: &str,
) -> ConfigBuilder<DefaultState> {
    let path = dir.join(format!("{stem}.yaml"));
    builder.add_source(File::from(path).required(false))
}
