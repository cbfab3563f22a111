//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Profile overrides from `[profiles.<name>]`
//! 4. Environment variables (`CROWDFUND_*` prefix)

use crate::foundation::{EscrowError, Result};
use crate::infrastructure::config::types::EscrowConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::{Dict, Map};
use figment::{Figment, Profile};
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

/// Environment variable prefix for config overrides.
///
/// Example: `CROWDFUND_NOTARY__TIME_TOLERANCE_SECS` -> `notary.time_tolerance_secs`
pub const ENV_PREFIX: &str = "CROWDFUND_";

#[derive(Debug, Default, Deserialize)]
struct ProfilesRaw {
    #[serde(default)]
    profiles: Option<Map<String, Dict>>,
}

/// Load configuration from a TOML file, apply env overrides and validate.
pub fn load_config_from_file(path: &Path) -> Result<EscrowConfig> {
    info!("loading configuration path={}", path.display());
    let config: EscrowConfig = figment_base(path).merge(env_provider()).extract()?;
    finish(config)
}

/// Load configuration from a TOML file with `[profiles.<profile>]` applied on top.
pub fn load_config_from_file_with_profile(path: &Path, profile: &str) -> Result<EscrowConfig> {
    info!("loading configuration path={} profile={}", path.display(), profile);

    let raw: ProfilesRaw = figment_base(path).extract()?;
    let overrides = raw
        .profiles
        .and_then(|mut profiles| profiles.remove(profile))
        .ok_or_else(|| EscrowError::ConfigError(format!("profile '{profile}' not found in {}", path.display())))?;

    let config: EscrowConfig =
        figment_base(path).merge(Serialized::from(overrides, Profile::Default)).merge(env_provider()).extract()?;
    finish(config)
}

/// Defaults plus environment overrides; no file.
pub fn load_config_from_env() -> Result<EscrowConfig> {
    let config: EscrowConfig = Figment::new().merge(Serialized::defaults(EscrowConfig::default())).merge(env_provider()).extract()?;
    finish(config)
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn figment_base(path: &Path) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(EscrowConfig::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        debug!("configuration file missing; using defaults and env only path={}", path.display());
    }
    figment
}

fn finish(config: EscrowConfig) -> Result<EscrowConfig> {
    if let Err(errors) = config.validate() {
        return Err(EscrowError::ConfigError(format!("config validation failed: {:?}", errors)));
    }
    debug!(
        "configuration loaded node={} notary={} broadcast_to_observers={}",
        config.node.name, config.notary.name, config.settlement.broadcast_to_observers
    );
    Ok(config)
}
