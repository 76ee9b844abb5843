//! Environment overrides for the sink tunables

use std::str::FromStr;

use contracts::{
    ContractError, SinkSettings, ENV_CONCURRENT_WRITERS, ENV_CONNECTION_TTL, ENV_POOL_SIZE,
    ENV_TRANSACTION_BATCH_SIZE,
};

/// Defaults overlaid with the process environment
pub fn sink_settings_from_env() -> Result<SinkSettings, ContractError> {
    let mut settings = SinkSettings::default();
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Overlay the process environment onto `settings`
pub fn apply_env_overrides(settings: &mut SinkSettings) -> Result<(), ContractError> {
    apply_overrides_from(settings, |key| std::env::var(key).ok())
}

/// Overlay values produced by `lookup` onto `settings`
///
/// Unset or blank variables leave the current value alone; anything else
/// must parse as a number.
pub fn apply_overrides_from<F>(settings: &mut SinkSettings, lookup: F) -> Result<(), ContractError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = read(&lookup, ENV_POOL_SIZE)? {
        settings.pool_size = v;
    }
    if let Some(v) = read(&lookup, ENV_CONNECTION_TTL)? {
        settings.connection_ttl_minutes = v;
    }
    if let Some(v) = read(&lookup, ENV_TRANSACTION_BATCH_SIZE)? {
        settings.transaction_batch_size = v;
    }
    if let Some(v) = read(&lookup, ENV_CONCURRENT_WRITERS)? {
        settings.concurrent_writers = v;
    }
    Ok(())
}

fn read<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ContractError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| {
        ContractError::config_parse(format!("environment variable {key}: invalid number \"{raw}\""))
    })
}
