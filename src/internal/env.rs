use std::{collections::HashMap, env::VarError};

use crate::ConfigureError;

/// Internal helper to get the `key` from the environment.
///
/// If `env` is provided, will use that instead of the process environment.
pub fn get_optional_env(
    key: &str,
    env: Option<&HashMap<String, String>>,
) -> Result<Option<String>, ConfigureError> {
    if let Some(env) = env {
        return Ok(env.get(key).cloned());
    }

    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigureError::InvalidConfigurationValue {
            parameter: "environment",
            value: format!("{key} is not valid UTF-8"),
        }),
    }
}

/// Read the machine hostname, falling back to `unknown`.
pub fn system_hostname() -> String {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}
