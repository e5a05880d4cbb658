//! Helpers for loading configuration from the environment.

use crate::ConfigError;
use std::env;

/// Load a variable from the environment
pub fn load_string(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::missing(key))
}

/// Load a variable from the environment
pub fn load_string_opt(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Load a variable from the environment
pub fn load_u64(key: &str) -> Result<u64, ConfigError> {
    let val = load_string(key)?;
    val.parse::<u64>().map_err(Into::into)
}

/// Load a variable from the environment
pub fn load_u64_opt(key: &str) -> Option<u64> {
    load_string_opt(key)?.parse().ok()
}

/// Load a variable from the environment
pub fn load_bool(key: &str) -> Result<bool, ConfigError> {
    let val = load_string(key)?;
    val.parse::<bool>().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_round_trips() {
        std::env::set_var("MEDLEY_ENV_UTILS_TEST", "42");
        assert_eq!(load_string("MEDLEY_ENV_UTILS_TEST").unwrap(), "42");
        assert_eq!(load_u64("MEDLEY_ENV_UTILS_TEST").unwrap(), 42);
        assert_eq!(load_u64_opt("MEDLEY_ENV_UTILS_TEST"), Some(42));
        std::env::remove_var("MEDLEY_ENV_UTILS_TEST");
        assert!(matches!(load_string("MEDLEY_ENV_UTILS_TEST"), Err(ConfigError::Missing(_))));
        assert_eq!(load_string_opt("MEDLEY_ENV_UTILS_TEST"), None);
    }
}
