/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required item was missing.
    #[error("missing config item: {0}")]
    Missing(String),

    /// An integer could not be parsed.
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),

    /// A boolean could not be parsed.
    #[error(transparent)]
    ParseBool(#[from] std::str::ParseBoolError),
}

impl ConfigError {
    /// Missing config item error.
    pub fn missing(key: &str) -> Self {
        Self::Missing(key.to_owned())
    }
}
