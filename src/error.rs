#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// Catalog malformed or referencing an unknown resource, request or
    /// prerequisite. Fatal: aborts the run before any request is issued.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown resource id: {0}")]
    UnknownResource(String),

    /// A template referenced a state key that was never set.
    #[error("Unbound template variable: {0}")]
    UnboundVariable(String),

    /// Network failure, timeout or TLS error. Case-local.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Key loading or signing failure. Fatal at startup, case-local mid-run.
    #[error("Crypto error: {0}")]
    Crypto(String),
}
