use crate::authenticator::Authenticators;

/// Per-connection settings.
///
/// ```
/// use async_imap_engine::Config;
///
/// let config = Config {
///     tag_prefix: "RUST".into(),
///     ..Config::default()
/// };
/// assert!(config.authenticators.mechanisms().contains(&"CRAM-MD5".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix of every command tag; the counter follows as four or more digits.
    pub tag_prefix: String,
    /// The SASL mechanisms available to `AUTHENTICATE`.
    pub authenticators: Authenticators,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tag_prefix: "A".into(),
            authenticators: Authenticators::default(),
        }
    }
}
