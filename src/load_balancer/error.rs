//! Load balancer error types.

use thiserror::Error;

/// Errors produced while building a balancer or selecting an instance.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// No instance addresses were supplied at construction.
    #[error("the instance address list is empty")]
    EmptyInstanceList,

    /// An instance address could not be parsed.
    #[error("failed to parse instance address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    /// The instance address uses a scheme the forwarder cannot speak.
    #[error("instance address `{address}` uses unsupported scheme `{scheme}`")]
    UnsupportedScheme { address: String, scheme: String },

    /// The instance address has no host or no port.
    #[error("instance address `{0}` has no host or port")]
    MissingHost(String),

    /// Every candidate drawn within the retry budget was dead or rejected.
    #[error("failed to find any alive instance after {attempts} attempts")]
    NoAliveInstance { attempts: usize },
}

impl BalancerError {
    /// True for errors raised while constructing a balancer.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, BalancerError::NoAliveInstance { .. })
    }
}
