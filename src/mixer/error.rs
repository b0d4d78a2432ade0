//! Error types for mixer operations.

use thiserror::Error;

/// Error registering user addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("at least one user address is required")]
    NoAddresses,
}
