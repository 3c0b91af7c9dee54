//! Error types for the scrambler.

use alloc::string::String;

/// Errors produced at the input boundary.
///
/// The scrambler itself is total: [`fein`](crate::fein) and
/// [`fynd`](crate::fynd) never fail on a number. Only turning text into a
/// number can.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The text is not a non-negative decimal integer.
    #[error("invalid integer string: {0}")]
    InvalidInput(String),
}
