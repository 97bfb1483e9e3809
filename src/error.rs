//! Core error taxonomy.
//!
//! Three variants: a bad cartridge image, a failure talking to the host
//! filesystem, and an internal invariant violation that should never be
//! observable outside of a bug in the bus address decoder.

use std::fmt;

/// Errors the core can report. Only ever surfaced from `init`/`deinit`-time
/// operations; nothing in the per-tick hot path is fallible.
#[derive(Debug)]
pub enum CoreError {
    /// The ROM image failed header validation or uses an unsupported MBC.
    InvalidCartridge { reason: String },
    /// Reading the ROM or writing the save/RTC file failed.
    IoFailure { source: std::io::Error },
    /// The bus address decoder reached an address it cannot classify.
    InternalInvariant { detail: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidCartridge { reason } => {
                write!(f, "invalid cartridge: {reason}")
            }
            CoreError::IoFailure { source } => write!(f, "I/O failure: {source}"),
            CoreError::InternalInvariant { detail } => {
                write!(f, "internal invariant violated: {detail}")
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::IoFailure { source } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(source: std::io::Error) -> Self {
        CoreError::IoFailure { source }
    }
}

/// Map a `CoreError` to the small negative status codes used at the C-ABI
/// boundary, mirroring the reference export convention of returning `i32`.
pub fn status_code(err: &CoreError) -> i32 {
    match err {
        CoreError::InvalidCartridge { .. } => -1,
        CoreError::IoFailure { .. } => -2,
        CoreError::InternalInvariant { .. } => -3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let e = CoreError::InvalidCartridge { reason: "too small".into() };
        assert!(e.to_string().contains("too small"));
    }

    #[test]
    fn status_codes_are_distinct() {
        let a = CoreError::InvalidCartridge { reason: String::new() };
        let b = CoreError::InternalInvariant { detail: String::new() };
        assert_ne!(status_code(&a), status_code(&b));
    }
}
