#![forbid(unsafe_code)]

//! Error taxonomy for the runtime.
//!
//! Lookups that callers may want to recover from (`try_context`,
//! `try_global`) return [`Result`]. Everything else here is a programmer
//! error: the runtime logs it at `error` level through [`fatal`] and panics,
//! because a malformed fiber tree cannot be repaired in place.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no context provider of type {type_name} above this fiber")]
    MissingContext { type_name: &'static str },

    #[error("no global of type {type_name} registered with the renderer")]
    MissingGlobal { type_name: &'static str },

    #[error("no renderer extension claims native element {type_name:?}")]
    NoExtension { type_name: &'static str },

    #[error("extension claimed native element {type_name:?} but created no native node")]
    MissingNativeNode { type_name: &'static str },

    #[error("duplicate key {key} in one keyed list snapshot")]
    DuplicateKey { key: String },

    #[error("native child index {index} out of range (host has {len} children)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid fiber tree: {message}")]
    InvalidTree { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_tree(message: impl Into<String>) -> Self {
        Self::InvalidTree {
            message: message.into(),
        }
    }

    /// Whether the error comes from a lookup a caller can recover from.
    #[must_use]
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::MissingContext { .. } | Self::MissingGlobal { .. })
    }
}

/// Log `error` and abort the current operation.
#[track_caller]
pub fn fatal(error: Error) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%error, %location, "sprig.fatal");
    panic!("{error}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = Error::DuplicateKey {
            key: "\"row-3\"".into(),
        };
        assert_eq!(err.to_string(), "duplicate key \"row-3\" in one keyed list snapshot");

        let err = Error::IndexOutOfRange { index: 4, len: 2 };
        assert!(err.to_string().contains("index 4"));
        assert!(err.to_string().contains("2 children"));
    }

    #[test]
    fn lookup_errors_are_recoverable() {
        assert!(Error::MissingGlobal { type_name: "u8" }.is_lookup());
        assert!(!Error::invalid_tree("x").is_lookup());
    }

    #[test]
    #[should_panic(expected = "invalid fiber tree: orphan")]
    fn fatal_panics_with_display() {
        fatal(Error::invalid_tree("orphan"));
    }
}
