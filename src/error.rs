//! Crate-wide error type.
//!
//! A plain `Kind` enum, an optional human-readable context string,
//! `Display`/`std::error::Error`, and narrow `From` conversions from
//! subsystem-local error types so call sites can use `?` without manual
//! mapping.

use core::fmt;

/// Coarse classification of crate-wide errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A transactional mutation observed a version mismatch against its
    /// expected `(generation, lease_id)` guard (§4.1, §7.5).
    OptimisticConcurrencyControlFailure,
    /// The caller's lease was not valid at the time of the operation (§7.4).
    LeaseLost,
    /// A round or engine-state invariant would be violated by the attempted
    /// mutation (§3 invariants).
    InvariantViolation,
    /// The referenced entity does not exist.
    NotFound,
    /// The LLM adapter exhausted its retries or returned a validation
    /// failure (§7 kinds 1-2).
    Adapter,
    /// Malformed or unauthorized HTTP input (§7 kinds 8-9).
    Http,
    /// Configuration is missing or malformed.
    Config,
}

/// The crate-wide error type.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
}

impl Error {
    /// Creates a new error of the given kind with no context.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attaches human-readable context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Returns the error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error's context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// `true` iff this is an OCC failure the caller should retry or
    /// reconfirm against (§4.1).
    #[must_use]
    pub const fn is_occ_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::OptimisticConcurrencyControlFailure)
    }

    /// `true` iff this signals that the caller's lease is no longer valid.
    #[must_use]
    pub const fn is_lease_lost(&self) -> bool {
        matches!(self.kind, ErrorKind::LeaseLost)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.kind {
            ErrorKind::OptimisticConcurrencyControlFailure => {
                "optimistic concurrency control failure"
            }
            ErrorKind::LeaseLost => "lease lost or invalid",
            ErrorKind::InvariantViolation => "invariant violation",
            ErrorKind::NotFound => "not found",
            ErrorKind::Adapter => "LLM adapter error",
            ErrorKind::Http => "HTTP error",
            ErrorKind::Config => "configuration error",
        };
        write!(f, "{msg}")?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occ_failure_is_flagged() {
        let e = Error::new(ErrorKind::OptimisticConcurrencyControlFailure);
        assert!(e.is_occ_failure());
        assert!(!e.is_lease_lost());
    }

    #[test]
    fn display_includes_context() {
        let e = Error::new(ErrorKind::NotFound).with_context("round-42");
        let s = e.to_string();
        assert!(s.contains("not found"));
        assert!(s.contains("round-42"));
    }
}
