//! Small helpers shared by the bibfmt subcrates. This crate exists to keep
//! the frequently-recompiled core crate lean.
//!
//! **This crate is not semver compliant**. The version is locked to the root
//! `bibfmt` crate version.

#[cfg(any(test, feature = "test"))]
mod test_util;

use std::fmt::Display;
use tracing::error;

/// Extension trait for [Result]
pub trait ResultTraced<T, E>: Sized {
    /// If this is an error, trace it. Return the same result.
    #[must_use]
    fn traced(self) -> Self;
}

impl<T, E: Display> ResultTraced<T, E> for Result<T, E> {
    fn traced(self) -> Self {
        self.inspect_err(|err| error!(error = %err))
    }
}
