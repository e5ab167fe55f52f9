// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by transform linking and copying.
//!
//! Every failing operation leaves the receiver exactly as it was; the error
//! is both returned and logged through [`log::error!`].

use core::fmt;

/// Result alias for fallible transform operations.
pub type TransformResult<T = ()> = Result<T, TransformError>;

/// The entry point that rejected a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Linking an explicit inverse.
    SetInverse,
    /// Copying another transform's state.
    DeepCopy,
    /// Adding a transform to a composed transform.
    Concatenate,
    /// Setting the input of a composed transform.
    SetInput,
}

impl Operation {
    /// Returns the operation name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetInverse => "SetInverse",
            Self::DeepCopy => "DeepCopy",
            Self::Concatenate => "Concatenate",
            Self::SetInput => "SetInput",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a link or copy between transforms was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The argument's kind cannot stand in for the receiver's kind.
    #[error("{operation}: requires a {expected}, a {found} is not compatible")]
    TypeMismatch {
        /// Which operation failed.
        operation: Operation,
        /// Kind of the receiver.
        expected: &'static str,
        /// Kind of the argument.
        found: &'static str,
    },
    /// The link would make a transform depend on itself.
    #[error("{operation}: this would create a circular reference")]
    CircularReference {
        /// Which operation failed.
        operation: Operation,
    },
}

impl TransformError {
    /// Returns the operation that failed.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::TypeMismatch { operation, .. } | Self::CircularReference { operation } => {
                *operation
            }
        }
    }

    /// Logs this error and hands it back, for use in `Err(..)` position.
    pub(crate) fn report(self) -> Self {
        log::error!("{self}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        let err = TransformError::TypeMismatch {
            operation: Operation::SetInverse,
            expected: "MatrixTransform",
            found: "ComposedTransform",
        };
        assert_eq!(
            err.to_string(),
            "SetInverse: requires a MatrixTransform, a ComposedTransform is not compatible"
        );
        let err = TransformError::CircularReference {
            operation: Operation::DeepCopy,
        };
        assert_eq!(
            err.to_string(),
            "DeepCopy: this would create a circular reference"
        );
        assert_eq!(err.operation(), Operation::DeepCopy);
    }
}
