//! Error types for the driver
//!
//! This module defines error types for configuration building ([`BuilderError`])
//! and peripheral access ([`ResourceError`]).
//!
//! ## Error Types
//!
//! - [`BuilderError`] - Errors during configuration construction
//! - [`ResourceError`] - Failures of the GPIO collaborator (open, configure,
//!   callback registration, level reads)
//!
//! ## Example
//!
//! ```
//! use gpio_button::{Builder, BuilderError};
//!
//! // Missing pin name
//! let result = Builder::new().build();
//! assert!(matches!(result, Err(BuilderError::MissingPin)));
//!
//! // Empty pin name
//! let result = Builder::new().pin("").build();
//! assert!(matches!(result, Err(BuilderError::EmptyPinName)));
//! ```

/// Errors raised while talking to the GPIO peripheral
///
/// Generic over the platform error type so callers can still match on the
/// underlying hardware failure.
#[derive(Debug)]
pub enum ResourceError<E> {
    /// The pin could not be opened (already in use, unknown name, I/O failure)
    Open {
        /// Platform pin identifier that was requested
        pin: String,
        /// Platform error
        source: E,
    },
    /// Setting direction or edge trigger failed
    Configure(E),
    /// Registering the edge callback failed
    Register(E),
    /// Reading the pin level failed
    Read(E),
    /// The connection was already closed
    Closed,
}

impl<E> ResourceError<E> {
    /// The platform error behind this failure, if any
    pub fn source_error(&self) -> Option<&E> {
        match self {
            ResourceError::Open { source, .. } => Some(source),
            ResourceError::Configure(e) | ResourceError::Register(e) | ResourceError::Read(e) => {
                Some(e)
            }
            ResourceError::Closed => None,
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for ResourceError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceError::Open { pin, source } => {
                write!(f, "Failed to open pin {pin}: {source:?}")
            }
            ResourceError::Configure(e) => write!(f, "Failed to configure pin: {e:?}"),
            ResourceError::Register(e) => write!(f, "Failed to register edge callback: {e:?}"),
            ResourceError::Read(e) => write!(f, "Failed to read pin level: {e:?}"),
            ResourceError::Closed => write!(f, "Pin connection is closed"),
        }
    }
}

impl<E: core::fmt::Debug> core::error::Error for ResourceError<E> {}

/// Errors that can occur when building configuration
#[derive(Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// Pin name was not specified
    ///
    /// [`Builder::pin()`](crate::config::Builder::pin) must be called before building.
    MissingPin,
    /// Pin name was specified but empty
    EmptyPinName,
}

impl core::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BuilderError::MissingPin => write!(f, "Pin name must be specified"),
            BuilderError::EmptyPinName => write!(f, "Pin name must not be empty"),
        }
    }
}

impl core::error::Error for BuilderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_names_the_pin() {
        let err: ResourceError<&str> = ResourceError::Open {
            pin: "GPIO6".to_string(),
            source: "busy",
        };
        assert_eq!(err.to_string(), "Failed to open pin GPIO6: \"busy\"");
        assert_eq!(err.source_error(), Some(&"busy"));
    }

    #[test]
    fn closed_has_no_source() {
        let err: ResourceError<()> = ResourceError::Closed;
        assert!(err.source_error().is_none());
    }
}
