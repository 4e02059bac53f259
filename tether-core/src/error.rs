//! Error types for Tether

use thiserror::Error;

/// Tether error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Container could not be resolved to a live process
    #[error("Container {container_id} is not running: {reason}")]
    ContainerNotRunning {
        /// Container that was looked up
        container_id: String,
        /// Why the lookup failed
        reason: String,
    },

    /// Network namespace could not be captured, opened or entered
    #[error("Namespace unavailable: {message}")]
    NamespaceUnavailable {
        /// Error message
        message: String,
    },

    /// Upstream status report failed
    #[error("Report failed: {message}")]
    Report {
        /// Error message
        message: String,
    },

    /// Container engine call failed
    #[error("Engine error: {message}")]
    Engine {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// The thread running namespaced work exited without a result
    #[error("Namespace worker exited before returning a result")]
    WorkerLost,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Report`]
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NamespaceUnavailable`]
    pub fn namespace(message: impl Into<String>) -> Self {
        Self::NamespaceUnavailable {
            message: message.into(),
        }
    }
}

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ContainerNotRunning {
            container_id: "web".to_string(),
            reason: "no such container".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Container web is not running: no such container"
        );

        assert_eq!(
            Error::namespace("setns failed").to_string(),
            "Namespace unavailable: setns failed"
        );
        assert_eq!(Error::report("503").to_string(), "Report failed: 503");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
