//! Error types for the duck hardware layer

use thiserror::Error;

/// Result type alias for hardware operations
pub type HardwareResult<T> = Result<T, HardwareError>;

/// Errors that can occur while talking to the duck.
///
/// None of these are fatal to the host process: every variant degrades to
/// "hardware absent" behaviour and is surfaced as a value plus a log record.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("No serial port found for the duck: {0}")]
    Discovery(String),

    #[error("Could not open serial port {port}: {source}")]
    Connect {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to serial port {port} failed: {source}")]
    Write {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Duck hardware unavailable (retry in {retry_in_ms}ms)")]
    Unavailable { retry_in_ms: u64 },

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Serial writer dropped the request")]
    WorkerGone,

    #[error("Command cancelled before it was written")]
    Cancelled,

    #[error("Could not start serial writer: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HardwareError {
    /// Hardware failures never abort the caller.
    pub fn is_fatal(&self) -> bool {
        false
    }

    /// Short machine-friendly label used in log fields and HTTP payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            HardwareError::Discovery(_) => "discovery_failure",
            HardwareError::Connect { .. } => "connect_failure",
            HardwareError::Write { .. } => "write_failure",
            HardwareError::Unavailable { .. } => "unavailable",
            HardwareError::QueueClosed => "queue_closed",
            HardwareError::WorkerGone => "worker_gone",
            HardwareError::Cancelled => "cancelled",
            HardwareError::WorkerSpawn(_) => "worker_spawn",
            HardwareError::Config(_) => "config",
        }
    }
}

impl From<config::ConfigError> for HardwareError {
    fn from(err: config::ConfigError) -> Self {
        HardwareError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error_is_fatal() {
        let errors = vec![
            HardwareError::Discovery("nothing matched".into()),
            HardwareError::Connect {
                port: "/dev/ttyUSB0".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            },
            HardwareError::Write {
                port: "/dev/ttyUSB0".into(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
            },
            HardwareError::Unavailable { retry_in_ms: 10 },
            HardwareError::QueueClosed,
            HardwareError::WorkerGone,
            HardwareError::Cancelled,
        ];
        for err in errors {
            assert!(!err.is_fatal(), "{} should not be fatal", err.kind());
        }
    }

    #[test]
    fn test_display_includes_port() {
        let err = HardwareError::Write {
            port: "/dev/cu.usbmodem1".into(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
        };
        assert!(err.to_string().contains("/dev/cu.usbmodem1"));
        assert_eq!(err.kind(), "write_failure");
    }
}
