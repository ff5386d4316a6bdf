//! Error types for the feed engine.
//!
//! Every fallible operation in aprsfeed returns [`FeedError`]. Variants carry
//! structured context so callers can decide whether to retry, surface the
//! problem to the operator, or just count it.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: link setup, login and loss of the upstream link
//! - **Parse Errors**: malformed frames (counted and skipped by the pipeline)
//! - **Filter Syntax Errors**: rejected filter expressions
//! - **Send Errors**: outbound traffic while the link is down
//! - **Configuration Errors**: invalid or unreadable session configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use aprsfeed::FeedError;
//!
//! let error = FeedError::connection_failed("connection refused");
//! if error.is_retryable() {
//!     println!("Will reconnect");
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! Only failures of caller-invoked commands (bad filter syntax, sending while
//! disconnected) are returned synchronously. Everything else is absorbed by the
//! pipeline and reported through event streams.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for feed operations.
pub type Result<T, E = FeedError> = std::result::Result<T, E>;

/// Main error type for feed operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FeedError {
    #[error("Connection error: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Parse error in {context}: {details}")]
    Parse {
        context: String,
        details: String,
        /// The frame that failed, when known
        raw: Option<Arc<str>>,
    },

    #[error("Filter syntax error at column {position}: {message}")]
    FilterSyntax { position: usize, message: String },

    #[error("Send failed: {reason}")]
    Send { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid callsign '{callsign}'")]
    InvalidCallsign { callsign: String },

    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("No message '{msg_id}' in thread with {peer}")]
    UnknownMessage { peer: String, msg_id: String },

    #[error("Filter rebuild requested but the raw packet log is disabled")]
    RawLogDisabled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Connection { .. } => true,
            FeedError::Timeout { .. } => true,
            FeedError::Io(_) => true,
            FeedError::Send { .. } => true,
            FeedError::Parse { .. } => false,
            FeedError::FilterSyntax { .. } => false,
            FeedError::Config { .. } => false,
            FeedError::ConfigFile { .. } => false,
            FeedError::InvalidCallsign { .. } => false,
            FeedError::InvalidMessage { .. } => false,
            FeedError::UnknownMessage { .. } => false,
            FeedError::RawLogDisabled => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            FeedError::Connection { .. } => vec![
                "Check network connectivity to the APRS-IS server",
                "Verify the server host and port",
                "Wait for the automatic reconnect",
            ],
            FeedError::Parse { .. } => vec![
                "Frame skipped; no action needed",
                "Enable debug logging to inspect raw frames",
            ],
            FeedError::FilterSyntax { .. } => vec![
                "Check the filter expression near the reported column",
                "Use field=value or field~value terms (from, to, call, type, text, path)",
                "Combine terms with and, or, not and parentheses",
            ],
            FeedError::Send { .. } => vec![
                "Wait for the connection to be re-established",
                "Resend the message manually once connected",
            ],
            FeedError::Timeout { .. } => vec![
                "Increase the configured timeout",
                "Check network latency to the server",
            ],
            FeedError::Config { .. } => vec![
                "Check the configuration values",
                "Remove the option to use its default",
            ],
            FeedError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            FeedError::InvalidCallsign { .. } => vec![
                "Use up to 9 letters, digits or '-' (e.g. N0CALL-9), not starting or ending with '-'",
                "Check for stray whitespace",
            ],
            FeedError::InvalidMessage { .. } => vec![
                "Keep message text within 67 characters",
                "Avoid the characters |, ~ and {",
            ],
            FeedError::UnknownMessage { .. } => vec![
                "Check the peer callsign and message id",
                "Refresh the chat thread view",
            ],
            FeedError::RawLogDisabled => vec![
                "Set feed.raw_log_capacity above zero to allow rebuilds",
                "Use set_filter to change the filter for new packets only",
            ],
            FeedError::Io(_) => vec![
                "Check network connectivity",
                "Wait for the automatic reconnect",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        FeedError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        FeedError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for per-frame parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        FeedError::Parse { context: context.into(), details: details.into(), raw: None }
    }

    /// Attach the offending frame to a parse error. Other errors are
    /// returned unchanged.
    pub fn with_raw(self, frame: Arc<str>) -> Self {
        match self {
            FeedError::Parse { context, details, .. } => FeedError::Parse { context, details, raw: Some(frame) },
            other => other,
        }
    }

    /// Helper constructor for filter syntax errors.
    pub fn filter_syntax(position: usize, message: impl Into<String>) -> Self {
        FeedError::FilterSyntax { position, message: message.into() }
    }

    /// Helper constructor for send errors.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        FeedError::Send { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        FeedError::Config { reason: reason.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn config_file(path: PathBuf, source: std::io::Error) -> Self {
        FeedError::ConfigFile { path, source }
    }

    /// Helper constructor for invalid message errors.
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        FeedError::InvalidMessage { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_format_correctly_with_arbitrary_context(
            reason in ".*",
            details in ".*",
            position in 0usize..512usize,
            callsign in "[A-Z0-9]{1,6}",
            duration_ms in 1u64..60000u64
          ) {
            let connection = FeedError::connection_failed(reason.clone());
            let parse = FeedError::parse_error("frame", details.clone());
            let filter = FeedError::filter_syntax(position, reason.clone());
            let callsign_err = FeedError::InvalidCallsign { callsign: callsign.clone() };
            let timeout = FeedError::Timeout { duration: Duration::from_millis(duration_ms) };

            prop_assert!(connection.to_string().contains(&reason));
            prop_assert!(parse.to_string().contains(&details));
            prop_assert!(filter.to_string().contains(&position.to_string()));
            prop_assert!(callsign_err.to_string().contains(&callsign));
            prop_assert!(!timeout.to_string().is_empty());
          }

          #[test]
          fn error_source_chaining_preserves_information(
            base_message in ".*",
            intermediate_reasons in prop::collection::vec(".*", 1..5)
          ) {
            let mut current: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));

            for (i, reason) in intermediate_reasons.iter().enumerate() {
              current = Box::new(FeedError::connection_failed_with_source(
                format!("Level {}: {}", i, reason),
                current,
              ));
            }

            let top = FeedError::connection_failed_with_source("Top level", current);

            let mut depth = 0;
            let mut found_base = false;
            let mut cursor = std::error::Error::source(&top);
            while let Some(source) = cursor {
              depth += 1;
              if source.to_string().contains(&base_message) {
                found_base = true;
              }
              cursor = std::error::Error::source(source);
              if depth > 10 {
                break;
              }
            }

            prop_assert_eq!(depth, 1 + intermediate_reasons.len());
            prop_assert!(found_base, "Base message '{}' not found in chain", base_message);
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<FeedError>();

        let error = FeedError::send_failed("not connected");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification_matches_taxonomy() {
        assert!(FeedError::connection_failed("reset").is_retryable());
        assert!(FeedError::Timeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(!FeedError::filter_syntax(3, "unexpected token").is_retryable());
        assert!(!FeedError::parse_error("frame", "missing ':'").is_retryable());
        assert!(!FeedError::config("capacity must be positive").is_retryable());
        assert!(!FeedError::RawLogDisabled.is_retryable());
    }

    #[test]
    fn callsign_suggestion_matches_the_length_limit() {
        let suggestions = FeedError::InvalidCallsign { callsign: "TOOLONGCALL".into() }.recovery_suggestions();
        assert!(suggestions[0].contains(&crate::types::MAX_CALLSIGN_LEN.to_string()), "{suggestions:?}");
        assert!(suggestions[0].contains("N0CALL-9"));
    }

    #[test]
    fn raw_frame_attaches_to_parse_errors_only() {
        let raw: Arc<str> = Arc::from("N0CALL>APRS");
        match FeedError::parse_error("frame", "missing ':'").with_raw(Arc::clone(&raw)) {
            FeedError::Parse { raw: Some(attached), .. } => assert!(Arc::ptr_eq(&attached, &raw)),
            other => panic!("expected a parse error with its frame, got {other:?}"),
        }
        assert!(matches!(
            FeedError::send_failed("x").with_raw(raw),
            FeedError::Send { .. }
        ));
    }

    #[test]
    fn every_variant_has_suggestions() {
        let errors = vec![
            FeedError::connection_failed("x"),
            FeedError::parse_error("x", "y"),
            FeedError::filter_syntax(0, "x"),
            FeedError::send_failed("x"),
            FeedError::Timeout { duration: Duration::from_secs(1) },
            FeedError::config("x"),
            FeedError::config_file(PathBuf::from("/nope.yaml"), std::io::Error::other("x")),
            FeedError::InvalidCallsign { callsign: "x".into() },
            FeedError::invalid_message("x"),
            FeedError::UnknownMessage { peer: "N0CALL".into(), msg_id: "1".into() },
            FeedError::RawLogDisabled,
            FeedError::Io(std::io::Error::other("x")),
        ];

        for error in errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "no suggestions for {error}");
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn io_errors_convert() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err: FeedError = io_err.into();
        match err {
            FeedError::Io(source) => assert_eq!(source.to_string(), "peer reset"),
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }
}
