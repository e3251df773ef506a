//! Error types for the crate: link transport failures, typed command
//! failures, and startup configuration failures.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results of typed device operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Failures of the device link itself.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The TCP connection could not be established.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// The connection attempt did not complete within the connect timeout.
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No reply arrived within the response timeout.
    #[error("no reply from the device within {0:?}")]
    Timeout(Duration),

    /// The remote end closed the connection mid-exchange.
    #[error("connection closed by the device")]
    Closed,

    /// Reading from or writing to the connection failed.
    #[error("link i/o failed: {0}")]
    Io(#[source] io::Error),

    /// The link task is no longer running.
    #[error("link task has stopped")]
    Gone,
}

/// Failures surfaced by typed device operations.
///
/// Link problems, replies that do not parse, and replies in which the device
/// declines the command are kept distinct so callers can tell "the projector
/// is unreachable" from "the projector said no".
#[derive(Debug, Error)]
pub enum CommandError {
    /// The underlying link could not complete the exchange.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The device replied with something other than the expected frame.
    #[error("unexpected reply: {0}")]
    Protocol(String),

    /// The device answered but declined the command.
    #[error("device declined the command: {0}")]
    Rejected(String),
}

/// Startup configuration failures. These are fatal: the process exits before
/// serving any request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// An environment variable is present but unusable.
    #[error("environment variable {0} is invalid: {1}")]
    Invalid(&'static str, String),
}

// =================================================================
// Tests
