//! # Error Types Module
//!
//! Centralized error handling for the PulseWatch recorder.
//! One error type per seam, each with enough context to log a useful line.
//!
//! ## Error Types
//! - `StoreError`: batch and settings storage I/O and encoding failures
//! - `ConfigError`: configuration file I/O and parsing errors
//! - `FlushError`: a buffer flush that did not reach durable storage
//! - `TelemetryError`: live telemetry link failures
//! - `EngineError`: the engine thread is no longer reachable
//!
//! Nothing here ever reaches the UI as a hard failure. The engine handles
//! each error where it happens and records it in its health counters.

use std::fmt;

/// Errors raised by the batch and settings stores
#[derive(Debug)]
pub enum StoreError {
    /// Underlying filesystem operation failed
    Io { name: String, source: std::io::Error },
    /// Stored record could not be decoded
    Decode { name: String, source: serde_json::Error },
    /// Record could not be encoded for storage
    Encode(serde_json::Error),
    /// Name is not acceptable as a storage key
    InvalidName(String),
    /// Store refused the operation (used by in-memory stores)
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { name, source } => {
                write!(f, "Storage I/O failed for {}: {}", name, source)
            }
            StoreError::Decode { name, source } => {
                write!(f, "Failed to decode {}: {}", name, source)
            }
            StoreError::Encode(e) => write!(f, "Failed to encode record: {}", e),
            StoreError::InvalidName(name) => write!(f, "Invalid storage name: {:?}", name),
            StoreError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Decode { source, .. } => Some(source),
            StoreError::Encode(e) => Some(e),
            StoreError::InvalidName(_) | StoreError::Unavailable(_) => None,
        }
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// A value is out of its accepted range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// A flush that did not commit. The buffer is left untouched.
#[derive(Debug)]
pub enum FlushError {
    FlushFailed { batch: String, reason: StoreError },
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushError::FlushFailed { batch, reason } => {
                write!(f, "Failed to flush batch {}: {}", batch, reason)
            }
        }
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlushError::FlushFailed { reason, .. } => Some(reason),
        }
    }
}

/// Errors from the live telemetry link
#[derive(Debug)]
pub enum TelemetryError {
    /// Write to the underlying link failed
    Io(std::io::Error),
    /// Link is not connected
    Disconnected,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Io(e) => write!(f, "Telemetry write failed: {}", e),
            TelemetryError::Disconnected => write!(f, "Telemetry link is not connected"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Io(e) => Some(e),
            TelemetryError::Disconnected => None,
        }
    }
}

/// Errors surfaced by the engine thread handle
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Failed to spawn the engine thread
    Spawn(String),
    /// Engine thread has stopped and no longer accepts commands
    Disconnected,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Spawn(msg) => write!(f, "Failed to spawn engine thread: {}", msg),
            EngineError::Disconnected => write!(f, "Engine thread is not running"),
        }
    }
}

impl std::error::Error for EngineError {}
