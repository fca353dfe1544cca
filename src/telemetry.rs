//! # Live Telemetry Module
//!
//! Best-effort outbound text link (serial / BLE UART style). Every ingested
//! sample is sent as one comma-separated line. Failures are reported to the
//! caller, which logs and counts them; nothing is ever retried.

use crate::error::TelemetryError;
use std::io::Write;
use std::sync::{Arc, Mutex};

pub trait TelemetryChannel: Send {
    fn send(&mut self, line: &str) -> Result<(), TelemetryError>;
}

/// Writes newline-terminated lines to any `Write` sink
pub struct LineTelemetry<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineTelemetry<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TelemetryChannel for LineTelemetry<W> {
    fn send(&mut self, line: &str) -> Result<(), TelemetryError> {
        writeln!(self.writer, "{}", line).map_err(TelemetryError::Io)?;
        self.writer.flush().map_err(TelemetryError::Io)
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl TelemetryChannel for NullTelemetry {
    fn send(&mut self, _line: &str) -> Result<(), TelemetryError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CapturedLines {
    lines: Vec<String>,
    connected: bool,
}

/// Collects sent lines in memory. Clones share the same log.
/// Starts connected; a disconnected link rejects every send.
#[derive(Debug, Clone)]
pub struct CaptureTelemetry {
    inner: Arc<Mutex<CapturedLines>>,
}

impl Default for CaptureTelemetry {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CapturedLines {
                lines: Vec::new(),
                connected: true,
            })),
        }
    }
}

impl CaptureTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CapturedLines> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TelemetryChannel for CaptureTelemetry {
    fn send(&mut self, line: &str) -> Result<(), TelemetryError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(TelemetryError::Disconnected);
        }
        inner.lines.push(line.to_string());
        Ok(())
    }
}
