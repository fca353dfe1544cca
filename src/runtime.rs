//! # Engine Runtime Module
//!
//! Confines a `RecordingEngine` to one dedicated thread. Sensor events and UI
//! control calls are queued on a single command channel and processed strictly
//! in order, each running to completion before the next is taken.
//!
//! ## Key Components
//! - `EngineCommand`: everything the engine thread can be asked to do
//! - `EngineHandle`: cloneable-sender facade used by the UI and the sensor feed
//!
//! On spawn the engine first reconciles with the persisted settings, so a
//! device that was recording before a restart resumes recording on its own.
//! Dropping the handle shuts the thread down with a final flush.

use crate::error::EngineError;
use crate::recorder::{RecordingEngine, Status};
use crate::sample::HeartRate;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread;

/// Command sent to the engine thread
#[derive(Debug)]
pub enum EngineCommand {
    /// Heart-rate event from the sensor
    Sample(HeartRate),
    Start,
    Stop,
    Reload,
    /// Persist the recording intent, then reload
    SetRecording(bool),
    Flush,
    Status(Sender<Status>),
    /// Replies with the number of batches erased
    DeleteAll(Sender<usize>),
    /// Flush and exit without touching the persisted intent
    Shutdown,
}

/// Facade over the engine thread
pub struct EngineHandle {
    command_tx: Sender<EngineCommand>,
    engine_thread: Option<thread::JoinHandle<()>>,
}

/// Start the engine thread. The engine reloads from settings before serving commands.
pub fn spawn(engine: RecordingEngine) -> Result<EngineHandle, EngineError> {
    let (command_tx, command_rx) = unbounded();

    let engine_thread = thread::Builder::new()
        .name("pulsewatch-engine".to_string())
        .spawn(move || engine_loop(engine, command_rx))
        .map_err(|e| EngineError::Spawn(e.to_string()))?;

    Ok(EngineHandle {
        command_tx,
        engine_thread: Some(engine_thread),
    })
}

impl EngineHandle {
    pub fn start(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Start)
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Stop)
    }

    pub fn reload(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Reload)
    }

    /// Toggle the persisted recording intent (the UI's record switch)
    pub fn set_recording(&self, recording: bool) -> Result<(), EngineError> {
        self.send(EngineCommand::SetRecording(recording))
    }

    pub fn flush(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Flush)
    }

    pub fn push_sample(&self, hr: HeartRate) -> Result<(), EngineError> {
        self.send(EngineCommand::Sample(hr))
    }

    /// Sender the sensor feed can own independently of the handle
    pub fn sample_sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    /// Blocks until every previously queued command has been processed
    pub fn status(&self) -> Result<Status, EngineError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(EngineCommand::Status(reply_tx))?;
        reply_rx.recv().map_err(|_| EngineError::Disconnected)
    }

    pub fn delete_all_data(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(EngineCommand::DeleteAll(reply_tx))?;
        reply_rx.recv().map_err(|_| EngineError::Disconnected)
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(command)
            .map_err(|_| EngineError::Disconnected)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        // Signal engine thread to stop
        let _ = self.command_tx.send(EngineCommand::Shutdown);

        // Wait for engine thread to finish
        if let Some(handle) = self.engine_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Engine thread loop
///
/// Processes commands sequentially until shutdown or until every sender is gone.
fn engine_loop(mut engine: RecordingEngine, command_rx: Receiver<EngineCommand>) {
    engine.reload();

    loop {
        match command_rx.recv() {
            Ok(EngineCommand::Sample(hr)) => {
                if let Err(e) = engine.on_sample(hr) {
                    log::warn!("Sample buffered, flush deferred: {}", e);
                }
            }
            Ok(EngineCommand::Start) => engine.start(),
            Ok(EngineCommand::Stop) => {
                if let Err(e) = engine.stop() {
                    log::error!("Stopped with unsaved samples: {}", e);
                }
            }
            Ok(EngineCommand::Reload) => engine.reload(),
            Ok(EngineCommand::SetRecording(recording)) => engine.set_recording(recording),
            Ok(EngineCommand::Flush) => {
                if let Err(e) = engine.flush() {
                    log::error!("Manual flush failed: {}", e);
                }
            }
            Ok(EngineCommand::Status(reply)) => {
                let _ = reply.send(engine.status());
            }
            Ok(EngineCommand::DeleteAll(reply)) => {
                let _ = reply.send(engine.delete_all_data());
            }
            Ok(EngineCommand::Shutdown) => {
                engine.shutdown();
                log::info!("Engine thread stopped");
                break;
            }
            Err(_) => {
                engine.shutdown();
                log::info!("Engine thread: command channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_store::MemoryBatchStore;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::sensor::SimulatedSensor;
    use crate::settings::{MemorySettingsStore, SettingsRecord};
    use crate::telemetry::NullTelemetry;

    fn spawn_with(
        record: SettingsRecord,
    ) -> (EngineHandle, MemorySettingsStore, MemoryBatchStore, SimulatedSensor) {
        let settings = MemorySettingsStore::with_record(record);
        let batches = MemoryBatchStore::new();
        let sensor = SimulatedSensor::new();
        let engine = RecordingEngine::new(
            EngineConfig::default(),
            settings.clone(),
            batches.clone(),
            sensor.clone(),
            NullTelemetry,
            ManualClock::new(1_700_000_000_000),
        );
        let handle = spawn(engine).expect("engine thread");
        (handle, settings, batches, sensor)
    }

    #[test]
    fn test_spawn_reloads_persisted_intent() {
        let (handle, _settings, _batches, sensor) = spawn_with(SettingsRecord {
            recording: true,
            ..Default::default()
        });
        let status = handle.status().unwrap();
        assert!(status.is_recording);
        assert!(sensor.is_subscribed());
    }

    #[test]
    fn test_commands_are_processed_in_order() {
        let (handle, _settings, batches, _sensor) = spawn_with(SettingsRecord::default());
        handle.start().unwrap();
        for bpm in 60..63 {
            handle.push_sample(HeartRate::new(bpm, 90)).unwrap();
        }
        handle.stop().unwrap();

        let status = handle.status().unwrap();
        assert!(!status.is_recording);
        assert_eq!(status.buffer_size, 0);
        assert_eq!(status.file_count, 1);
        assert_eq!(status.total_recordings, 3);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_set_recording_round_trip() {
        let (handle, settings, _batches, _sensor) = spawn_with(SettingsRecord::default());
        handle.set_recording(true).unwrap();
        assert!(handle.status().unwrap().is_recording);
        assert!(settings.snapshot().unwrap().recording);

        handle.set_recording(false).unwrap();
        assert!(!handle.status().unwrap().is_recording);
    }

    #[test]
    fn test_delete_all_through_handle() {
        let (handle, _settings, _batches, _sensor) = spawn_with(SettingsRecord::default());
        handle.start().unwrap();
        handle.push_sample(HeartRate::new(70, 90)).unwrap();
        handle.flush().unwrap();
        assert_eq!(handle.delete_all_data().unwrap(), 1);
        let status = handle.status().unwrap();
        assert_eq!(status.file_count, 0);
        assert_eq!(status.total_recordings, 0);
        assert!(status.is_recording);
    }

    #[test]
    fn test_drop_flushes_and_keeps_intent() {
        let (handle, settings, batches, sensor) = spawn_with(SettingsRecord {
            recording: true,
            ..Default::default()
        });
        handle.push_sample(HeartRate::new(70, 90)).unwrap();
        drop(handle);

        assert_eq!(batches.len(), 1);
        assert!(settings.snapshot().unwrap().recording);
        assert!(!sensor.is_powered());
    }
}
