//! # Recording Session Engine
//!
//! Owns the in-memory sample buffer, the recording on/off state, the flush
//! trigger and settings reconciliation. Every collaborator (settings store,
//! batch store, sensor, telemetry link, indicator, clock) is injected, so the
//! engine runs the same against real files or in-memory fakes.
//!
//! ## Lifecycle
//! ```text
//!            start()                     stop(): forced flush,
//!  Stopped ───────────▶ Recording ─────▶ unsubscribe, power off ─▶ Stopped
//!     ▲                     │
//!     └──── reload() ───────┘  (detach without flushing, then start()
//!                               again if settings say `recording`)
//! ```
//!
//! ## Data Flow
//! 1. `on_sample`: heart-rate event + accelerometer read → `Sample` → buffer
//! 2. Each sample is also sent as one line over the live telemetry link
//! 3. When `save_interval_ms` has elapsed since the last save (checked only
//!    when a sample arrives), the buffer is flushed as one batch
//! 4. `flush`: write batch → clear buffer → update the settings record
//!
//! The batch write is the commit point. Nothing in memory or in settings
//! changes until the batch store has acknowledged the write, so a failed
//! flush leaves the buffer intact for the next attempt.
//!
//! ## Single-threaded
//! All operations take `&mut self` and run to completion. Use
//! `runtime::spawn` to confine an engine to a dedicated thread.

use crate::batch_store::{batch_name, sort_batches, BatchStore};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{FlushError, StoreError};
use crate::indicator::StatusIndicator;
use crate::sample::{decode_batch, encode_batch, HeartRate, Sample};
use crate::sensor::SensorSource;
use crate::settings::{self, SettingsRecord, SettingsStore};
use crate::telemetry::TelemetryChannel;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Stopped,
    Recording,
}

/// In-memory session counters. Rebuilt from the settings record on `reload`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub start_time: i64,
    pub last_save_time: i64,
    pub total_saved: u64,
}

/// Process-lifetime failure counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Health {
    pub flush_failures: u64,
    pub telemetry_failures: u64,
    pub settings_failures: u64,
    pub dropped_samples: u64,
    pub last_flush_error: Option<String>,
}

/// A batch committed by `flush`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBatch {
    pub name: String,
    pub samples: usize,
}

/// Point-in-time view for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub is_recording: bool,
    pub file_count: usize,
    /// Total persisted size in KB, rounded to one decimal
    pub size_kb: f64,
    pub last_save: i64,
    pub total_recordings: u64,
    /// Samples buffered in memory and not yet in any batch
    pub buffer_size: usize,
    pub health: Health,
}

impl Status {
    pub fn size_kb_text(&self) -> String {
        format!("{:.1}", self.size_kb)
    }
}

/// Local `H:MM` of a save timestamp, or "Never"
pub fn format_last_save(timestamp: i64) -> String {
    use chrono::TimeZone;

    if timestamp == 0 {
        return "Never".to_string();
    }
    match chrono::Local.timestamp_millis_opt(timestamp).single() {
        Some(time) => time.format("%-H:%M").to_string(),
        None => "Never".to_string(),
    }
}

fn round_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 10.0).round() / 10.0
}

pub struct RecordingEngine {
    config: EngineConfig,
    settings: Box<dyn SettingsStore>,
    batches: Box<dyn BatchStore>,
    sensor: Box<dyn SensorSource>,
    telemetry: Box<dyn TelemetryChannel>,
    indicator: Option<Box<dyn StatusIndicator>>,
    clock: Box<dyn Clock>,
    state: RecorderState,
    session: SessionState,
    buffer: VecDeque<Sample>,
    health: Health,
    /// Stamp of the last batch name issued, keeps names unique within a millisecond
    last_batch_stamp: i64,
}

impl RecordingEngine {
    /// Create a stopped engine. Call `reload` to apply the persisted intent.
    pub fn new(
        config: EngineConfig,
        settings: impl SettingsStore + 'static,
        batches: impl BatchStore + 'static,
        sensor: impl SensorSource + 'static,
        telemetry: impl TelemetryChannel + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            config,
            settings: Box::new(settings),
            batches: Box::new(batches),
            sensor: Box::new(sensor),
            telemetry: Box::new(telemetry),
            indicator: None,
            clock: Box::new(clock),
            state: RecorderState::Stopped,
            session: SessionState::default(),
            buffer: VecDeque::new(),
            health: Health::default(),
            last_batch_stamp: i64::MIN,
        }
    }

    pub fn with_indicator(mut self, indicator: impl StatusIndicator + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Begin recording. No-op if already recording.
    pub fn start(&mut self) {
        if self.is_recording() {
            return;
        }

        let now = self.clock.now_ms();
        if !self.buffer.is_empty() {
            log::warn!("Discarding {} unsaved samples from a previous session", self.buffer.len());
            self.health.dropped_samples += self.buffer.len() as u64;
        }
        self.buffer.clear();
        self.session.start_time = now;
        self.session.last_save_time = now;
        self.state = RecorderState::Recording;

        self.sensor.subscribe();
        self.sensor.set_power(true, &self.config.app_name);

        log::info!("Recording started");
    }

    /// Stop recording. Forces a flush of whatever is buffered before the
    /// sensor is released. No-op if already stopped.
    ///
    /// The engine always ends up stopped. A flush failure is returned and the
    /// unsaved samples stay in memory.
    pub fn stop(&mut self) -> Result<Option<SavedBatch>, FlushError> {
        if !self.is_recording() {
            return Ok(None);
        }

        let flushed = self.flush();
        self.detach_sensor();
        self.state = RecorderState::Stopped;

        log::info!("Recording stopped");
        flushed
    }

    /// Reconcile the running state with the persisted recording intent.
    /// Must be called after every external change to the settings record.
    ///
    /// A running session is detached without a forced flush; buffered samples
    /// are discarded if recording restarts.
    pub fn reload(&mut self) {
        let record = self.read_settings();

        if self.is_recording() {
            self.detach_sensor();
            self.state = RecorderState::Stopped;
        }

        // Unreadable settings mean "not recording" but never reset the counter
        let recording = match record {
            Some(record) => {
                self.session.total_saved = self.session.total_saved.max(record.total_recordings);
                record.recording
            }
            None => false,
        };

        if recording {
            self.start();
        }
        log::debug!("Reloaded settings: recording={}", recording);
    }

    /// Persist the recording intent and reconcile
    pub fn set_recording(&mut self, recording: bool) {
        if let Err(e) = settings::update(self.settings.as_ref(), |r| r.recording = recording) {
            self.health.settings_failures += 1;
            log::error!("Failed to persist recording={}: {}", recording, e);
        }
        self.reload();
    }

    /// Ingest one heart-rate event. Ignored while stopped.
    ///
    /// Returns the batch committed as a side effect, if any. A failed flush is
    /// returned as an error; the sample itself is always buffered.
    pub fn on_sample(&mut self, hr: HeartRate) -> Result<Option<SavedBatch>, FlushError> {
        if !self.is_recording() {
            return Ok(None);
        }

        let accel = self.sensor.acceleration();
        let timestamp = self.clock.now_ms();
        let sample = Sample::from_reading(timestamp, hr, accel);

        let mut saved = None;
        let mut capacity_error = None;
        if self.buffer.len() >= self.config.max_buffer_samples {
            log::warn!("Buffer full ({} samples), flushing early", self.buffer.len());
            match self.flush() {
                Ok(batch) => saved = batch,
                Err(e) => {
                    self.buffer.pop_front();
                    self.health.dropped_samples += 1;
                    capacity_error = Some(e);
                }
            }
        }

        self.buffer.push_back(sample);

        let line = sample.to_csv_row();
        if let Err(e) = self.telemetry.send(&line) {
            self.health.telemetry_failures += 1;
            log::warn!("Telemetry send failed: {}", e);
        }

        let every = self.config.diagnostic_every;
        if every > 0 && self.buffer.len() % every == 0 {
            log::debug!("Telemetry: bpm={} buffered={}", sample.bpm, self.buffer.len());
        }

        if let Some(e) = capacity_error {
            return Err(e);
        }

        if saved.is_none()
            && timestamp - self.session.last_save_time >= self.config.save_interval_ms
        {
            saved = self.flush()?;
        }

        Ok(saved)
    }

    /// Write the buffer out as one batch. No-op on an empty buffer.
    pub fn flush(&mut self) -> Result<Option<SavedBatch>, FlushError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let now = self.clock.now_ms();
        let stamp = now.max(self.last_batch_stamp.saturating_add(1));
        let name = batch_name(&self.config.batch_prefix, stamp);
        let content = encode_batch(&self.buffer);

        if let Err(reason) = self.batches.create(&name, &content) {
            self.health.flush_failures += 1;
            self.health.last_flush_error = Some(reason.to_string());
            log::error!(
                "Failed to flush {} samples to {}: {} (kept in memory)",
                self.buffer.len(),
                name,
                reason
            );
            return Err(FlushError::FlushFailed { batch: name, reason });
        }

        // Batch is durable; commit the in-memory side
        let count = self.buffer.len();
        self.last_batch_stamp = stamp;
        self.session.total_saved += count as u64;
        self.session.last_save_time = stamp;
        self.buffer.clear();
        self.health.last_flush_error = None;

        let total = self.session.total_saved;
        if let Err(e) = settings::update(self.settings.as_ref(), |r| {
            r.last_save = stamp;
            r.total_recordings = total;
        }) {
            self.health.settings_failures += 1;
            log::error!("Batch {} saved but settings update failed: {}", name, e);
        }

        log::debug!("Flushed {} samples to {} ({} total)", count, name, total);

        if let Some(indicator) = &self.indicator {
            indicator.redraw();
        }

        Ok(Some(SavedBatch {
            name,
            samples: count,
        }))
    }

    /// Snapshot of persisted and in-memory state. Does not mutate anything.
    pub fn status(&self) -> Status {
        let names = self.batch_names();

        let total_bytes: u64 = names
            .iter()
            .filter_map(|name| match self.batches.size(name) {
                Ok(size) => size,
                Err(e) => {
                    log::warn!("Could not size batch {}: {}", name, e);
                    None
                }
            })
            .sum();

        let record = match self.settings.read() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Settings unreadable, reporting defaults: {}", e);
                SettingsRecord::default()
            }
        };

        Status {
            is_recording: self.is_recording(),
            file_count: names.len(),
            size_kb: round_kb(total_bytes),
            last_save: record.last_save,
            total_recordings: record.total_recordings,
            buffer_size: self.buffer.len(),
            health: self.health.clone(),
        }
    }

    /// Erase every batch and reset the save counters. A running session keeps
    /// recording and keeps its buffer. Returns the number of batches erased.
    pub fn delete_all_data(&mut self) -> usize {
        let mut erased = 0;
        for name in self.batch_names() {
            match self.batches.erase(&name) {
                Ok(()) => erased += 1,
                Err(e) => log::warn!("Failed to erase {}: {}", name, e),
            }
        }

        if let Err(e) = settings::update(self.settings.as_ref(), |r| {
            r.last_save = 0;
            r.total_recordings = 0;
        }) {
            self.health.settings_failures += 1;
            log::error!("Failed to reset save counters: {}", e);
        }
        self.session.total_saved = 0;

        log::info!("Deleted {} batches", erased);
        erased
    }

    /// Persisted batch names, oldest first
    pub fn batches(&self) -> Vec<String> {
        self.batch_names()
    }

    /// Samples of one persisted batch, or None if it does not exist
    pub fn read_batch(&self, name: &str) -> Result<Option<Vec<Sample>>, StoreError> {
        Ok(self.batches.read(name)?.map(|content| decode_batch(&content)))
    }

    /// Flush and release the sensor without touching the persisted intent,
    /// so the next process picks recording back up on `reload`.
    pub fn shutdown(&mut self) {
        if !self.is_recording() {
            return;
        }
        if let Err(e) = self.flush() {
            log::error!("Final flush failed, {} samples lost: {}", self.buffer.len(), e);
        }
        self.detach_sensor();
        self.state = RecorderState::Stopped;
        log::info!("Recorder shut down");
    }

    fn detach_sensor(&mut self) {
        self.sensor.unsubscribe();
        self.sensor.set_power(false, &self.config.app_name);
    }

    fn batch_names(&self) -> Vec<String> {
        let prefix = &self.config.batch_prefix;
        match self.batches.list(prefix) {
            Ok(names) => sort_batches(prefix, names),
            Err(e) => {
                log::warn!("Could not list batches: {}", e);
                Vec::new()
            }
        }
    }

    fn read_settings(&mut self) -> Option<SettingsRecord> {
        match self.settings.read() {
            Ok(record) => Some(record),
            Err(e) => {
                self.health.settings_failures += 1;
                log::warn!("Settings unreadable, assuming not recording: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_store::MemoryBatchStore;
    use crate::clock::ManualClock;
    use crate::indicator::SettingsIndicator;
    use crate::sample::{Acceleration, CSV_HEADER};
    use crate::sensor::SimulatedSensor;
    use crate::settings::MemorySettingsStore;
    use crate::telemetry::CaptureTelemetry;

    const T0: i64 = 1_700_000_000_000;

    struct Rig {
        engine: RecordingEngine,
        settings: MemorySettingsStore,
        batches: MemoryBatchStore,
        sensor: SimulatedSensor,
        telemetry: CaptureTelemetry,
        clock: ManualClock,
    }

    fn rig_with(config: EngineConfig, record: SettingsRecord) -> Rig {
        let settings = MemorySettingsStore::with_record(record);
        let batches = MemoryBatchStore::new();
        let sensor = SimulatedSensor::new();
        sensor.set_acceleration(Acceleration { x: 0.1, y: -0.2, z: 0.98 });
        let telemetry = CaptureTelemetry::new();
        let clock = ManualClock::new(T0);
        let engine = RecordingEngine::new(
            config,
            settings.clone(),
            batches.clone(),
            sensor.clone(),
            telemetry.clone(),
            clock.clone(),
        );
        Rig {
            engine,
            settings,
            batches,
            sensor,
            telemetry,
            clock,
        }
    }

    fn rig() -> Rig {
        rig_with(EngineConfig::default(), SettingsRecord::default())
    }

    fn feed(rig: &mut Rig, n: usize) {
        for i in 0..n {
            rig.clock.advance(1_000);
            rig.engine
                .on_sample(HeartRate::new(70 + i as u32, 90))
                .expect("no flush expected");
        }
    }

    #[test]
    fn test_initial_state_is_stopped() {
        let rig = rig();
        assert_eq!(rig.engine.state(), RecorderState::Stopped);
        assert_eq!(rig.engine.buffer_len(), 0);
        assert!(!rig.sensor.is_subscribed());
    }

    #[test]
    fn test_start_subscribes_and_powers_sensor() {
        let mut rig = rig();
        rig.engine.start();
        assert!(rig.engine.is_recording());
        assert!(rig.sensor.is_subscribed());
        assert!(rig.sensor.is_powered());
        assert_eq!(rig.engine.session().start_time, T0);
        assert_eq!(rig.engine.session().last_save_time, T0);
    }

    #[test]
    fn test_start_twice_keeps_buffer() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 2);
        rig.engine.start();
        assert_eq!(rig.engine.buffer_len(), 2);
        assert_eq!(rig.engine.session().start_time, T0);
    }

    #[test]
    fn test_samples_ignored_while_stopped() {
        let mut rig = rig();
        assert_eq!(rig.engine.on_sample(HeartRate::new(70, 90)).unwrap(), None);
        assert_eq!(rig.engine.buffer_len(), 0);
        assert!(rig.telemetry.lines().is_empty());
    }

    #[test]
    fn test_buffer_counts_samples_since_start() {
        let mut rig = rig();
        rig.engine.start();
        for n in 1..=25 {
            feed(&mut rig, 1);
            assert_eq!(rig.engine.buffer_len(), n);
        }
    }

    #[test]
    fn test_sample_fields_and_telemetry_line() {
        let mut rig = rig();
        rig.engine.start();
        rig.clock.set(T0 + 5);
        rig.engine
            .on_sample(HeartRate {
                bpm: None,
                confidence: Some(40),
            })
            .unwrap();

        let lines = rig.telemetry.lines();
        assert_eq!(lines, vec![format!("{},0,40,100,-200,980", T0 + 5)]);
    }

    #[test]
    fn test_telemetry_failure_does_not_affect_recording() {
        let mut rig = rig();
        rig.engine.start();
        rig.telemetry.set_connected(false);
        feed(&mut rig, 3);
        assert_eq!(rig.engine.buffer_len(), 3);
        assert_eq!(rig.engine.health().telemetry_failures, 3);
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let mut rig = rig();
        rig.engine.start();
        assert_eq!(rig.engine.flush().unwrap(), None);
        assert!(rig.batches.is_empty());
        assert_eq!(rig.settings.write_count(), 0);
    }

    #[test]
    fn test_flush_commits_batch_and_settings() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 4);
        rig.clock.set(T0 + 10_000);

        let saved = rig.engine.flush().unwrap().expect("batch");
        assert_eq!(saved.samples, 4);
        assert_eq!(saved.name, format!("pw{}.csv", T0 + 10_000));
        assert_eq!(rig.engine.buffer_len(), 0);
        assert_eq!(rig.engine.session().total_saved, 4);
        assert_eq!(rig.engine.session().last_save_time, T0 + 10_000);

        let record = rig.settings.snapshot().unwrap();
        assert_eq!(record.total_recordings, 4);
        assert_eq!(record.last_save, T0 + 10_000);

        let content = rig.batches.read(&saved.name).unwrap().unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with(&format!("{},70,", T0 + 1_000)));
        assert!(lines[4].starts_with(&format!("{},73,", T0 + 4_000)));
    }

    #[test]
    fn test_total_saved_accumulates_across_flushes() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 2);
        rig.engine.flush().unwrap();
        feed(&mut rig, 3);
        rig.engine.flush().unwrap();
        assert_eq!(rig.engine.session().total_saved, 5);
        assert_eq!(rig.settings.snapshot().unwrap().total_recordings, 5);
        assert_eq!(rig.engine.batches().len(), 2);
    }

    #[test]
    fn test_flush_failure_keeps_buffer_and_settings() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 3);
        rig.batches.set_fail_creates(true);

        let err = rig.engine.flush().unwrap_err();
        assert!(matches!(err, FlushError::FlushFailed { .. }));
        assert_eq!(rig.engine.buffer_len(), 3);
        assert_eq!(rig.engine.session().last_save_time, T0);
        assert_eq!(rig.engine.session().total_saved, 0);
        assert_eq!(rig.settings.write_count(), 0);
        assert_eq!(rig.engine.health().flush_failures, 1);
        assert!(rig.engine.health().last_flush_error.is_some());

        rig.batches.set_fail_creates(false);
        assert_eq!(rig.engine.flush().unwrap().unwrap().samples, 3);
        assert!(rig.engine.health().last_flush_error.is_none());
    }

    #[test]
    fn test_settings_failure_after_batch_commit_still_clears_buffer() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 2);
        rig.settings.set_fail_writes(true);

        assert!(rig.engine.flush().unwrap().is_some());
        assert_eq!(rig.engine.buffer_len(), 0);
        assert_eq!(rig.batches.len(), 1);
        assert_eq!(rig.engine.health().settings_failures, 1);
    }

    #[test]
    fn test_flush_only_on_sample_arrival() {
        let config = EngineConfig {
            save_interval_ms: 300_000,
            ..Default::default()
        };
        let mut rig = rig_with(config, SettingsRecord::default());
        rig.engine.start();

        rig.clock.set(T0 + 100_000);
        assert_eq!(rig.engine.on_sample(HeartRate::new(70, 90)).unwrap(), None);
        rig.clock.set(T0 + 299_999);
        assert_eq!(rig.engine.on_sample(HeartRate::new(71, 90)).unwrap(), None);

        // Time passes with no samples: nothing is flushed
        rig.clock.set(T0 + 900_000);
        assert!(rig.batches.is_empty());
        assert_eq!(rig.engine.buffer_len(), 2);

        let saved = rig.engine.on_sample(HeartRate::new(72, 90)).unwrap().unwrap();
        assert_eq!(saved.samples, 3);
        assert_eq!(rig.engine.buffer_len(), 0);
        assert_eq!(rig.engine.session().last_save_time, T0 + 900_000);
    }

    #[test]
    fn test_flush_exactly_at_interval() {
        let config = EngineConfig {
            save_interval_ms: 300_000,
            ..Default::default()
        };
        let mut rig = rig_with(config, SettingsRecord::default());
        rig.engine.start();
        rig.clock.set(T0 + 300_000);
        assert!(rig.engine.on_sample(HeartRate::new(70, 90)).unwrap().is_some());
    }

    #[test]
    fn test_stop_flushes_buffered_samples() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 3);

        let saved = rig.engine.stop().unwrap().expect("forced flush");
        assert_eq!(saved.samples, 3);
        assert!(!rig.sensor.is_subscribed());
        assert!(!rig.sensor.is_powered());

        let status = rig.engine.status();
        assert!(!status.is_recording);
        assert_eq!(status.buffer_size, 0);
        assert_eq!(status.file_count, 1);

        let rows = rig.engine.read_batch(&saved.name).unwrap().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(|s| s.bpm).collect::<Vec<_>>(), vec![70, 71, 72]);

        rig.engine.start();
        assert_eq!(rig.engine.status().file_count, 1);
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut rig = rig();
        assert_eq!(rig.engine.stop().unwrap(), None);
        assert_eq!(rig.engine.state(), RecorderState::Stopped);
    }

    #[test]
    fn test_stop_with_failed_flush_still_stops() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 2);
        rig.batches.set_fail_creates(true);
        assert!(rig.engine.stop().is_err());
        assert_eq!(rig.engine.state(), RecorderState::Stopped);
        assert_eq!(rig.engine.buffer_len(), 2);
        assert!(!rig.sensor.is_subscribed());
    }

    #[test]
    fn test_reload_starts_when_settings_say_recording() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: true,
                ..Default::default()
            },
        );
        rig.engine.reload();
        assert!(rig.engine.is_recording());
        assert_eq!(rig.engine.session().start_time, T0);
        assert_eq!(rig.engine.buffer_len(), 0);
        assert!(rig.sensor.is_subscribed());
    }

    #[test]
    fn test_reload_stops_without_flushing() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 3);

        rig.engine.reload();
        assert!(!rig.engine.is_recording());
        assert!(rig.batches.is_empty());
        assert!(!rig.sensor.is_powered());
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: true,
                last_save: T0 - 1,
                total_recordings: 12,
            },
        );
        rig.engine.reload();
        let once = (rig.engine.state(), rig.engine.session(), rig.engine.buffer_len());
        rig.engine.reload();
        let twice = (rig.engine.state(), rig.engine.session(), rig.engine.buffer_len());
        assert_eq!(once, twice);
        assert_eq!(rig.engine.session().total_saved, 12);
        assert!(rig.sensor.is_subscribed());
    }

    #[test]
    fn test_reload_with_unreadable_settings_stops() {
        let mut rig = rig();
        rig.engine.start();
        rig.settings.set_fail_reads(true);
        rig.engine.reload();
        assert!(!rig.engine.is_recording());
        assert_eq!(rig.engine.health().settings_failures, 1);
    }

    #[test]
    fn test_reload_after_failed_settings_write_keeps_total() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: true,
                ..Default::default()
            },
        );
        rig.engine.reload();
        feed(&mut rig, 2);
        rig.settings.set_fail_writes(true);
        rig.engine.flush().unwrap();
        assert_eq!(rig.settings.snapshot().unwrap().total_recordings, 0);
        rig.settings.set_fail_writes(false);

        rig.engine.reload();
        assert_eq!(rig.engine.session().total_saved, 2);

        feed(&mut rig, 1);
        rig.engine.flush().unwrap();
        assert_eq!(rig.engine.session().total_saved, 3);
        assert_eq!(rig.settings.snapshot().unwrap().total_recordings, 3);

        let persisted: usize = rig
            .engine
            .batches()
            .iter()
            .map(|name| rig.engine.read_batch(name).unwrap().unwrap().len())
            .sum();
        assert_eq!(persisted, 3);
    }

    #[test]
    fn test_unreadable_settings_do_not_reset_total() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: true,
                last_save: T0 - 1,
                total_recordings: 10,
            },
        );
        rig.engine.reload();
        assert_eq!(rig.engine.session().total_saved, 10);

        rig.settings.set_fail_reads(true);
        rig.engine.reload();
        assert!(!rig.engine.is_recording());
        rig.settings.set_fail_reads(false);

        rig.engine.start();
        feed(&mut rig, 2);
        rig.engine.flush().unwrap();
        assert_eq!(rig.engine.session().total_saved, 12);
        assert_eq!(rig.settings.snapshot().unwrap().total_recordings, 12);
    }

    #[test]
    fn test_set_recording_keeps_save_metadata() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: false,
                last_save: 1234,
                total_recordings: 9,
            },
        );
        rig.engine.set_recording(true);
        assert!(rig.engine.is_recording());
        let record = rig.settings.snapshot().unwrap();
        assert!(record.recording);
        assert_eq!(record.last_save, 1234);
        assert_eq!(record.total_recordings, 9);

        rig.engine.set_recording(false);
        assert!(!rig.engine.is_recording());
        assert!(!rig.settings.snapshot().unwrap().recording);
    }

    #[test]
    fn test_delete_all_data_keeps_running_session() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 2);
        rig.engine.flush().unwrap();
        feed(&mut rig, 2);
        rig.engine.flush().unwrap();
        feed(&mut rig, 1);

        assert_eq!(rig.engine.delete_all_data(), 2);

        let status = rig.engine.status();
        assert_eq!(status.file_count, 0);
        assert_eq!(status.last_save, 0);
        assert_eq!(status.total_recordings, 0);
        assert_eq!(status.size_kb, 0.0);
        assert!(status.is_recording);
        assert_eq!(status.buffer_size, 1);
        assert_eq!(rig.engine.session().total_saved, 0);

        // Counting restarts from zero
        rig.engine.flush().unwrap();
        assert_eq!(rig.settings.snapshot().unwrap().total_recordings, 1);
    }

    #[test]
    fn test_delete_all_data_ignores_foreign_files() {
        let mut rig = rig();
        rig.batches.create("pwnotes.txt", "keep me").unwrap();
        rig.batches.create(&format!("pw{}.csv", T0), "x").unwrap();
        assert_eq!(rig.engine.delete_all_data(), 1);
        assert_eq!(rig.batches.len(), 1);
    }

    #[test]
    fn test_status_reports_sizes_and_settings() {
        let mut rig = rig();
        rig.engine.start();
        feed(&mut rig, 30);
        rig.engine.flush().unwrap();
        feed(&mut rig, 2);

        let status = rig.engine.status();
        let names = rig.engine.batches();
        let bytes = rig.batches.read(&names[0]).unwrap().unwrap().len() as f64;
        assert_eq!(status.file_count, 1);
        assert_eq!(status.size_kb, (bytes / 1024.0 * 10.0).round() / 10.0);
        assert_eq!(status.total_recordings, 30);
        assert_eq!(status.buffer_size, 2);
        assert!(status.is_recording);
    }

    #[test]
    fn test_status_survives_storage_failures() {
        let mut rig = rig();
        rig.batches.set_fail_lists(true);
        rig.settings.set_fail_reads(true);
        let status = rig.engine.status();
        assert_eq!(status.file_count, 0);
        assert_eq!(status.total_recordings, 0);
        assert!(!status.is_recording);
        rig.engine.start();
        assert!(rig.engine.status().is_recording);
    }

    #[test]
    fn test_full_buffer_flushes_early() {
        let config = EngineConfig {
            max_buffer_samples: 4,
            ..Default::default()
        };
        let mut rig = rig_with(config, SettingsRecord::default());
        rig.engine.start();
        feed(&mut rig, 4);

        rig.clock.advance(1_000);
        let saved = rig.engine.on_sample(HeartRate::new(99, 90)).unwrap().unwrap();
        assert_eq!(saved.samples, 4);
        assert_eq!(rig.engine.buffer_len(), 1);
    }

    #[test]
    fn test_full_buffer_drops_oldest_when_storage_fails() {
        let config = EngineConfig {
            max_buffer_samples: 3,
            ..Default::default()
        };
        let mut rig = rig_with(config, SettingsRecord::default());
        rig.engine.start();
        feed(&mut rig, 3);
        rig.batches.set_fail_creates(true);

        rig.clock.advance(1_000);
        assert!(rig.engine.on_sample(HeartRate::new(99, 90)).is_err());
        assert_eq!(rig.engine.buffer_len(), 3);
        assert_eq!(rig.engine.health().dropped_samples, 1);

        rig.batches.set_fail_creates(false);
        let saved = rig.engine.stop().unwrap().unwrap();
        let rows = rig.engine.read_batch(&saved.name).unwrap().unwrap();
        assert_eq!(rows.iter().map(|s| s.bpm).collect::<Vec<_>>(), vec![71, 72, 99]);
    }

    #[test]
    fn test_batch_names_unique_within_same_millisecond() {
        let mut rig = rig();
        rig.engine.start();
        rig.engine.on_sample(HeartRate::new(70, 90)).unwrap();
        let first = rig.engine.flush().unwrap().unwrap();
        rig.engine.on_sample(HeartRate::new(71, 90)).unwrap();
        let second = rig.engine.flush().unwrap().unwrap();
        assert_ne!(first.name, second.name);
        let record = rig.settings.snapshot().unwrap();
        assert_eq!(rig.engine.session().last_save_time, record.last_save);
        assert_eq!(record.last_save, T0 + 1);
        assert_eq!(rig.engine.batches(), vec![first.name, second.name]);
    }

    #[test]
    fn test_indicator_redrawn_after_flush() {
        let settings = MemorySettingsStore::with_record(SettingsRecord {
            recording: true,
            ..Default::default()
        });
        let indicator = SettingsIndicator::new(settings.clone());
        let clock = ManualClock::new(T0);
        let mut engine = RecordingEngine::new(
            EngineConfig::default(),
            settings,
            MemoryBatchStore::new(),
            SimulatedSensor::new(),
            CaptureTelemetry::new(),
            clock,
        )
        .with_indicator(indicator.clone());

        engine.reload();
        engine.on_sample(HeartRate::new(60, 80)).unwrap();
        let before = indicator.redraw_count();
        engine.flush().unwrap();
        assert_eq!(indicator.redraw_count(), before + 1);
        assert!(indicator.is_lit());
    }

    #[test]
    fn test_shutdown_flushes_but_keeps_intent() {
        let mut rig = rig_with(
            EngineConfig::default(),
            SettingsRecord {
                recording: true,
                ..Default::default()
            },
        );
        rig.engine.reload();
        feed(&mut rig, 2);
        rig.engine.shutdown();
        assert!(!rig.engine.is_recording());
        assert_eq!(rig.batches.len(), 1);
        assert!(rig.settings.snapshot().unwrap().recording);
        assert!(!rig.sensor.is_powered());
    }

    #[test]
    fn test_format_last_save() {
        assert_eq!(format_last_save(0), "Never");
        let text = format_last_save(T0);
        let (h, m) = text.split_once(':').unwrap();
        assert!(h.parse::<u32>().unwrap() < 24);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_size_kb_text_has_one_decimal() {
        let rig = rig();
        rig.batches.create(&format!("pw{}.csv", T0), &"x".repeat(1536)).unwrap();
        let status = rig.engine.status();
        assert_eq!(status.size_kb_text(), "1.5");
    }
}
