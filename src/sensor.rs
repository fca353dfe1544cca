//! # Sensor Source Module
//!
//! Seam between the recorder and the heart-rate monitor / accelerometer.
//! The engine subscribes to the heart-rate stream and switches sensor power
//! on start, and reverses both on stop. Acceleration is read synchronously
//! whenever a heart-rate event is ingested.
//!
//! `SimulatedSensor` stands in for real hardware on a host: a feed thread
//! produces a plausible heart-rate waveform while the sensor is subscribed
//! and powered, and hands each event to a sink closure.

use crate::sample::{Acceleration, HeartRate};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub trait SensorSource: Send {
    /// Start delivering heart-rate events to the engine
    fn subscribe(&self);

    fn unsubscribe(&self);

    /// Request (or release) sensor power on behalf of `owner`.
    /// The sensor stays powered while any owner holds it.
    fn set_power(&self, on: bool, owner: &str);

    /// Instantaneous acceleration in g
    fn acceleration(&self) -> Acceleration;
}

#[derive(Debug, Default)]
struct SimState {
    subscribed: AtomicBool,
    owners: Mutex<HashSet<String>>,
    ticks: AtomicU64,
    accel_override: Mutex<Option<Acceleration>>,
}

/// Host-side sensor with a synthetic signal. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSensor {
    state: Arc<SimState>,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.subscribed.load(Ordering::SeqCst)
    }

    pub fn is_powered(&self) -> bool {
        !self.owners().is_empty()
    }

    /// Pin the accelerometer to a fixed reading
    pub fn set_acceleration(&self, accel: Acceleration) {
        *self
            .state
            .accel_override
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(accel);
    }

    /// Next synthetic heart-rate event
    pub fn next_heart_rate(&self) -> HeartRate {
        let tick = self.state.ticks.fetch_add(1, Ordering::SeqCst);
        let phase = tick as f64 / 12.0;
        let bpm = 72.0 + 6.0 * phase.sin();
        // Confidence ramps up as the optical sensor settles
        let confidence = (40 + tick * 10).min(100) as u32;
        HeartRate {
            bpm: Some(bpm.round() as u32),
            confidence: Some(confidence),
        }
    }

    /// Emit heart-rate events every `interval` while subscribed and powered.
    /// The feed stops when the returned handle is dropped.
    pub fn spawn_feed<F>(&self, interval: Duration, sink: F) -> FeedHandle
    where
        F: Fn(HeartRate) -> bool + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = should_stop.clone();
        let sensor = self.clone();

        let thread = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if !(sensor.is_subscribed() && sensor.is_powered()) {
                    continue;
                }
                if !sink(sensor.next_heart_rate()) {
                    log::debug!("Sensor feed: sink closed");
                    break;
                }
            }
        });

        FeedHandle {
            should_stop,
            thread: Some(thread),
        }
    }

    fn owners(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.state.owners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SensorSource for SimulatedSensor {
    fn subscribe(&self) {
        self.state.subscribed.store(true, Ordering::SeqCst);
    }

    fn unsubscribe(&self) {
        self.state.subscribed.store(false, Ordering::SeqCst);
    }

    fn set_power(&self, on: bool, owner: &str) {
        let mut owners = self.owners();
        if on {
            owners.insert(owner.to_string());
        } else {
            owners.remove(owner);
        }
        log::debug!(
            "Sensor power {} for {} ({} owners)",
            if on { "on" } else { "off" },
            owner,
            owners.len()
        );
    }

    fn acceleration(&self) -> Acceleration {
        if let Some(accel) = *self
            .state
            .accel_override
            .lock()
            .unwrap_or_else(|e| e.into_inner())
        {
            return accel;
        }
        // Wrist at rest with a little sway
        let t = self.state.ticks.load(Ordering::SeqCst) as f64 / 5.0;
        Acceleration {
            x: 0.05 * t.sin(),
            y: 0.03 * t.cos(),
            z: -0.98,
        }
    }
}

/// Stops the simulated feed thread on drop
pub struct FeedHandle {
    should_stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
