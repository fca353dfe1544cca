//! # PulseWatch
//!
//! Continuous heart-rate + motion logger for a battery-powered wearable.
//! Samples are buffered in memory, persisted periodically as immutable CSV
//! batches, and mirrored line-by-line over a best-effort telemetry link.
//!
//! The `recorder` module holds the recording session engine; everything it
//! talks to (settings, batch storage, sensor, telemetry, indicator, clock) is
//! a trait with a file-backed or simulated implementation alongside it.

pub mod batch_store;
pub mod clock;
pub mod config;
pub mod error;
pub mod indicator;
pub mod recorder;
pub mod runtime;
pub mod sample;
pub mod sensor;
pub mod settings;
pub mod telemetry;

pub use config::EngineConfig;
pub use recorder::{RecordingEngine, Status};
pub use runtime::EngineHandle;
