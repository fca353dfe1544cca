//! # Sample Module
//!
//! One timestamped heart-rate + acceleration reading, plus the CSV row format
//! used both for persisted batches and for the live telemetry line.
//!
//! ## Row Format
//! ```text
//! timestamp,bpm,confidence,accel_x,accel_y,accel_z
//! 1733234567123,72,95,120,-50,980
//! ```
//! Acceleration is stored as fixed-point integers (g * 1000).

/// Header line written at the top of every batch (without the newline)
pub const CSV_HEADER: &str = "timestamp,bpm,confidence,accel_x,accel_y,accel_z";

/// Fixed-point scale applied to acceleration readings
const ACCEL_SCALE: f64 = 1000.0;

/// Heart-rate event as delivered by the sensor. Either field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartRate {
    pub bpm: Option<u32>,
    pub confidence: Option<u32>,
}

impl HeartRate {
    pub fn new(bpm: u32, confidence: u32) -> Self {
        Self {
            bpm: Some(bpm),
            confidence: Some(confidence),
        }
    }
}

/// Instantaneous 3-axis acceleration in g
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub bpm: u32,
    pub confidence: u32,
    pub accel_x: i32,
    pub accel_y: i32,
    pub accel_z: i32,
}

impl Sample {
    /// Build a sample from a heart-rate event and the acceleration read alongside it.
    /// Missing bpm/confidence default to 0.
    pub fn from_reading(timestamp: i64, hr: HeartRate, accel: Acceleration) -> Self {
        Self {
            timestamp,
            bpm: hr.bpm.unwrap_or(0),
            confidence: hr.confidence.unwrap_or(0),
            accel_x: scale_axis(accel.x),
            accel_y: scale_axis(accel.y),
            accel_z: scale_axis(accel.z),
        }
    }

    /// Comma-separated row without line terminator
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.timestamp, self.bpm, self.confidence, self.accel_x, self.accel_y, self.accel_z
        )
    }

    /// Parse a row produced by `to_csv_row`. Returns None for malformed rows.
    pub fn parse_csv_row(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches('\r').split(',');
        let sample = Sample {
            timestamp: fields.next()?.trim().parse().ok()?,
            bpm: fields.next()?.trim().parse().ok()?,
            confidence: fields.next()?.trim().parse().ok()?,
            accel_x: fields.next()?.trim().parse().ok()?,
            accel_y: fields.next()?.trim().parse().ok()?,
            accel_z: fields.next()?.trim().parse().ok()?,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(sample)
    }
}

fn scale_axis(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    // `as` saturates at the i32 bounds
    (value * ACCEL_SCALE).round() as i32
}

/// Render a full batch: header line then one newline-terminated row per sample
pub fn encode_batch<'a, I>(samples: I) -> String
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for sample in samples {
        out.push_str(&sample.to_csv_row());
        out.push('\n');
    }
    out
}

/// Parse batch content back into samples, skipping the header and malformed rows
pub fn decode_batch(content: &str) -> Vec<Sample> {
    content
        .lines()
        .filter(|line| !line.is_empty() && *line != CSV_HEADER)
        .filter_map(|line| {
            let parsed = Sample::parse_csv_row(line);
            if parsed.is_none() {
                log::warn!("Skipping malformed batch row: {:?}", line);
            }
            parsed
        })
        .collect()
}
