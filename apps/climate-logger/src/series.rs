//! Turns the reading log into chart-ready series on a fixed time grid.
//!
//! Slots walk backwards from `now` in `interval_minutes` steps and are emitted
//! oldest first. Each slot takes the latest reading at or before its instant.
//! Slots before the first reading stay empty (`None`) rather than being filled
//! with zeros; the chart draws them as a gap.

use crate::range::{LabelStyle, RangeLabel, RangeSpec};
use crate::store::Reading;
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    Recorded,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature: f64,
    pub humidity: f64,
}

pub trait ReadingSource {
    fn kind(&self) -> SeriesSource;
    fn sample_at(&self, at: DateTime<Utc>) -> Option<Sample>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub range: RangeLabel,
    pub source: SeriesSource,
    pub labels: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub temperature: Vec<Option<f64>>,
    pub humidity: Vec<Option<f64>>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Readings from one bulk read of the log.
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot {
    readings: Vec<Reading>,
}

impl LogSnapshot {
    pub fn new(mut readings: Vec<Reading>) -> Self {
        // Stable: equal timestamps keep insertion order, so the later row wins.
        readings.sort_by_key(|r| r.timestamp);
        Self { readings }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl ReadingSource for LogSnapshot {
    fn kind(&self) -> SeriesSource {
        SeriesSource::Recorded
    }

    fn sample_at(&self, at: DateTime<Utc>) -> Option<Sample> {
        let idx = self.readings.partition_point(|r| r.timestamp <= at);
        let reading = self.readings.get(idx.checked_sub(1)?)?;
        Some(Sample {
            temperature: reading.temperature,
            humidity: reading.humidity,
        })
    }
}

/// Placeholder curve for an empty log: a daily sinusoid plus seeded jitter.
///
/// The jitter for a slot depends only on the seed and the slot instant, so the
/// same request renders the same curve.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSource {
    seed: u64,
    offset: FixedOffset,
}

impl SyntheticSource {
    pub fn new(seed: u64, offset: FixedOffset) -> Self {
        Self { seed, offset }
    }
}

impl ReadingSource for SyntheticSource {
    fn kind(&self) -> SeriesSource {
        SeriesSource::Synthetic
    }

    fn sample_at(&self, at: DateTime<Utc>) -> Option<Sample> {
        let hour = at.with_timezone(&self.offset).hour() as f64;
        let phase = (hour / 24.0) * 2.0 * PI;

        let mut rng = StdRng::seed_from_u64(
            self.seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(at.timestamp() as u64),
        );
        let temperature = 25.0 + 5.0 * phase.sin() + rng.gen_range(-1.0..1.0);
        let humidity = 55.0 - 10.0 * phase.sin() + rng.gen_range(-2.5..2.5);

        Some(Sample {
            temperature,
            humidity,
        })
    }
}

pub fn build_series(
    spec: &RangeSpec,
    source: &dyn ReadingSource,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Series {
    let slots = spec.slot_count();
    let style = spec.label.label_style();
    let interval = Duration::minutes(i64::from(spec.interval_minutes));

    let mut series = Series {
        range: spec.label,
        source: source.kind(),
        labels: Vec::with_capacity(slots),
        timestamps: Vec::with_capacity(slots),
        temperature: Vec::with_capacity(slots),
        humidity: Vec::with_capacity(slots),
    };

    for steps_back in (0..=i64::from(spec.point_count)).rev() {
        let at = now - interval * steps_back as i32;
        let sample = source.sample_at(at);

        series.labels.push(format_label(at, offset, style));
        series.timestamps.push(at);
        series.temperature.push(sample.map(|s| round1(s.temperature)));
        series.humidity.push(sample.map(|s| round1(s.humidity)));
    }

    series
}

fn format_label(at: DateTime<Utc>, offset: FixedOffset, style: LabelStyle) -> String {
    let local = at.with_timezone(&offset);
    match style {
        LabelStyle::HourMinute => local.format("%H:%M").to_string(),
        LabelStyle::DayHour => local.format("%b %-d %-Hh").to_string(),
    }
}

/// Rounds to one decimal place. Magnitudes too large to scale are returned
/// as-is; they carry no fractional digits at that size anyway.
pub fn round1(value: f64) -> f64 {
    let scaled = value * 10.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 10.0
}
