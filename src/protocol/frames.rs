use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

pub const HEADER_FRAME_TYPE: u8 = 0x01;
pub const INITIAL_BURST_FRAME_TYPE: u8 = 0x02;
pub const ADDITIONAL_BURST_FRAME_TYPE: u8 = 0x03;

/// Angles travel as signed fixed point with this many steps per degree.
pub const ANGLE_SCALE: f64 = 10_000.0;

/// Bytes per encoded burst sample: offset u32, elevation i32, azimuth i32.
pub const BURST_SAMPLE_LEN: usize = 12;

/// Most samples one burst carries; keeps the u16 body length exact.
pub const MAX_BURST_SAMPLES: usize = 1000;

/// Calendar timestamp in the firmware's fixed-width layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

impl From<DateTime<Utc>> for FrameTimestamp {
    fn from(t: DateTime<Utc>) -> Self {
        Self {
            year: t.year().clamp(0, u16::MAX as i32) as u16,
            month: t.month() as u8,
            day: t.day() as u8,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
            // leap seconds report 1000..1999 ms
            millisecond: t.timestamp_subsec_millis().min(999) as u16,
        }
    }
}

impl FrameTimestamp {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.year.to_be_bytes());
        buf.extend_from_slice(&[self.month, self.day, self.hour, self.minute, self.second]);
        buf.extend_from_slice(&self.millisecond.to_be_bytes());
    }
}

/// Pass announcement sent once before the first burst.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderFrame {
    pub pass_id: u64,
    pub aos: FrameTimestamp,
    pub los: FrameTimestamp,
    pub total_samples: u32,
}

impl HeaderFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(HEADER_FRAME_TYPE);
        buf.extend_from_slice(&self.pass_id.to_be_bytes());
        self.aos.write(&mut buf);
        self.los.write(&mut buf);
        buf.extend_from_slice(&self.total_samples.to_be_bytes());
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BurstSample {
    /// Milliseconds since AOS.
    pub offset_ms: u32,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BurstKind {
    Initial,
    Additional,
}

/// A run of consecutive samples starting at `start_index`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBurst {
    pub kind: BurstKind,
    pub pass_id: u64,
    pub start_index: u32,
    pub samples: Vec<BurstSample>,
}

impl DataBurst {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Wire form. Samples past [`MAX_BURST_SAMPLES`] are not encoded.
    pub fn encode(&self) -> Vec<u8> {
        let samples = &self.samples[..self.samples.len().min(MAX_BURST_SAMPLES)];
        let body_len = samples.len() * BURST_SAMPLE_LEN;
        let mut buf = Vec::with_capacity(15 + body_len);
        buf.push(match self.kind {
            BurstKind::Initial => INITIAL_BURST_FRAME_TYPE,
            BurstKind::Additional => ADDITIONAL_BURST_FRAME_TYPE,
        });
        buf.extend_from_slice(&self.pass_id.to_be_bytes());
        buf.extend_from_slice(&self.start_index.to_be_bytes());
        buf.extend_from_slice(&(body_len as u16).to_be_bytes());
        for sample in samples {
            buf.extend_from_slice(&sample.offset_ms.to_be_bytes());
            buf.extend_from_slice(&fixed_point(sample.elevation_deg).to_be_bytes());
            buf.extend_from_slice(&fixed_point(sample.azimuth_deg).to_be_bytes());
        }
        buf
    }
}

fn fixed_point(angle_deg: f64) -> i32 {
    (angle_deg * ANGLE_SCALE).round() as i32
}
