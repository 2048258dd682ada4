use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RunError};

/// Screen point in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Pixel rectangle `[l, t, r, b)`, guaranteed `l < r` and `t < b` once loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub l: i32,
    pub t: i32,
    pub r: i32,
    pub b: i32,
}

impl Rect {
    pub fn new(l: i32, t: i32, r: i32, b: i32) -> Self {
        Self { l, t, r, b }
    }

    pub fn width(&self) -> i32 {
        self.r - self.l
    }

    pub fn height(&self) -> i32 {
        self.b - self.t
    }

    /// Integer center, rounded toward the top-left like the click targets of the game UI.
    pub fn center(&self) -> Point {
        Point {
            x: (self.l + self.r) / 2,
            y: (self.t + self.b) / 2,
        }
    }
}

/// Raw screenshot pixel data (BGRA), owned by one loop cycle
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, bytes_per_row: u32) -> Self {
        Self { data, width, height, bytes_per_row, captured_at: Instant::now() }
    }

    /// Solid frame of one BGRA color.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra.repeat((width * height) as usize);
        Self::new(data, width, height, width * 4)
    }

    /// True when `data` covers every row the dimensions claim.
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let row = self.width as usize * 4;
        if (self.bytes_per_row as usize) < row {
            return false;
        }
        let needed = (self.height as usize - 1) * self.bytes_per_row as usize + row;
        self.data.len() >= needed
    }

    /// Copy out the part of `rect` that lies inside the frame.
    /// Returns `None` when the intersection is empty or the buffer is short.
    pub fn crop(&self, rect: Rect) -> Option<Frame> {
        let l = rect.l.clamp(0, self.width as i32) as u32;
        let r = rect.r.clamp(0, self.width as i32) as u32;
        let t = rect.t.clamp(0, self.height as i32) as u32;
        let b = rect.b.clamp(0, self.height as i32) as u32;
        if l >= r || t >= b {
            return None;
        }

        let w = r - l;
        let h = b - t;
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in t..b {
            let start = (y * self.bytes_per_row + l * 4) as usize;
            let end = start + (w * 4) as usize;
            data.extend_from_slice(self.data.get(start..end)?);
        }

        Some(Frame {
            data,
            width: w,
            height: h,
            bytes_per_row: w * 4,
            captured_at: self.captured_at,
        })
    }

    /// Tightly packed RGB bytes, row padding dropped.
    pub fn to_rgb_bytes(&self) -> Option<Vec<u8>> {
        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            let row = (y * self.bytes_per_row) as usize;
            let row_px = self.data.get(row..row + (self.width * 4) as usize)?;
            for px in row_px.chunks_exact(4) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        Some(rgb)
    }

    #[cfg(feature = "debug-capture")]
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.to_rgb_bytes()?)
    }
}

/// One recognized text line.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

/// Countdown value read off the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerReading {
    pub minutes: u32,
    pub seconds: u32,
}

impl TimerReading {
    pub fn new(minutes: u32, seconds: u32) -> Self {
        Self { minutes, seconds }
    }
}

impl fmt::Display for TimerReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}分{:02}秒", self.minutes, self.seconds)
    }
}

/// Everything the loop reports to the presentation layer, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Status(String),
    Recognition { text: String, confidence: f32 },
    Timer(TimerReading),
    Armed,
    Actuation { target: String, at: Point },
    Paused,
    Resumed,
    Completed,
    Stopped,
    Errored { kind: ErrorKind, message: String },
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Stopped,
    Errored(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub frames: u64,
    pub recognitions: u64,
    pub readings: u64,
    pub clicks: u64,
}

/// Final outcome and counters of one run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: RunStats,
}
